use crate::compiler::OptimizationLevel;
use crate::result::{CxxBuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/** Dialect-neutral compilation options
 *
 * Nothing in here is spelled in any compiler's syntax; each backend's
 * argument translator maps these fields onto its own command line.
 * Defines are kept sorted so the issued command line is deterministic.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    pub include_paths: Vec<PathBuf>,
    pub defines: BTreeMap<String, Option<String>>,
    pub warnings: Vec<String>,
    pub optimization: OptimizationLevel,
    pub debug: bool,
    pub position_independent: bool,
    pub sanitizers: Vec<String>,
    pub standard_library: Option<String>,
    pub extra_flags: Vec<String>,
}

impl CompileOptions {
    /// Parses `NAME` or `NAME=VALUE`, splitting on the first `=`.
    pub fn parse_define(input: &str) -> Result<(String, Option<String>)> {
        let (name, value) = match input.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.to_string())),
            None => (input.trim(), None),
        };

        if name.is_empty() {
            return Err(CxxBuildError::config(format!(
                "Invalid define '{}': name cannot be empty",
                input
            )));
        }

        Ok((name.to_string(), value))
    }
}

/// Dialect-neutral link options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkOptions {
    pub library_paths: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub runtime_library_paths: Vec<PathBuf>,
    pub shared: bool,
    #[serde(rename = "static")]
    pub static_link: bool,
    #[serde(alias = "strip")]
    pub strip_symbols: bool,
    pub map_file: Option<PathBuf>,
    pub extra_flags: Vec<String>,
}

impl LinkOptions {
    pub fn validate(&self) -> Result<()> {
        if self.shared && self.static_link {
            return Err(CxxBuildError::config(CxxBuildError::SHARED_AND_STATIC));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_parsing() {
        assert_eq!(
            CompileOptions::parse_define("DEBUG").unwrap(),
            ("DEBUG".to_string(), None)
        );
        assert_eq!(
            CompileOptions::parse_define("V=2").unwrap(),
            ("V".to_string(), Some("2".to_string()))
        );
        assert_eq!(
            CompileOptions::parse_define("EXPR=a=b").unwrap(),
            ("EXPR".to_string(), Some("a=b".to_string()))
        );
        assert!(CompileOptions::parse_define("=1").is_err());
    }

    #[test]
    fn shared_and_static_conflict() {
        let options = LinkOptions {
            shared: true,
            static_link: true,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert!(LinkOptions::default().validate().is_ok());
    }

    #[test]
    fn options_deserialize_from_partial_json() {
        let options: CompileOptions = serde_json::from_str(
            r#"{"include_paths": ["inc"], "defines": {"DEBUG": null, "V": "2"}, "debug": true}"#,
        )
        .unwrap();
        assert_eq!(options.include_paths, vec![PathBuf::from("inc")]);
        assert_eq!(options.defines.get("V"), Some(&Some("2".to_string())));
        assert_eq!(options.optimization, OptimizationLevel::Standard);

        let link: LinkOptions =
            serde_json::from_str(r#"{"libraries": ["m"], "static": true, "strip": true}"#).unwrap();
        assert!(link.static_link);
        assert!(link.strip_symbols);

        assert!(serde_json::from_str::<CompileOptions>(r#"{"bogus": 1}"#).is_err());
    }
}
