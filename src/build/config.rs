use crate::compiler::{CompileOptions, LanguageStandard, LinkOptions};
use crate::result::{CxxBuildError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/** Optional JSON build file merged underneath command-line flags
 *
 * ```text
 * {
 *   "compile_options": { "include_paths": ["include"], "debug": true },
 *   "link_options": { "libraries": ["m"] },
 *   "options": { "compiler": "GCC", "standard": "c++20", "build_dir": "out" }
 * }
 * ```
 *
 * Every section is optional; unknown keys are rejected.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildFileConfig {
    pub compile_options: CompileOptions,
    pub link_options: LinkOptions,
    pub options: BuildSettings,
}

/// The `options` section of a build file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    pub compiler: Option<String>,
    #[serde(alias = "cpp_version")]
    pub standard: Option<String>,
    pub incremental: Option<bool>,
    pub build_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
}

impl BuildFileConfig {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CxxBuildError::not_found(format!("Config file not found: {}", path.display()))
            } else {
                e.into()
            }
        })?;

        let config: BuildFileConfig = serde_json::from_str(&content).map_err(|e| {
            CxxBuildError::config(format!(
                "Invalid build config {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        log::debug!("Loaded build config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.link_options.validate()?;

        if self.options.jobs == Some(0) {
            return Err(CxxBuildError::config("jobs must be at least 1"));
        }

        if let Some(standard) = &self.options.standard {
            standard.parse::<LanguageStandard>()?;
        }

        Ok(())
    }

    pub fn standard(&self) -> Result<Option<LanguageStandard>> {
        self.options
            .standard
            .as_deref()
            .map(str::parse::<LanguageStandard>)
            .transpose()
    }
}

/// CLI scalar wins when given.
pub fn overlay<T>(cli: Option<T>, config: Option<T>) -> Option<T> {
    cli.or(config)
}

/// CLI list wins when non-empty.
pub fn overlay_list<T>(cli: Vec<T>, config: Vec<T>) -> Vec<T> {
    if cli.is_empty() {
        config
    } else {
        cli
    }
}
