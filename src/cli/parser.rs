use crate::build::MAX_JOBS;
use crate::compiler::CompileOptions;
use crate::result::{CxxBuildError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct CliParser;

impl CliParser {
    pub fn validate_config_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(CxxBuildError::not_found(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(CxxBuildError::config("Config path is not a file"));
        }

        Ok(path.to_path_buf())
    }

    pub fn validate_jobs(jobs: usize) -> Result<usize> {
        match jobs {
            1..=MAX_JOBS => Ok(jobs),
            _ => Err(CxxBuildError::config(format!(
                "jobs must be between 1 and {}",
                MAX_JOBS
            ))),
        }
    }

    /// Parses repeated `NAME[=VAL]` arguments; later duplicates win.
    pub fn parse_defines(defines: &[String]) -> Result<BTreeMap<String, Option<String>>> {
        defines
            .iter()
            .map(|define| CompileOptions::parse_define(define))
            .collect()
    }

    pub fn parse_timeout(seconds: Option<u64>) -> Result<Option<Duration>> {
        match seconds {
            Some(0) => Err(CxxBuildError::config("timeout must be at least 1 second")),
            Some(secs) => Ok(Some(Duration::from_secs(secs))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_bounds() {
        assert!(CliParser::validate_jobs(0).is_err());
        assert_eq!(CliParser::validate_jobs(8).unwrap(), 8);
        assert!(CliParser::validate_jobs(MAX_JOBS + 1).is_err());
    }

    #[test]
    fn defines_collect_into_map() {
        let defines = CliParser::parse_defines(&["DEBUG".into(), "V=2".into(), "V=3".into()]).unwrap();
        assert_eq!(defines.get("DEBUG"), Some(&None));
        assert_eq!(defines.get("V"), Some(&Some("3".to_string())));
        assert!(CliParser::parse_defines(&["=x".into()]).is_err());
    }

    #[test]
    fn config_path_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliParser::validate_config_path(dir.path()).is_err());
        assert!(CliParser::validate_config_path(&dir.path().join("none.json")).is_err());

        let file = dir.path().join("build.json");
        std::fs::write(&file, "{}").unwrap();
        assert_eq!(CliParser::validate_config_path(&file).unwrap(), file);
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(CliParser::parse_timeout(Some(0)).is_err());
        assert_eq!(
            CliParser::parse_timeout(Some(30)).unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(CliParser::parse_timeout(None).unwrap(), None);
    }
}
