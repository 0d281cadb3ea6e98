use crate::result::{CxxBuildError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use which::{which, which_in};

/// Captured outcome of one finished subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Default, Debug, Clone)]
pub struct ProcessManager {
    search_path: Option<PathBuf>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve executables against `search_path` instead of `PATH`.
    pub fn with_search_path(search_path: impl Into<PathBuf>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    pub fn find_executable(&self, name: &str) -> Result<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir()?;
                which_in(name, Some(paths.as_os_str()), cwd)
            }
            None => which(name),
        };

        found.map_err(|_| CxxBuildError::not_found(format!("Executable not found: {}", name)))
    }

    /** Runs `argv[0]` with the remaining arguments and captures its output
     *
     * # Arguments
     * * `argv` - Program followed by its arguments, exactly as issued
     * * `timeout` - Optional wall-clock limit
     *
     * # Errors
     * - `SubprocessLaunch` if the program cannot be spawned or waited on
     * - `SubprocessTimeout` if the limit expires; the child is killed
     *
     * # Notes
     * - Children are spawned with `kill_on_drop`, so dropping the returned
     *   future (an aborted worker or an expired timeout) kills the process
     * - A non-zero exit is not an error here; callers inspect `exit_code`
     */
    pub async fn run(&self, argv: &[String], timeout: Option<Duration>) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CxxBuildError::process("Empty command line"))?;

        log::debug!("Executing command: {}", argv.join(" "));

        let start = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| CxxBuildError::SubprocessLaunch {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    log::error!("Command timed out after {:?}: {}", limit, program);
                    return Err(CxxBuildError::SubprocessTimeout {
                        command: argv.join(" "),
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| CxxBuildError::SubprocessLaunch {
            program: program.clone(),
            reason: format!("failed to wait for process: {}", e),
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            duration: start.elapsed(),
        };

        if !result.success() {
            log::debug!(
                "Command exited with {:?} in {:?}: {}",
                result.exit_code,
                result.duration,
                program
            );
        }

        Ok(result)
    }

    pub fn path_to_arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let runner = ProcessManager::new();
        let out = runner
            .run(&sh("echo out; echo err >&2; exit 3"), None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let runner = ProcessManager::new();
        let err = runner
            .run(&sh("sleep 5"), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, CxxBuildError::SubprocessTimeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let runner = ProcessManager::new();
        let err = runner
            .run(&["/nonexistent/cxxbuild-no-such-compiler".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CxxBuildError::SubprocessLaunch { .. }));
    }

    #[test]
    fn search_path_limits_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessManager::with_search_path(dir.path());
        assert!(runner.find_executable("sh").is_err());
    }
}
