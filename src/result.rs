use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/** Main Result type alias for cxxbuild operations
 *
 * # Usage
 * ```no_run
 * use cxxbuild::result::Result;
 *
 * fn read_sources() -> Result<String> {
 *     // Function automatically propagates CxxBuildError
 *     Ok(std::fs::read_to_string("main.cpp")?)
 * }
 * ```
 */
pub type Result<T> = std::result::Result<T, CxxBuildError>;

/** Error enumeration for the build orchestrator
 *
 * # Error Categories
 * - **Io / Json**: file system and (de)serialization failures
 * - **Config**: invalid options, standards or config files
 * - **Process / NotFound**: generic subprocess and lookup failures
 * - **SourceNotFound**: pre-flight check of a build's inputs
 * - **UnsupportedStandard**: a backend was asked for a standard it lacks
 * - **CompilerNotFound / NoCompilerFound**: registry lookups
 * - **SubprocessTimeout / SubprocessLaunch**: raised by the process runner,
 *   folded into a failed `CompilationResult` by the compiler backend
 *
 * # Design Notes
 * - Compile and link failures are not errors; they are carried by
 *   `CompilationResult::success == false`
 * - Uses `Cow<'static, str>` for free-form messages
 */
#[derive(Error, Debug)]
pub enum CxxBuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(Cow<'static, str>),

    #[error("Process error: {0}")]
    Process(Cow<'static, str>),

    #[error("Not found: {0}")]
    NotFound(Cow<'static, str>),

    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Unsupported language standard: {standard}. Supported standards: {supported}")]
    UnsupportedStandard { standard: String, supported: String },

    #[error("Compiler '{name}' not found. Available: {available}")]
    CompilerNotFound { name: String, available: String },

    #[error("No compilers detected on the system")]
    NoCompilerFound,

    #[error("Command timed out after {:.1}s: {command}", timeout.as_secs_f64())]
    SubprocessTimeout { command: String, timeout: Duration },

    #[error("Failed to launch {program}: {reason}")]
    SubprocessLaunch { program: String, reason: String },
}

/** Constructor helpers
 *
 * # Usage Examples
 * ```ignore
 * use cxxbuild::result::CxxBuildError;
 *
 * return Err(CxxBuildError::config("Cannot specify both shared and static linking"));
 * return Err(CxxBuildError::not_found(format!("Config file not found: {}", path)));
 * ```
 */
impl CxxBuildError {
    pub const SHARED_AND_STATIC: &'static str = "Cannot specify both shared and static linking";

    pub fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Config(msg.into())
    }

    pub fn process(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Process(msg.into())
    }

    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(msg.into())
    }

    /** True for errors produced by a subprocess invocation itself
     *
     * # Notes
     * - Backends convert these into failed results instead of propagating
     */
    pub fn is_subprocess_failure(&self) -> bool {
        matches!(
            self,
            Self::SubprocessTimeout { .. } | Self::SubprocessLaunch { .. }
        )
    }
}
