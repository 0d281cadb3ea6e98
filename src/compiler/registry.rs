use crate::compiler::{CompilerBackend, CompilerSpec, Dialect, HostOs, LanguageStandard};
use crate::result::{CxxBuildError, Result};
use crate::utils::ProcessManager;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

static GNU_VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+\.\d+)").unwrap());

static MSVC_VERSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Version\s+(\d+\.\d+\.\d+)").unwrap());

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const UNKNOWN_VERSION: &str = "unknown";

/// Flattened view of one backend for `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct CompilerSummary {
    pub name: String,
    pub command: PathBuf,
    pub dialect: Dialect,
    pub version: String,
    pub standards: Vec<LanguageStandard>,
    pub parallel: bool,
    pub pch: bool,
    pub modules: bool,
    pub concepts: bool,
}

impl From<&CompilerBackend> for CompilerSummary {
    fn from(backend: &CompilerBackend) -> Self {
        let features = backend.features();
        Self {
            name: backend.name().to_string(),
            command: backend.executable().to_path_buf(),
            dialect: backend.dialect(),
            version: backend.version().to_string(),
            standards: backend.supported_standards(),
            parallel: features.supports_parallel,
            pch: features.supports_pch,
            modules: features.supports_modules,
            concepts: features.supports_concepts,
        }
    }
}

/** Name-keyed set of detected compiler backends
 *
 * # Architecture
 * - Backends are kept in probe order (GCC, Clang, MSVC); the first
 *   detected one is the default
 * - Lookups are case-insensitive on the backend name
 * - Backends are shared behind `Arc` so concurrent compile jobs can hold
 *   one without borrowing the registry
 *
 * # Notes
 * - `from_backends` bypasses detection entirely; useful when the caller
 *   already knows which toolchains to use
 */
#[derive(Debug, Default)]
pub struct CompilerRegistry {
    backends: Vec<Arc<CompilerBackend>>,
    process: ProcessManager,
    detected: bool,
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose detection looks only inside `search_path`.
    pub fn with_search_path(search_path: impl Into<PathBuf>) -> Self {
        Self {
            process: ProcessManager::with_search_path(search_path),
            ..Self::default()
        }
    }

    /// Registry pre-populated with `backends`; the first one is the default.
    pub fn from_backends(backends: Vec<CompilerBackend>) -> Self {
        Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            process: ProcessManager::new(),
            detected: true,
        }
    }

    /** Probes the system for every known compiler
     *
     * # Process Flow
     * 1. Clears any previously detected backends
     * 2. Probes each known spec concurrently
     * 3. Registers hits in probe order
     *
     * # Returns
     * - Number of backends detected
     *
     * # Notes
     * - A probe that fails for any reason is logged and skipped
     * - Running detection twice yields the same registry
     */
    pub async fn detect(&mut self) -> Result<usize> {
        self.backends.clear();
        log::info!("Starting compiler detection...");

        let specs = CompilerSpec::known();
        let mut probes = JoinSet::new();

        for (index, spec) in specs.into_iter().enumerate() {
            let process = self.process.clone();
            probes.spawn(async move { (index, probe(process, spec).await) });
        }

        let mut found: Vec<(usize, CompilerBackend)> = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, Some(backend))) => {
                    log::info!(
                        "Detected {} {}: {}",
                        backend.name(),
                        backend.version(),
                        backend.executable().display()
                    );
                    found.push((index, backend));
                }
                Ok((_, None)) => {}
                Err(e) => log::warn!("Compiler probe task failed: {}", e),
            }
        }

        found.sort_by_key(|(index, _)| *index);
        self.backends = found
            .into_iter()
            .map(|(_, backend)| Arc::new(backend))
            .collect();
        self.detected = true;

        log::info!(
            "Detection complete. Found {} compilers.",
            self.backends.len()
        );
        Ok(self.backends.len())
    }

    /// Runs detection unless it already ran or the registry was pre-populated.
    pub async fn ensure_detected(&mut self) -> Result<()> {
        if !self.detected {
            self.detect().await?;
        }
        Ok(())
    }

    /** Looks up a backend by name, or the default one
     *
     * # Errors
     * - `NoCompilerFound` if nothing is registered
     * - `CompilerNotFound` (with the available names) on a miss
     */
    pub fn get(&self, name: Option<&str>) -> Result<Arc<CompilerBackend>> {
        let default = self.backends.first().ok_or(CxxBuildError::NoCompilerFound)?;

        match name {
            None => Ok(Arc::clone(default)),
            Some(wanted) => self
                .backends
                .iter()
                .find(|b| b.name().eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| CxxBuildError::CompilerNotFound {
                    name: wanted.to_string(),
                    available: self.names().join(", "),
                }),
        }
    }

    pub fn list(&self) -> &[Arc<CompilerBackend>] {
        &self.backends
    }

    pub fn summaries(&self) -> Vec<CompilerSummary> {
        self.backends.iter().map(|b| CompilerSummary::from(b.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.backends.first().map(|b| b.name())
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

async fn probe(process: ProcessManager, spec: CompilerSpec) -> Option<CompilerBackend> {
    let executable = match locate(&process, &spec).await {
        Some(path) => path,
        None => {
            log::debug!("{} not found", spec.name);
            return None;
        }
    };

    let version = query_version(&process, &executable, spec.dialect).await;
    Some(CompilerBackend::from_spec(&spec, executable, version))
}

async fn locate(process: &ProcessManager, spec: &CompilerSpec) -> Option<PathBuf> {
    let on_path = spec
        .command_names
        .iter()
        .find_map(|name| process.find_executable(name).ok());

    if on_path.is_some() || spec.dialect != Dialect::Msvc || HostOs::current() != HostOs::Windows {
        return on_path;
    }

    locate_msvc_installation(process).await
}

/** Finds `cl.exe` through the Visual Studio installer when it is not on `PATH`
 *
 * # Process Flow
 * 1. Asks `vswhere.exe` for the latest installation with the VC tools
 * 2. Picks the lexicographically greatest `VC/Tools/MSVC/<version>`
 * 3. Tries `bin/Hostx64/x64/cl.exe`, then `bin/Hostx86/x86/cl.exe`
 */
async fn locate_msvc_installation(process: &ProcessManager) -> Option<PathBuf> {
    let program_files = std::env::var_os("ProgramFiles(x86)")?;
    let vswhere = PathBuf::from(program_files)
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");

    if !vswhere.exists() {
        return None;
    }

    let argv: Vec<String> = [
        ProcessManager::path_to_arg(&vswhere).as_str(),
        "-latest",
        "-products",
        "*",
        "-requires",
        "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
        "-property",
        "installationPath",
        "-format",
        "value",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let output = match process.run(&argv, Some(VERSION_QUERY_TIMEOUT)).await {
        Ok(output) if output.success() && !output.stdout.is_empty() => output,
        Ok(_) => return None,
        Err(e) => {
            log::warn!("Failed to find MSVC with vswhere: {}", e);
            return None;
        }
    };

    let tools = Path::new(output.stdout.trim())
        .join("VC")
        .join("Tools")
        .join("MSVC");
    let latest = latest_toolset(&tools).await?;

    [("x64", "x64"), ("x86", "x86")]
        .iter()
        .map(|(host, target)| {
            latest
                .join("bin")
                .join(format!("Host{}", host))
                .join(target)
                .join("cl.exe")
        })
        .find(|candidate| candidate.exists())
}

async fn latest_toolset(tools: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(tools).await.ok()?;
    let mut latest: Option<PathBuf> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let path = entry.path();
        if latest.as_ref().map_or(true, |current| path.file_name() > current.file_name()) {
            latest = Some(path);
        }
    }

    latest
}

/** Asks a compiler for its version
 *
 * # Returns
 * - `N.N.N` on success
 * - `"unknown"` if the query fails, times out or prints nothing parseable
 *
 * # Notes
 * - gcc/clang: `--version`, first line of stdout (stderr as fallback)
 * - msvc: the bare executable prints its banner with `Version N.N.N`
 */
pub async fn query_version(process: &ProcessManager, executable: &Path, dialect: Dialect) -> String {
    let mut argv = vec![ProcessManager::path_to_arg(executable)];
    if dialect.is_gnu_compatible() {
        argv.push("--version".into());
    }

    let output = match process.run(&argv, Some(VERSION_QUERY_TIMEOUT)).await {
        Ok(output) => output,
        Err(e) => {
            log::warn!("Failed to get version for {}: {}", executable.display(), e);
            return UNKNOWN_VERSION.to_string();
        }
    };

    let parsed = match dialect {
        Dialect::Msvc => parse_msvc_version(&output.stderr)
            .or_else(|| parse_msvc_version(&output.stdout)),
        Dialect::Gcc | Dialect::Clang => parse_gnu_version(&output.stdout)
            .or_else(|| parse_gnu_version(&output.stderr)),
    };

    parsed.unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

fn parse_gnu_version(output: &str) -> Option<String> {
    let first_line = output.lines().next()?;
    GNU_VERSION_REGEX
        .captures(first_line)
        .map(|caps| caps[1].to_string())
}

fn parse_msvc_version(output: &str) -> Option<String> {
    MSVC_VERSION_REGEX
        .captures(output)
        .map(|caps| caps[1].to_string())
}
