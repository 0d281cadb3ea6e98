use crate::build::scheduler::{
    default_jobs, run_parallel, run_sequential, CompileJob, CompileUnit, ScheduleOutcome, MAX_JOBS,
};
use crate::cache::DependencyCache;
use crate::compiler::{
    CompilationResult, CompileOptions, CompilerBackend, CompilerRegistry, LanguageStandard,
    LinkOptions,
};
use crate::result::{CxxBuildError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;

pub const DEFAULT_BUILD_DIR: &str = "build";

/// Everything one `build` call needs.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub compiler: Option<String>,
    pub standard: LanguageStandard,
    pub compile_options: CompileOptions,
    pub link_options: LinkOptions,
    pub incremental: bool,
    pub force_rebuild: bool,
    pub timeout: Option<Duration>,
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: PathBuf::new(),
            compiler: None,
            standard: LanguageStandard::default(),
            compile_options: CompileOptions::default(),
            link_options: LinkOptions::default(),
            incremental: true,
            force_rebuild: false,
            timeout: None,
        }
    }
}

impl BuildRequest {
    pub fn new(sources: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            output: output.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Planning,
    Compiling,
    Linking,
    Done,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Idle => "idle",
            BuildPhase::Planning => "planning",
            BuildPhase::Compiling => "compiling",
            BuildPhase::Linking => "linking",
            BuildPhase::Done => "done",
            BuildPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters for the last build, logged when it finishes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildMetrics {
    pub total_files: usize,
    pub compiled_files: usize,
    pub cached_files: usize,
    pub compile_time: Duration,
    pub link_time: Duration,
    pub cache_hit_rate: f64,
}

/** Incremental build driver
 *
 * # State Machine
 * `Planning -> Compiling -> Linking -> Done`, with any failing phase
 * ending in `Failed`. Linking is reached only when every unit that
 * needed a compile succeeded.
 *
 * # Architecture
 * - Borrows a [`CompilerRegistry`] built by the caller; no global state
 * - Owns the [`DependencyCache`] for its build directory: read at
 *   construction, written once after a fully successful build
 * - Objects live in `<build_dir>/<compiler>_<standard>/<file name>.<o|obj>`
 *
 * # Example
 * ```no_run
 * use cxxbuild::build::{BuildOrchestrator, BuildRequest};
 * use cxxbuild::compiler::CompilerRegistry;
 *
 * #[tokio::main(flavor = "current_thread")]
 * async fn main() -> cxxbuild::result::Result<()> {
 *     let mut registry = CompilerRegistry::new();
 *     registry.detect().await?;
 *
 *     let mut orchestrator = BuildOrchestrator::new(&registry, "build", true).await;
 *     let request = BuildRequest::new(vec!["main.cpp".into()], "app");
 *     let result = orchestrator.build(request).await?;
 *     println!("success: {}", result.success);
 *     Ok(())
 * }
 * ```
 */
pub struct BuildOrchestrator<'a> {
    registry: &'a CompilerRegistry,
    build_dir: PathBuf,
    cache: DependencyCache,
    jobs: usize,
    phase: BuildPhase,
    metrics: BuildMetrics,
}

impl<'a> BuildOrchestrator<'a> {
    pub async fn new(
        registry: &'a CompilerRegistry,
        build_dir: impl Into<PathBuf>,
        cache_enabled: bool,
    ) -> BuildOrchestrator<'a> {
        let build_dir = build_dir.into();
        let cache = DependencyCache::load(&build_dir, cache_enabled).await;

        log::info!(
            "Initialized build orchestrator: build_dir={}, cache={}",
            build_dir.display(),
            cache_enabled
        );

        Self {
            registry,
            build_dir,
            cache,
            jobs: default_jobs(),
            phase: BuildPhase::Idle,
            metrics: BuildMetrics::default(),
        }
    }

    /// Caps concurrent compiler processes; clamped to `1..=64`.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn metrics(&self) -> &BuildMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn enter(&mut self, phase: BuildPhase) {
        log::debug!("Build phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// `<build_dir>/<compiler>_<standard>/<file name>.<ext>`
    pub fn object_path(
        &self,
        backend: &CompilerBackend,
        standard: LanguageStandard,
        source: &Path,
    ) -> PathBuf {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());

        self.build_dir
            .join(format!("{}_{}", backend.name(), standard))
            .join(format!("{}.{}", file_name, backend.object_extension()))
    }

    /** Builds `request.sources` into `request.output`
     *
     * # Errors
     * - `CompilerNotFound` / `NoCompilerFound` from the registry
     * - `SourceNotFound` for the first missing source, before any work
     * - `UnsupportedStandard` if the backend lacks `request.standard`
     * - `Config` for conflicting link options or colliding object names
     *
     * # Returns
     * - A successful result naming the linked artifact, or a failed one
     *   carrying the diagnostics of the first failing compile or the link
     *
     * # Notes
     * - The dependency cache is saved only when the whole build succeeds
     */
    pub async fn build(&mut self, request: BuildRequest) -> Result<CompilationResult> {
        let started = Instant::now();
        self.metrics = BuildMetrics::default();
        self.enter(BuildPhase::Planning);

        let planned = self.plan(&request).await;
        let (backend, units, pending) = match planned {
            Ok(plan) => plan,
            Err(e) => {
                self.enter(BuildPhase::Failed);
                return Err(e);
            }
        };

        self.metrics.total_files = units.len();
        self.metrics.compiled_files = pending.len();
        self.metrics.cached_files = units.len() - pending.len();

        log::info!(
            "Building {} with {} {}: {} of {} source(s) need compiling",
            request.output.display(),
            backend.name(),
            backend.version(),
            pending.len(),
            units.len()
        );

        self.enter(BuildPhase::Compiling);
        let compile_started = Instant::now();
        let job = CompileJob {
            backend: Arc::clone(&backend),
            standard: request.standard,
            options: Arc::new(request.compile_options.clone()),
            timeout: request.timeout,
        };

        let scheduled = if backend.features().supports_parallel && pending.len() > 1 && self.jobs > 1 {
            run_parallel(&job, pending, self.jobs).await
        } else {
            run_sequential(&job, pending).await
        };
        self.metrics.compile_time = compile_started.elapsed();

        let compiled = match scheduled {
            Ok(ScheduleOutcome::Completed(compiled)) => compiled,
            Ok(ScheduleOutcome::Failed {
                unit,
                result,
                completed,
            }) => {
                self.enter(BuildPhase::Failed);
                log::error!("Compilation of {} failed; skipping link", unit.source.display());

                let mut warnings: Vec<String> = completed
                    .into_iter()
                    .flat_map(|(_, done)| done.warnings)
                    .collect();
                warnings.extend(result.warnings);

                return Ok(CompilationResult {
                    command_line: result.command_line,
                    ..CompilationResult::failure(result.errors, warnings, started.elapsed())
                });
            }
            Err(e) => {
                self.enter(BuildPhase::Failed);
                return Err(e);
            }
        };

        for (unit, _) in &compiled {
            if let Err(e) = self
                .cache
                .record_success(&unit.source, &unit.object, &request.compile_options.include_paths)
                .await
            {
                log::error!(
                    "Failed to update cache for {}: {}; it will be recompiled next build",
                    unit.source.display(),
                    e
                );
                self.cache.forget(&unit.source, &unit.object).await;
            }
        }

        self.enter(BuildPhase::Linking);
        let objects: Vec<PathBuf> = units.iter().map(|unit| unit.object.clone()).collect();
        let link_started = Instant::now();
        let linked = backend
            .link(&objects, &request.output, &request.link_options, request.timeout)
            .await;
        self.metrics.link_time = link_started.elapsed();

        let link_result = match linked {
            Ok(result) => result,
            Err(e) => {
                self.enter(BuildPhase::Failed);
                return Err(e);
            }
        };

        let mut warnings: Vec<String> = compiled
            .into_iter()
            .flat_map(|(_, result)| result.warnings)
            .collect();
        warnings.extend(link_result.warnings);

        if !link_result.success {
            self.enter(BuildPhase::Failed);
            return Ok(CompilationResult {
                command_line: link_result.command_line,
                ..CompilationResult::failure(link_result.errors, warnings, started.elapsed())
            });
        }

        if let Err(e) = self.cache.save().await {
            log::warn!("Failed to save build cache: {}", e);
        }

        self.metrics.cache_hit_rate = if self.metrics.total_files > 0 {
            self.metrics.cached_files as f64 / self.metrics.total_files as f64
        } else {
            0.0
        };
        self.enter(BuildPhase::Done);

        log::info!(
            "Build completed: total={} compiled={} cached={} compile_time={:.3}s link_time={:.3}s cache_hit_rate={:.1}%",
            self.metrics.total_files,
            self.metrics.compiled_files,
            self.metrics.cached_files,
            self.metrics.compile_time.as_secs_f64(),
            self.metrics.link_time.as_secs_f64(),
            self.metrics.cache_hit_rate * 100.0
        );

        let mut artifacts = Vec::with_capacity(objects.len() + 1);
        artifacts.push(request.output.clone());
        artifacts.extend(objects);

        Ok(CompilationResult {
            success: true,
            output_file: link_result.output_file,
            duration: started.elapsed(),
            command_line: link_result.command_line,
            errors: Vec::new(),
            warnings,
            artifacts,
        })
    }

    async fn plan(
        &self,
        request: &BuildRequest,
    ) -> Result<(Arc<CompilerBackend>, Vec<CompileUnit>, Vec<CompileUnit>)> {
        let backend = self.registry.get(request.compiler.as_deref())?;

        if request.sources.is_empty() {
            return Err(CxxBuildError::config("No source files given"));
        }

        for source in &request.sources {
            let is_file = fs::metadata(source).await.map(|m| m.is_file()).unwrap_or(false);
            if !is_file {
                return Err(CxxBuildError::SourceNotFound {
                    path: source.clone(),
                });
            }
        }

        backend.check_standard(request.standard)?;
        request.link_options.validate()?;

        let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
        let mut units = Vec::with_capacity(request.sources.len());
        for (index, source) in request.sources.iter().enumerate() {
            let object = self.object_path(&backend, request.standard, source);
            if let Some(previous) = seen.insert(object.clone(), source.as_path()) {
                return Err(CxxBuildError::config(format!(
                    "{} and {} would both compile to {}",
                    previous.display(),
                    source.display(),
                    object.display()
                )));
            }
            units.push(CompileUnit {
                index,
                source: source.clone(),
                object,
            });
        }

        let pending = if request.force_rebuild || !request.incremental {
            log::debug!(
                "Rebuilding all sources (force_rebuild={}, incremental={})",
                request.force_rebuild,
                request.incremental
            );
            units.clone()
        } else {
            let mut pending = Vec::new();
            for unit in &units {
                if self.cache.needs_rebuild(&unit.source, &unit.object).await {
                    pending.push(unit.clone());
                } else {
                    log::debug!("Up to date: {}", unit.source.display());
                }
            }
            pending
        };

        Ok((backend, units, pending))
    }

    /** Removes build outputs
     *
     * # Arguments
     * * `aggressive` - Delete the whole build directory instead of only
     *   object files
     *
     * # Returns
     * - Number of files removed (the directory itself counts as one when
     *   aggressive)
     *
     * # Notes
     * - Always clears the in-memory cache and deletes the cache file
     */
    pub async fn clean(&mut self, aggressive: bool) -> Result<usize> {
        let mut removed = 0;

        if fs::metadata(&self.build_dir).await.is_ok() {
            if aggressive {
                fs::remove_dir_all(&self.build_dir).await?;
                log::info!("Removed build directory {}", self.build_dir.display());
                removed = 1;
            } else {
                removed = remove_objects(&self.build_dir).await?;
                log::info!(
                    "Removed {} object file(s) from {}",
                    removed,
                    self.build_dir.display()
                );
            }
        }

        self.cache.clear().await?;
        Ok(removed)
    }
}

async fn remove_objects(root: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let is_object = path
                .extension()
                .map_or(false, |ext| ext == "o" || ext == "obj");
            if is_object {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Dialect;

    fn registry() -> CompilerRegistry {
        CompilerRegistry::from_backends(vec![
            CompilerBackend::new("GCC", "/usr/bin/g++", Dialect::Gcc, "13.2.0"),
            CompilerBackend::new("MSVC", "cl.exe", Dialect::Msvc, "19.38.33130"),
        ])
    }

    #[tokio::test]
    async fn object_paths_are_per_compiler_and_standard() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BuildOrchestrator::new(&registry, dir.path(), false).await;

        let gcc = registry.get(Some("gcc")).unwrap();
        let msvc = registry.get(Some("msvc")).unwrap();
        assert_eq!(
            orchestrator.object_path(&gcc, LanguageStandard::Cpp17, Path::new("src/main.cpp")),
            dir.path().join("GCC_c++17").join("main.cpp.o")
        );
        assert_eq!(
            orchestrator.object_path(&msvc, LanguageStandard::Cpp20, Path::new("main.cpp")),
            dir.path().join("MSVC_c++20").join("main.cpp.obj")
        );
    }

    #[tokio::test]
    async fn missing_source_fails_before_any_work() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = BuildOrchestrator::new(&registry, dir.path().join("build"), true).await;

        let request = BuildRequest::new(vec![dir.path().join("missing.cpp")], dir.path().join("app"));
        let err = orchestrator.build(request).await.unwrap_err();
        assert!(matches!(err, CxxBuildError::SourceNotFound { .. }));
        assert_eq!(orchestrator.phase(), BuildPhase::Failed);
        assert!(!dir.path().join("build").exists());
    }

    #[tokio::test]
    async fn colliding_file_names_are_rejected() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
            std::fs::write(dir.path().join(sub).join("util.cpp"), "int f();").unwrap();
        }

        let mut orchestrator = BuildOrchestrator::new(&registry, dir.path().join("build"), true).await;
        let request = BuildRequest::new(
            vec![dir.path().join("a/util.cpp"), dir.path().join("b/util.cpp")],
            dir.path().join("app"),
        );
        let err = orchestrator.build(request).await.unwrap_err();
        assert!(matches!(err, CxxBuildError::Config(_)));
    }

    #[tokio::test]
    async fn clean_removes_only_objects_unless_aggressive() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let build_dir = dir.path().join("build");
        let objects = build_dir.join("GCC_c++17");
        std::fs::create_dir_all(&objects).unwrap();
        std::fs::write(objects.join("a.cpp.o"), "").unwrap();
        std::fs::write(objects.join("b.cpp.obj"), "").unwrap();
        std::fs::write(build_dir.join("notes.txt"), "").unwrap();
        std::fs::write(build_dir.join(DependencyCache::FILE_NAME), "{}").unwrap();

        let mut orchestrator = BuildOrchestrator::new(&registry, &build_dir, true).await;
        assert_eq!(orchestrator.clean(false).await.unwrap(), 2);
        assert!(!objects.join("a.cpp.o").exists());
        assert!(build_dir.join("notes.txt").exists());
        assert!(!build_dir.join(DependencyCache::FILE_NAME).exists());

        assert_eq!(orchestrator.clean(true).await.unwrap(), 1);
        assert!(!build_dir.exists());
        assert_eq!(orchestrator.clean(true).await.unwrap(), 0);
    }

    #[test]
    fn request_defaults_to_incremental() {
        let request = BuildRequest::new(vec![PathBuf::from("a.cpp")], "app");
        assert!(request.incremental);
        assert!(!request.force_rebuild);
        assert_eq!(request.standard, LanguageStandard::Cpp17);
    }
}
