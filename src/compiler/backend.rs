use crate::compiler::dialect::{translator_for, ArgumentTranslator, CompileInvocation, LinkInvocation};
use crate::compiler::{
    CompileOptions, CompilerFeatures, CompilerSpec, CompilerVersion, DiagnosticParser, Dialect,
    HostOs, LanguageStandard, LinkOptions,
};
use crate::result::{CxxBuildError, Result};
use crate::utils::{CommandOutput, ProcessManager};
use serde::Serialize;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;

/** Outcome of one compile, link or whole build
 *
 * # Invariants
 * - `output_file` is set only when `success` is true
 * - a failed result always carries at least one entry in `errors`
 */
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationResult {
    pub success: bool,
    pub output_file: Option<PathBuf>,
    pub duration: Duration,
    pub command_line: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub artifacts: Vec<PathBuf>,
}

impl CompilationResult {
    pub fn failure(errors: Vec<String>, warnings: Vec<String>, duration: Duration) -> Self {
        Self {
            success: false,
            duration,
            errors,
            warnings,
            ..Default::default()
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Clone, Copy)]
enum InvocationKind {
    Compile,
    Link,
}

impl InvocationKind {
    fn label(&self) -> &'static str {
        match self {
            InvocationKind::Compile => "Compilation",
            InvocationKind::Link => "Linking",
        }
    }
}

/** One installed compiler and the two things it can do
 *
 * Immutable after construction. The argument translator is chosen once
 * from the dialect; every invocation spawns exactly one subprocess.
 */
pub struct CompilerBackend {
    name: SmolStr,
    executable: PathBuf,
    dialect: Dialect,
    version: String,
    standard_flags: BTreeMap<LanguageStandard, String>,
    features: CompilerFeatures,
    default_compile_flags: Vec<String>,
    default_link_flags: Vec<String>,
    translator: &'static dyn ArgumentTranslator,
    diagnostics: DiagnosticParser,
    host: HostOs,
    process: ProcessManager,
}

impl fmt::Debug for CompilerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerBackend")
            .field("name", &self.name)
            .field("executable", &self.executable)
            .field("dialect", &self.dialect)
            .field("version", &self.version)
            .finish()
    }
}

impl CompilerBackend {
    /// Builds a backend from a probe spec, a resolved executable and its version string.
    pub fn from_spec(spec: &CompilerSpec, executable: PathBuf, version: impl Into<String>) -> Self {
        let version = version.into();
        let features =
            CompilerFeatures::for_dialect(spec.dialect, CompilerVersion::parse(&version));

        Self {
            name: SmolStr::new(spec.name),
            executable,
            dialect: spec.dialect,
            version,
            standard_flags: spec.standard_flags.clone(),
            features,
            default_compile_flags: spec.default_compile_flags.clone(),
            default_link_flags: spec.default_link_flags.clone(),
            translator: translator_for(spec.dialect),
            diagnostics: DiagnosticParser::new(spec.dialect),
            host: HostOs::current(),
            process: ProcessManager::new(),
        }
    }

    /// Shorthand for a backend using the built-in spec of `dialect` under a custom name.
    pub fn new(
        name: impl Into<SmolStr>,
        executable: impl Into<PathBuf>,
        dialect: Dialect,
        version: impl Into<String>,
    ) -> Self {
        let spec = CompilerSpec::for_dialect(dialect);
        let mut backend = Self::from_spec(&spec, executable.into(), version);
        backend.name = name.into();
        backend
    }

    pub fn with_host(mut self, host: HostOs) -> Self {
        self.host = host;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn features(&self) -> &CompilerFeatures {
        &self.features
    }

    pub fn default_compile_flags(&self) -> &[String] {
        &self.default_compile_flags
    }

    pub fn object_extension(&self) -> &'static str {
        self.dialect.object_extension()
    }

    /// Standards with both a flag and feature support, in ascending order.
    pub fn supported_standards(&self) -> Vec<LanguageStandard> {
        self.standard_flags
            .keys()
            .copied()
            .filter(|std| self.features.supported_standards.contains(std))
            .collect()
    }

    pub fn supports_standard(&self, standard: LanguageStandard) -> bool {
        self.features.supported_standards.contains(&standard)
            && self.standard_flags.contains_key(&standard)
    }

    /// `UnsupportedStandard` (naming the supported set) unless `standard` is usable.
    pub fn check_standard(&self, standard: LanguageStandard) -> Result<()> {
        self.standard_flag(standard).map(|_| ())
    }

    fn standard_flag(&self, standard: LanguageStandard) -> Result<&str> {
        match self.standard_flags.get(&standard) {
            Some(flag) if self.features.supported_standards.contains(&standard) => Ok(flag),
            _ => {
                let supported: Vec<&str> =
                    self.supported_standards().iter().map(|s| s.as_str()).collect();
                Err(CxxBuildError::UnsupportedStandard {
                    standard: standard.to_string(),
                    supported: supported.join(", "),
                })
            }
        }
    }

    /// Full argv (executable first) for compiling `sources` into `output`.
    pub fn compile_command(
        &self,
        sources: &[PathBuf],
        output: &Path,
        standard: LanguageStandard,
        options: &CompileOptions,
    ) -> Result<Vec<String>> {
        let standard_flag = self.standard_flag(standard)?;
        let invocation = CompileInvocation {
            standard_flag,
            sources,
            output,
            options,
            features: &self.features,
            default_flags: &self.default_compile_flags,
        };

        let mut argv = vec![ProcessManager::path_to_arg(&self.executable)];
        argv.extend(self.translator.compile_args(&invocation));
        Ok(argv)
    }

    /// Full argv (executable first) for linking `objects` into `output`.
    pub fn link_command(
        &self,
        objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
    ) -> Result<Vec<String>> {
        options.validate()?;
        let invocation = LinkInvocation {
            objects,
            output,
            options,
            default_flags: &self.default_link_flags,
            host: self.host,
        };

        let mut argv = vec![ProcessManager::path_to_arg(&self.executable)];
        argv.extend(self.translator.link_args(&invocation));
        Ok(argv)
    }

    /** Compiles one translation unit (or several sources into one object)
     *
     * # Errors
     * - `UnsupportedStandard` before anything is spawned
     * - `Io` if the output directory cannot be created
     *
     * # Returns
     * - A failed result for non-zero exits, timeouts, launch failures, or a
     *   zero exit that left no output file behind
     */
    pub async fn compile(
        &self,
        sources: &[PathBuf],
        output: &Path,
        standard: LanguageStandard,
        options: &CompileOptions,
        timeout: Option<Duration>,
    ) -> Result<CompilationResult> {
        let argv = self.compile_command(sources, output, standard, options)?;
        self.invoke(InvocationKind::Compile, argv, output, timeout)
            .await
    }

    /** Links object files into an executable or library
     *
     * # Errors
     * - `Config` if `options` ask for both shared and static output
     * - `Io` if the output directory cannot be created
     */
    pub async fn link(
        &self,
        objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
        timeout: Option<Duration>,
    ) -> Result<CompilationResult> {
        let argv = self.link_command(objects, output, options)?;
        self.invoke(InvocationKind::Link, argv, output, timeout).await
    }

    async fn invoke(
        &self,
        kind: InvocationKind,
        argv: Vec<String>,
        output: &Path,
        timeout: Option<Duration>,
    ) -> Result<CompilationResult> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // a leftover from an earlier run must not count as this run's output
        match fs::remove_file(output).await {
            Ok(()) => log::debug!("Removed stale output: {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let start = Instant::now();
        let outcome = self.process.run(&argv, timeout).await;

        let result = match outcome {
            Ok(output_capture) => self.interpret(kind, &output_capture, output, argv, start).await,
            Err(e) if e.is_subprocess_failure() => CompilationResult {
                command_line: argv,
                ..CompilationResult::failure(
                    vec![format!("{} failed: {}", kind.label(), e)],
                    Vec::new(),
                    start.elapsed(),
                )
            },
            Err(e) => return Err(e),
        };

        if result.success {
            log::info!(
                "{} successful in {:.1}ms: {}",
                kind.label(),
                result.duration.as_secs_f64() * 1000.0,
                output.display()
            );
        } else {
            log::error!(
                "{} failed in {:.1}ms with {} error(s): {}",
                kind.label(),
                result.duration.as_secs_f64() * 1000.0,
                result.errors.len(),
                output.display()
            );
        }

        Ok(result)
    }

    async fn interpret(
        &self,
        kind: InvocationKind,
        capture: &CommandOutput,
        output: &Path,
        argv: Vec<String>,
        start: Instant,
    ) -> CompilationResult {
        let diagnostics = self.diagnostics.parse(&capture.stderr);
        let output_exists = fs::metadata(output).await.is_ok();
        let success = capture.success() && output_exists;

        let mut errors = diagnostics.errors;
        if !success && errors.is_empty() {
            let reason = if !capture.stderr.is_empty() {
                capture.stderr.clone()
            } else if capture.success() {
                format!("expected output was not produced: {}", output.display())
            } else {
                match capture.exit_code {
                    Some(code) => format!("process exited with code {}", code),
                    None => "process terminated by signal".to_string(),
                }
            };
            errors.push(format!("{} failed: {}", kind.label(), reason));
        }

        CompilationResult {
            success,
            output_file: success.then(|| output.to_path_buf()),
            duration: start.elapsed(),
            command_line: argv,
            errors,
            warnings: diagnostics.warnings,
            artifacts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_standards_intersect_flags_and_features() {
        let gcc = CompilerBackend::new("GCC", "/usr/bin/g++", Dialect::Gcc, "10.2.1");
        assert!(gcc.supports_standard(LanguageStandard::Cpp20));
        assert!(!gcc.supports_standard(LanguageStandard::Cpp23));
        assert!(!gcc.supports_standard(LanguageStandard::Cpp26));

        let msvc = CompilerBackend::new("MSVC", "cl.exe", Dialect::Msvc, "19.38.33130");
        // feature table lists c++11 but cl.exe has no flag for it
        assert!(!msvc.supports_standard(LanguageStandard::Cpp11));
        assert_eq!(
            msvc.supported_standards(),
            vec![
                LanguageStandard::Cpp14,
                LanguageStandard::Cpp17,
                LanguageStandard::Cpp20,
                LanguageStandard::Cpp23
            ]
        );
    }

    #[test]
    fn compile_command_starts_with_executable() {
        let clang = CompilerBackend::new("Clang", "/usr/bin/clang++", Dialect::Clang, "17.0.1");
        let argv = clang
            .compile_command(
                &[PathBuf::from("a.cpp")],
                Path::new("build/a.o"),
                LanguageStandard::Cpp23,
                &CompileOptions::default(),
            )
            .unwrap();
        assert_eq!(argv[0], "/usr/bin/clang++");
        assert_eq!(argv[1], "-std=c++23");
        assert!(argv.contains(&"-Wall".to_string()));
    }

    #[tokio::test]
    async fn unsupported_standard_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // executable does not exist: any spawn attempt would produce a failed
        // result rather than an error
        let gcc = CompilerBackend::new("GCC", dir.path().join("missing-g++"), Dialect::Gcc, "9.4.0");
        let err = gcc
            .compile(
                &[PathBuf::from("a.cpp")],
                &dir.path().join("obj/a.o"),
                LanguageStandard::Cpp23,
                &CompileOptions::default(),
                None,
            )
            .await
            .unwrap_err();

        match err {
            CxxBuildError::UnsupportedStandard { standard, supported } => {
                assert_eq!(standard, "c++23");
                assert!(supported.contains("c++20"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("obj").exists());
    }

    #[tokio::test]
    async fn launch_failure_becomes_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let gcc = CompilerBackend::new("GCC", dir.path().join("missing-g++"), Dialect::Gcc, "13.1.0");
        let result = gcc
            .compile(
                &[PathBuf::from("a.cpp")],
                &dir.path().join("obj/a.o"),
                LanguageStandard::Cpp17,
                &CompileOptions::default(),
                None,
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output_file.is_none());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Failed to launch"));
        assert!(dir.path().join("obj").is_dir());
    }

    #[tokio::test]
    async fn link_rejects_shared_and_static() {
        let gcc = CompilerBackend::new("GCC", "/usr/bin/g++", Dialect::Gcc, "13.1.0");
        let options = LinkOptions {
            shared: true,
            static_link: true,
            ..Default::default()
        };
        let err = gcc
            .link(&[PathBuf::from("a.o")], Path::new("app"), &options, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CxxBuildError::Config(_)));
    }

    #[cfg(unix)]
    mod with_scripts {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn zero_exit_without_output_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(dir.path(), "fake-g++", "echo 'usage: fake-g++ [options]'; exit 0");
            let gcc = CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.1.0");
            let result = gcc
                .compile(
                    &[PathBuf::from("a.cpp")],
                    &dir.path().join("a.o"),
                    LanguageStandard::Cpp17,
                    &CompileOptions::default(),
                    None,
                )
                .await
                .unwrap();
            assert!(!result.success);
            assert!(result.errors[0].contains("expected output was not produced"));
        }

        #[tokio::test]
        async fn leftover_object_does_not_mask_missing_output() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(dir.path(), "fake-g++", "echo 'usage: fake-g++ [options]'; exit 0");
            let gcc = CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.1.0");
            let output = dir.path().join("a.o");
            std::fs::write(&output, "object from an earlier build").unwrap();

            let result = gcc
                .compile(
                    &[PathBuf::from("a.cpp")],
                    &output,
                    LanguageStandard::Cpp17,
                    &CompileOptions::default(),
                    None,
                )
                .await
                .unwrap();
            assert!(!result.success);
            assert!(result.output_file.is_none());
            assert!(result.errors[0].contains("expected output was not produced"));
            assert!(!output.exists());
        }

        #[tokio::test]
        async fn unmatched_stderr_is_synthesized_into_error() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(dir.path(), "fake-g++", "echo 'ld: cannot find -lfoo' >&2; exit 1");
            let gcc = CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.1.0");
            let result = gcc
                .link(&[PathBuf::from("a.o")], &dir.path().join("app"), &LinkOptions::default(), None)
                .await
                .unwrap();
            assert!(!result.success);
            assert_eq!(result.errors, vec!["Linking failed: ld: cannot find -lfoo"]);
            assert!(result.command_line.contains(&"a.o".to_string()));
        }

        #[tokio::test]
        async fn parsed_warnings_survive_success() {
            let dir = tempfile::tempdir().unwrap();
            let body = "for last; do :; done\n\
                        echo 'a.cpp:1:1: warning: something odd' >&2\n\
                        : > \"$last\"";
            let exe = script(dir.path(), "fake-g++", body);
            let gcc = CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.1.0");
            let output = dir.path().join("a.o");
            let result = gcc
                .compile(
                    &[PathBuf::from("a.cpp")],
                    &output,
                    LanguageStandard::Cpp17,
                    &CompileOptions::default(),
                    None,
                )
                .await
                .unwrap();
            assert!(result.success, "errors: {:?}", result.errors);
            assert_eq!(result.output_file.as_deref(), Some(output.as_path()));
            assert_eq!(result.warnings, vec!["a.cpp:1:1: warning: something odd"]);
            assert!(result.errors.is_empty());
        }

        #[tokio::test]
        async fn timeout_becomes_failed_result() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(dir.path(), "slow-g++", "sleep 5");
            let gcc = CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.1.0");
            let result = gcc
                .compile(
                    &[PathBuf::from("a.cpp")],
                    &dir.path().join("a.o"),
                    LanguageStandard::Cpp17,
                    &CompileOptions::default(),
                    Some(Duration::from_millis(100)),
                )
                .await
                .unwrap();
            assert!(!result.success);
            assert!(result.errors[0].contains("timed out"));
        }
    }
}
