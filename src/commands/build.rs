use crate::build::{
    default_jobs, overlay, overlay_list, BuildFileConfig, BuildOrchestrator, BuildRequest,
    DEFAULT_BUILD_DIR,
};
use crate::cli::parser::CliParser;
use crate::cli::BuildArgs;
use crate::compiler::{
    CompilationResult, CompileOptions, CompilerRegistry, LanguageStandard, LinkOptions,
    OptimizationLevel,
};
use crate::result::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub async fn execute(args: BuildArgs, verbose: bool) -> Result<bool> {
    let mut cmd = BuildCommand::new(verbose);
    cmd.execute(args).await
}

/// A build request with its build-level settings, after merging config and CLI.
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    pub request: BuildRequest,
    pub build_dir: PathBuf,
    pub jobs: usize,
}

/** Merges a build file underneath command-line arguments
 *
 * # Rules
 * - Scalars: the CLI value replaces the config value when given
 * - Lists (and the define map): CLI values replace config values when
 *   at least one was given
 * - Booleans: CLI flag OR config value
 * - `incremental` is off unless the flag or the config turns it on
 */
pub fn resolve_build(args: BuildArgs, config: BuildFileConfig) -> Result<ResolvedBuild> {
    let standard = match &args.standard {
        Some(standard) => standard.parse::<LanguageStandard>()?,
        None => config.standard()?.unwrap_or_default(),
    };

    let BuildFileConfig {
        compile_options: file_compile,
        link_options: file_link,
        options: file_options,
    } = config;

    let defines = if args.defines.is_empty() {
        file_compile.defines
    } else {
        CliParser::parse_defines(&args.defines)?
    };

    let optimization = match &args.optimization {
        Some(level) => level.parse::<OptimizationLevel>()?,
        None => file_compile.optimization,
    };

    let compile_options = CompileOptions {
        include_paths: overlay_list(args.include_paths, file_compile.include_paths),
        defines,
        warnings: overlay_list(args.warnings, file_compile.warnings),
        optimization,
        debug: args.debug || file_compile.debug,
        position_independent: args.pic || file_compile.position_independent,
        sanitizers: overlay_list(args.sanitizers, file_compile.sanitizers),
        standard_library: overlay(args.stdlib, file_compile.standard_library),
        extra_flags: overlay_list(args.compile_flags, file_compile.extra_flags),
    };

    let link_options = LinkOptions {
        library_paths: overlay_list(args.library_paths, file_link.library_paths),
        libraries: overlay_list(args.libraries, file_link.libraries),
        runtime_library_paths: overlay_list(
            args.runtime_library_paths,
            file_link.runtime_library_paths,
        ),
        shared: args.shared || file_link.shared,
        static_link: args.static_link || file_link.static_link,
        strip_symbols: args.strip || file_link.strip_symbols,
        map_file: overlay(args.map_file, file_link.map_file),
        extra_flags: overlay_list(args.link_flags, file_link.extra_flags),
    };
    link_options.validate()?;

    let jobs = match overlay(args.jobs, file_options.jobs) {
        Some(jobs) => CliParser::validate_jobs(jobs)?,
        None => default_jobs(),
    };

    let request = BuildRequest {
        sources: args.sources,
        output: args.output,
        compiler: overlay(args.compiler, file_options.compiler),
        standard,
        compile_options,
        link_options,
        incremental: args.incremental || file_options.incremental.unwrap_or(false),
        force_rebuild: args.force_rebuild,
        timeout: CliParser::parse_timeout(args.timeout)?,
    };

    Ok(ResolvedBuild {
        request,
        build_dir: overlay(args.build_dir, file_options.build_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR)),
        jobs,
    })
}

#[derive(Default)]
pub struct BuildCommand {
    verbose: bool,
}

impl BuildCommand {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub async fn execute(&mut self, args: BuildArgs) -> Result<bool> {
        let config = match &args.config {
            Some(path) => {
                let path = CliParser::validate_config_path(path)?;
                BuildFileConfig::from_file(&path).await?
            }
            None => BuildFileConfig::default(),
        };

        let resolved = resolve_build(args, config)?;

        let build_spinner = ProgressBar::new_spinner();
        build_spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        build_spinner.set_message("Detecting compilers...");
        build_spinner.enable_steady_tick(Duration::from_millis(100));

        let mut registry = CompilerRegistry::new();
        registry.ensure_detected().await?;

        if self.verbose {
            build_spinner.suspend(|| {
                println!("Build configuration:");
                println!("  Sources: {}", resolved.request.sources.len());
                println!("  Output: {}", resolved.request.output.display());
                println!(
                    "  Compiler: {}",
                    resolved
                        .request
                        .compiler
                        .as_deref()
                        .or(registry.default_name())
                        .unwrap_or("none")
                );
                println!("  Standard: {}", resolved.request.standard);
                println!("  Build dir: {}", resolved.build_dir.display());
                println!("  Jobs: {}", resolved.jobs);
                println!("  Incremental: {}", resolved.request.incremental);
            });
        }

        build_spinner.set_message(format!(
            "Building {} source file(s)...",
            resolved.request.sources.len()
        ));

        let mut orchestrator = BuildOrchestrator::new(&registry, &resolved.build_dir, true)
            .await
            .with_jobs(resolved.jobs);
        let output = resolved.request.output.clone();
        let outcome = orchestrator.build(resolved.request).await;
        build_spinner.finish_and_clear();

        let result = outcome?;
        self.report(&result, &output);
        Ok(result.success)
    }

    fn report(&self, result: &CompilationResult, output: &std::path::Path) {
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }

        if result.success {
            println!(
                "Build successful: {} ({})",
                output.display(),
                format_duration(result.duration)
            );
            if result.has_warnings() {
                println!("{} warning(s)", result.warnings.len());
            }
            if self.verbose {
                println!("Command: {}", result.command_line.join(" "));
            }
            log::info!(
                "Build completed successfully: {} in {}",
                output.display(),
                format_duration(result.duration)
            );
        } else {
            for error in &result.errors {
                eprintln!("error: {}", error);
            }
            if self.verbose && !result.command_line.is_empty() {
                eprintln!("Command: {}", result.command_line.join(" "));
            }
            eprintln!(
                "Build failed with {} error(s) ({})",
                result.errors.len(),
                format_duration(result.duration)
            );
            log::error!("Build failed: {}", output.display());
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms >= 1000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", total_ms)
    }
}
