pub mod parser;

use crate::commands::CommandExecutor;
use crate::result::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cxxbuild")]
#[command(about = "Incremental C++ build orchestrator")]
#[command(version)]
#[command(arg_required_else_help = true)]
#[command(
    help_template = "{before-help}{name} v{version}\n\n{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose output and debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Compile and link C++ sources")]
    Build(BuildArgs),

    #[command(about = "List detected compilers")]
    List {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    #[command(about = "Remove object files and the dependency cache")]
    Clean {
        #[arg(long, help = "Build directory (default: build)")]
        build_dir: Option<PathBuf>,

        #[arg(long, help = "Remove the whole build directory")]
        aggressive: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct BuildArgs {
    #[arg(required = true, help = "Source files to compile")]
    pub sources: Vec<PathBuf>,

    #[arg(short, long, help = "Output executable or library")]
    pub output: PathBuf,

    #[arg(long, help = "Compiler to use (default: first detected)")]
    pub compiler: Option<String>,

    #[arg(long, visible_alias = "cpp-version", help = "C++ standard, e.g. c++17, 20, cpp23")]
    pub standard: Option<String>,

    #[arg(short = 'I', long = "include-path", value_name = "DIR", help = "Include directory")]
    pub include_paths: Vec<PathBuf>,

    #[arg(short = 'D', long = "define", value_name = "NAME[=VAL]", help = "Preprocessor define")]
    pub defines: Vec<String>,

    #[arg(long = "warnings", value_name = "FLAG", allow_hyphen_values = true, help = "Warning flag")]
    pub warnings: Vec<String>,

    #[arg(long, allow_hyphen_values = true, help = "Optimization level: O0 O1 O2 O3 Os Ofast Og")]
    pub optimization: Option<String>,

    #[arg(long, help = "Emit debug information")]
    pub debug: bool,

    #[arg(long, help = "Generate position-independent code")]
    pub pic: bool,

    #[arg(long = "sanitize", value_name = "NAME", help = "Enable a sanitizer")]
    pub sanitizers: Vec<String>,

    #[arg(long, help = "Standard library implementation (gcc/clang)")]
    pub stdlib: Option<String>,

    #[arg(long = "compile-flag", value_name = "FLAG", allow_hyphen_values = true, help = "Extra compiler flag")]
    pub compile_flags: Vec<String>,

    #[arg(short = 'L', long = "library-path", value_name = "DIR", help = "Library search directory")]
    pub library_paths: Vec<PathBuf>,

    #[arg(short = 'l', long = "library", value_name = "NAME", help = "Library to link")]
    pub libraries: Vec<String>,

    #[arg(long = "rpath", value_name = "DIR", help = "Runtime library search directory")]
    pub runtime_library_paths: Vec<PathBuf>,

    #[arg(long, help = "Build a shared library")]
    pub shared: bool,

    #[arg(long = "static", help = "Link statically")]
    pub static_link: bool,

    #[arg(long, help = "Strip symbols from the output")]
    pub strip: bool,

    #[arg(long, value_name = "PATH", help = "Write a linker map file")]
    pub map_file: Option<PathBuf>,

    #[arg(long = "link-flag", value_name = "FLAG", allow_hyphen_values = true, help = "Extra linker flag")]
    pub link_flags: Vec<String>,

    #[arg(long, help = "Build directory (default: build)")]
    pub build_dir: Option<PathBuf>,

    #[arg(long, help = "Skip sources unchanged since the last successful build")]
    pub incremental: bool,

    #[arg(long, help = "Recompile every source")]
    pub force_rebuild: bool,

    #[arg(short, long, help = "Maximum parallel compiler processes")]
    pub jobs: Option<usize>,

    #[arg(long, value_name = "FILE.json", help = "JSON build configuration")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "SECS", help = "Per-process timeout in seconds")]
    pub timeout: Option<u64>,
}

impl Cli {
    /** Runs the parsed subcommand
     *
     * # Returns
     * - `Ok(true)` on success, `Ok(false)` when a build ran but failed
     */
    pub async fn execute(self) -> Result<bool> {
        let mut executor = CommandExecutor::new(self.verbose);

        match self.command {
            Commands::Build(args) => executor.build_project(args).await,
            Commands::List { json } => executor.list_compilers(json).await,
            Commands::Clean {
                build_dir,
                aggressive,
            } => executor.clean(build_dir, aggressive).await,
        }
    }
}
