use clap::Parser;
use cxxbuild::cli::Cli;
use dirs::config_dir;
use env_logger::Builder;
use log::LevelFilter;
use std::fs::OpenOptions;
use std::path::PathBuf;

/** Main entry point for cxxbuild
 *
 * # Process Flow
 * 1. Parse command line arguments using Clap
 * 2. Initialize logging with file output (debug level with `--verbose`)
 * 3. Execute the requested command
 * 4. Exit 0 on success, 1 on any error or failed build
 *
 * # Example
 * ```bash
 * cxxbuild build src/main.cpp src/util.cpp -o app --standard c++20 --incremental
 * cxxbuild list
 * cxxbuild clean --aggressive
 * ```
 */
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders help/version through the error path as well
            let _ = e.print();
            std::process::exit(e.exit_code());
        }
    };

    init_logging(cli.verbose);

    match cli.execute().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/** Initializes the logging system with file-based output
 *
 * # Configuration
 * - Log file location: platform-specific config directory
 * - Log level: Info, or Debug when `verbose`; `RUST_LOG` still applies
 * - Output: Append mode to preserve historical logs
 *
 * # Directory Structure
 * - Linux: `~/.config/cxxbuild/cxxbuild.log`
 * - macOS: `~/Library/Application Support/cxxbuild/cxxbuild.log`
 * - Windows: `%APPDATA%\cxxbuild\cxxbuild.log`
 *
 * # Notes
 * - Logging failures are non-fatal: without a writable log file the
 *   tool runs without logging
 */
fn init_logging(verbose: bool) {
    let log_file = get_log_file_path();

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let file = match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => file,
        Err(_) => return,
    };

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let initialized = Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init();

    if initialized.is_ok() {
        log::info!("cxxbuild started");
    }
}

fn get_log_file_path() -> PathBuf {
    if let Some(config_dir) = config_dir() {
        config_dir.join("cxxbuild").join("cxxbuild.log")
    } else {
        std::env::current_dir()
            .map(|p| p.join("cxxbuild.log"))
            .unwrap_or_else(|_| "cxxbuild.log".into())
    }
}
