/// cxxbuild - an incremental build orchestrator for native C++ code
///
/// Detects installed compilers (GCC, Clang, MSVC), translates one
/// compiler-neutral option vocabulary into each compiler's command line,
/// and rebuilds only what changed, tracked by content hashes.
///
/// Main modules:
/// - build: Build orchestration, worker pool and build-file configuration
/// - cache: Persistent dependency cache driving incremental decisions
/// - cli: Command-line interface definition and argument validation
/// - commands: Implementation of the build, list and clean subcommands
/// - compiler: Compiler backends, detection, option translation and diagnostics
/// - hasher: Content hashing used for change detection
/// - result: Error handling and result types
/// - utils: Subprocess execution helpers
pub mod build;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod compiler;
pub mod hasher;
pub mod result;
pub mod utils;
