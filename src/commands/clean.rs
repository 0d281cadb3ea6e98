use crate::build::{BuildOrchestrator, DEFAULT_BUILD_DIR};
use crate::compiler::CompilerRegistry;
use crate::result::Result;
use std::path::PathBuf;

pub async fn execute(build_dir: Option<PathBuf>, aggressive: bool) -> Result<bool> {
    let build_dir = build_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR));

    // cleaning never compiles, so no detection is needed
    let registry = CompilerRegistry::default();
    let mut orchestrator = BuildOrchestrator::new(&registry, &build_dir, true).await;
    let removed = orchestrator.clean(aggressive).await?;

    if aggressive {
        println!("Removed build directory {}", build_dir.display());
    } else {
        println!(
            "Removed {} object file(s) from {}",
            removed,
            build_dir.display()
        );
    }

    Ok(true)
}
