pub mod config;
pub mod orchestrator;
pub mod scheduler;

pub use config::*;
pub use orchestrator::*;
pub use scheduler::{default_jobs, MAX_JOBS};
