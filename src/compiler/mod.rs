pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod dialect;
pub mod options;
pub mod registry;
pub mod standard;

pub use backend::*;
pub use config::*;
pub use diagnostics::*;
pub use options::*;
pub use registry::*;
pub use standard::*;
