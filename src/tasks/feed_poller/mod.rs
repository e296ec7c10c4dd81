pub mod runner;
pub mod types;

pub use runner::SourcePoller;
pub use types::{CycleOutcome, SourceConfig};
