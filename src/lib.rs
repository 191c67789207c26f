pub mod config;
pub mod core;
pub mod error;
pub mod execution;
pub mod log;
pub mod plan;
pub mod util;

pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use execution::{ProjectRunner, RunContext, RunResult};
pub use plan::BuildPlan;
