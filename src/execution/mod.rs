//! Running task graphs.
//!
//! The [`DynamicGraphExecutor`] drains one graph with a bounded pool of
//! worker slots; [`ProjectRunner`] drives projects through it one at a time
//! and reports to [`BuildListener`]s.

pub mod executor;
pub mod listener;
pub mod profiler;
pub mod runner;
pub mod worker;

pub use executor::{DynamicGraphExecutor, ExecutionReport, NodeOutcome};
pub use listener::{BuildListener, Listeners, LoggingListener, RunContext, RunId};
pub use profiler::{Profiler, ProfilerInfo};
pub use runner::{ProjectRecord, ProjectRunner, RunResult, TaskDiscovery, TaskOutcome};
pub use worker::{TaskWorker, Worker};
