//! Core domain models for build execution.
//!
//! This module contains the data structures the engine runs on: projects,
//! tasks and plugins, the ordering relations between task names, and the
//! per-project task graph built from them.

pub mod builder;
pub mod dag;
pub mod ordering;
pub mod project;
pub mod task;

pub use builder::{TaskGraph, TaskGraphBuilder};
pub use dag::{DynamicGraph, EdgeKind};
pub use ordering::OrderingIndex;
pub use project::{Project, ProjectStatus};
pub use task::{Plugin, Task, TaskBody, TaskNode, TaskResult, TaskSet, DEFAULT_PLUGIN};
