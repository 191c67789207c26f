//! Build listeners and the run-scoped context they observe.
//!
//! Listeners are called in registration order. Project hooks run on the
//! driver between projects; task hooks run on the worker slot executing
//! the task, so implementations must be thread-safe.

use crate::config::RunnerConfig;
use crate::core::project::{Project, ProjectStatus};
use crate::core::task::{TaskNode, TaskResult};
use crate::{klog, klog_debug, klog_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State owned by one run: its settings and the projects that failed so far.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub config: RunnerConfig,
    failed_projects: BTreeSet<String>,
}

impl RunContext {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            id: RunId::new(),
            started_at: Utc::now(),
            config,
            failed_projects: BTreeSet::new(),
        }
    }

    pub fn mark_failed(&mut self, project: &str) {
        self.failed_projects.insert(project.to_string());
    }

    pub fn is_failed(&self, project: &str) -> bool {
        self.failed_projects.contains(project)
    }

    pub fn failed_projects(&self) -> &BTreeSet<String> {
        &self.failed_projects
    }

    /// Declared dependencies of `project` already marked failed, in
    /// declaration order.
    pub fn failed_dependencies(&self, project: &Project) -> Vec<String> {
        project
            .depends_on
            .iter()
            .filter(|dep| self.failed_projects.contains(dep.as_str()))
            .cloned()
            .collect()
    }
}

/// Observer of build lifecycle events. Every hook defaults to a no-op.
pub trait BuildListener: Send + Sync {
    fn project_start(&self, _project: &Project, _context: &RunContext) {}

    fn project_end(&self, _project: &Project, _context: &RunContext, _status: ProjectStatus) {}

    fn task_start(&self, _node: &TaskNode) {}

    fn task_end(&self, _node: &TaskNode, _result: &TaskResult) {}
}

/// Ordered fan-out over registered listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Arc<dyn BuildListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn BuildListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn project_start(&self, project: &Project, context: &RunContext) {
        for listener in &self.listeners {
            listener.project_start(project, context);
        }
    }

    pub fn project_end(&self, project: &Project, context: &RunContext, status: ProjectStatus) {
        for listener in &self.listeners {
            listener.project_end(project, context, status);
        }
    }

    pub fn task_start(&self, node: &TaskNode) {
        for listener in &self.listeners {
            listener.task_start(node);
        }
    }

    pub fn task_end(&self, node: &TaskNode, result: &TaskResult) {
        for listener in &self.listeners {
            listener.task_end(node, result);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

/// Writes lifecycle events to the kiln log.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl BuildListener for LoggingListener {
    fn project_start(&self, project: &Project, context: &RunContext) {
        klog!("[{}] Building project {}", context.id.short(), project.name);
    }

    fn project_end(&self, project: &Project, context: &RunContext, status: ProjectStatus) {
        klog!(
            "[{}] Project {} finished: {}",
            context.id.short(),
            project.name,
            status
        );
    }

    fn task_start(&self, node: &TaskNode) {
        klog_debug!("Starting {}", node.qualified_name());
    }

    fn task_end(&self, node: &TaskNode, result: &TaskResult) {
        if result.success {
            klog_debug!("Finished {}", node.qualified_name());
        } else {
            klog_warn!(
                "Task {} failed: {}",
                node.qualified_name(),
                result.error_message.as_deref().unwrap_or("no message")
            );
        }
    }
}
