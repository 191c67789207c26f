//! Task data model.
//!
//! Tasks are the units of build work. A task belongs to a plugin, and the
//! plugin decides which projects the task applies to. Several plugins may
//! contribute tasks with the same name, so a project's tasks are kept in a
//! multi-valued [`TaskSet`].

use crate::core::project::Project;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Body of a task: the opaque build action.
pub type TaskBody = Arc<dyn Fn(&Project) -> Result<TaskResult> + Send + Sync>;

/// Capability predicate deciding whether a plugin applies to a project.
pub type Acceptance = Arc<dyn Fn(&Project) -> bool + Send + Sync>;

/// Name of the plugin used when a task does not name one.
pub const DEFAULT_PLUGIN: &str = "default";

/// Outcome reported by a task body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }
}

impl Default for TaskResult {
    fn default() -> Self {
        Self::success()
    }
}

/// A plugin contributing tasks, with its project acceptance predicate.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    accepts: Acceptance,
}

impl Plugin {
    /// A plugin that applies to every project.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            accepts: Arc::new(|_| true),
        }
    }

    pub fn with_predicate<F>(name: &str, predicate: F) -> Self
    where
        F: Fn(&Project) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            accepts: Arc::new(predicate),
        }
    }

    /// A plugin restricted to the named projects.
    pub fn for_projects(name: &str, projects: &[String]) -> Self {
        let allowed: Vec<String> = projects.to_vec();
        Self::with_predicate(name, move |project| allowed.contains(&project.name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, project: &Project) -> bool {
        (self.accepts)(project)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

/// A named unit of build work scoped to one project.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub plugin: Arc<Plugin>,
    body: TaskBody,
}

impl Task {
    pub fn new<F>(name: &str, plugin: Arc<Plugin>, body: F) -> Self
    where
        F: Fn(&Project) -> Result<TaskResult> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            plugin,
            body: Arc::new(body),
        }
    }

    /// Invoke the task body.
    pub fn run(&self, project: &Project) -> Result<TaskResult> {
        (self.body)(project)
    }

    /// Whether the owning plugin applies to `project`.
    pub fn applies_to(&self, project: &Project) -> bool {
        self.plugin.accepts(project)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("plugin", &self.plugin.name())
            .finish()
    }
}

/// Multi-valued mapping of task name to the tasks carrying that name.
///
/// Iteration is ordered by name, then by insertion.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: BTreeMap<String, Vec<Task>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.entry(task.name.clone()).or_default().push(task);
    }

    pub fn get(&self, name: &str) -> &[Task] {
        self.tasks.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().flatten()
    }

    /// Number of tasks, counting every task under a shared name.
    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl FromIterator<Task> for TaskSet {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut set = TaskSet::new();
        for task in iter {
            set.insert(task);
        }
        set
    }
}

/// A task bound to the project it runs for; the node payload of a task graph.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub project: Arc<Project>,
    pub task: Task,
}

impl TaskNode {
    pub fn new(project: Arc<Project>, task: Task) -> Self {
        Self { project, task }
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    /// `project:task`, the form used in logs and target selection.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.project.name, self.task.name)
    }
}

impl std::fmt::Display for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.task.name, self.task.plugin.name())
    }
}
