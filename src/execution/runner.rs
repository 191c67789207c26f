//! Sequential project driver.
//!
//! [`ProjectRunner`] walks a topologically sorted project list. Each project
//! either gets skipped because a dependency already failed, or has its task
//! graph built and executed on a fresh [`DynamicGraphExecutor`]. Projects
//! never overlap; tasks within one project run concurrently.

use crate::core::builder::TaskGraphBuilder;
use crate::core::ordering::OrderingIndex;
use crate::core::project::{Project, ProjectStatus};
use crate::core::task::{TaskResult, TaskSet};
use crate::error::Result;
use crate::execution::executor::{DynamicGraphExecutor, NodeOutcome};
use crate::execution::listener::{BuildListener, Listeners, RunContext};
use crate::execution::profiler::{Profiler, ProfilerInfo};
use crate::execution::worker::TaskWorker;
use crate::util::comma_join;
use crate::{klog, klog_warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Supplies the task set of a project.
pub trait TaskDiscovery: Send + Sync {
    fn tasks_for(&self, project: &Project) -> TaskSet;
}

impl<F> TaskDiscovery for F
where
    F: Fn(&Project) -> TaskSet + Send + Sync,
{
    fn tasks_for(&self, project: &Project) -> TaskSet {
        self(project)
    }
}

/// Outcome of one task node in a project's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub name: String,
    pub plugin: String,
    pub outcome: NodeOutcome,
}

/// What happened to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project: String,
    pub status: ProjectStatus,
    /// Failure or skip diagnostic when not successful.
    pub result: TaskResult,
    /// Per-node outcomes in graph order; empty for skipped projects.
    #[serde(default)]
    pub tasks: Vec<TaskOutcome>,
}

impl ProjectRecord {
    pub fn task(&self, name: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Aggregate result of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Overall success plus the most relevant failure message.
    pub result: TaskResult,
    /// Timing records from every project, in completion order.
    pub profiling: Vec<ProfilerInfo>,
    /// One record per project, in run order.
    pub projects: Vec<ProjectRecord>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.result.success
    }

    pub fn project(&self, name: &str) -> Option<&ProjectRecord> {
        self.projects.iter().find(|p| p.project == name)
    }

    /// Process exit status for this result.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Drives a pre-sorted project list through graph construction and execution.
///
/// # Example
///
/// ```ignore
/// let runner = ProjectRunner::new(plan.clone(), Arc::new(plan.ordering_index()))
///     .with_listener(Arc::new(LoggingListener));
/// let mut context = RunContext::new(config);
/// let result = runner.run(&mut context, &projects).await?;
/// ```
pub struct ProjectRunner<D> {
    discovery: D,
    ordering: Arc<OrderingIndex>,
    listeners: Listeners,
    targets: Vec<String>,
}

impl<D: TaskDiscovery> ProjectRunner<D> {
    pub fn new(discovery: D, ordering: Arc<OrderingIndex>) -> Self {
        Self {
            discovery,
            ordering,
            listeners: Listeners::new(),
            targets: Vec::new(),
        }
    }

    /// Register a listener; listeners fire in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn BuildListener>) -> Self {
        self.listeners.add(listener);
        self
    }

    /// Only build these tasks (and what they pull in) in each project.
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }

    /// Build every project in order.
    ///
    /// `projects` must already be sorted so dependencies come first. A task
    /// cycle in any project ends that project as FAILED and aborts the run
    /// with an error; task failures do not abort.
    pub async fn run(&self, context: &mut RunContext, projects: &[Project]) -> Result<RunResult> {
        let profiler = Profiler::new();
        let mut records = Vec::with_capacity(projects.len());
        let mut representative: Option<TaskResult> = None;
        let mut last_skip: Option<TaskResult> = None;

        klog!(
            "[{}] Starting run over {} projects with {} workers{}",
            context.id.short(),
            projects.len(),
            context.config.effective_workers(),
            if context.config.dry_run { " (dry run)" } else { "" }
        );

        for project in projects {
            let blocking = context.failed_dependencies(project);
            if !blocking.is_empty() {
                let message = format!(
                    "Not building project {} since it depends on failed project(s) {}",
                    project.name,
                    comma_join(&blocking)
                );
                klog_warn!("{}", message);
                context.mark_failed(&project.name);
                self.listeners
                    .project_end(project, context, ProjectStatus::Skipped);

                let result = TaskResult::failure(message);
                last_skip = Some(result.clone());
                records.push(ProjectRecord {
                    project: project.name.clone(),
                    status: ProjectStatus::Skipped,
                    result,
                    tasks: Vec::new(),
                });
                continue;
            }

            let record = match self.build_project(context, project, &profiler).await {
                Ok(record) => record,
                Err(e) => {
                    context.mark_failed(&project.name);
                    self.listeners
                        .project_end(project, context, ProjectStatus::Failed);
                    return Err(e);
                }
            };
            if record.status == ProjectStatus::Failed {
                context.mark_failed(&project.name);
            }
            self.listeners.project_end(project, context, record.status);
            representative = Some(record.result.clone());
            records.push(record);
        }

        let success = records.iter().all(|r| r.status == ProjectStatus::Success);
        let result = if success {
            representative.unwrap_or_default()
        } else {
            let last_failure = records
                .iter()
                .rev()
                .find(|r| r.status == ProjectStatus::Failed)
                .map(|r| r.result.clone());
            last_failure
                .or(last_skip)
                .unwrap_or_else(|| TaskResult::failure("build failed"))
        };

        klog!(
            "[{}] Run finished: {}",
            context.id.short(),
            if success { "SUCCESS" } else { "FAILED" }
        );

        Ok(RunResult {
            result,
            profiling: profiler.snapshot(),
            projects: records,
        })
    }

    async fn build_project(
        &self,
        context: &RunContext,
        project: &Project,
        profiler: &Profiler,
    ) -> Result<ProjectRecord> {
        self.listeners.project_start(project, context);

        let tasks = self.discovery.tasks_for(project);
        let graph = TaskGraphBuilder::new(Arc::new(project.clone()), &tasks, &self.ordering)
            .with_targets(&self.targets)
            .build()?;

        let dry_run = context.config.dry_run;
        let report = DynamicGraphExecutor::new(context.config.effective_workers())
            .run(&graph, |node| {
                TaskWorker::new(
                    node.clone(),
                    dry_run,
                    profiler.clone(),
                    self.listeners.clone(),
                )
            })
            .await;

        let outcomes: Vec<TaskOutcome> = graph
            .node_indices()
            .filter_map(|index| {
                let node = graph.node(index)?;
                let outcome = report.outcome(index)?.clone();
                Some(TaskOutcome {
                    name: node.name().to_string(),
                    plugin: node.task.plugin.name().to_string(),
                    outcome,
                })
            })
            .collect();

        let (status, result) = if report.success {
            (ProjectStatus::Success, TaskResult::success())
        } else {
            let failed = outcomes
                .iter()
                .find_map(|t| match &t.outcome {
                    NodeOutcome::Failed { error } => Some(format!(
                        "Task {}:{} failed: {}",
                        project.name, t.name, error
                    )),
                    _ => None,
                })
                .unwrap_or_else(|| format!("Project {} failed", project.name));
            (ProjectStatus::Failed, TaskResult::failure(failed))
        };

        Ok(ProjectRecord {
            project: project.name.clone(),
            status,
            result,
            tasks: outcomes,
        })
    }
}
