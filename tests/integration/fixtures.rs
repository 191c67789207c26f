//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Writing build plans into temporary directories
//! - In-memory projects whose task bodies record their invocations
//! - Running a project list to completion

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use kiln::core::{OrderingIndex, Plugin, Project, Task, TaskResult, TaskSet};
use kiln::execution::{BuildListener, ProjectRunner, RunContext, RunResult, TaskDiscovery};
use kiln::{BuildPlan, RunnerConfig};

/// A build plan written to a temporary directory.
pub struct TestPlan {
    /// The temporary directory holding the plan and task outputs.
    pub temp_dir: TempDir,
    /// Path to the plan file.
    pub path: PathBuf,
}

impl TestPlan {
    pub fn new(text: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("kiln-plan.toml");
        std::fs::write(&path, text).expect("Failed to write plan");
        Self { temp_dir, path }
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn load(&self) -> BuildPlan {
        BuildPlan::load(&self.path).expect("Failed to load plan")
    }

    /// Lines of a file written by task commands, empty if missing.
    pub fn read_lines(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.dir().join(name))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Run the whole plan.
    pub async fn run(&self, config: RunnerConfig, targets: Vec<String>) -> RunResult {
        let plan = self.load();
        let projects = plan.sorted_projects().expect("Failed to sort projects");
        let ordering = Arc::new(plan.ordering_index());
        let runner = ProjectRunner::new(plan, ordering).with_targets(targets);
        let mut context = RunContext::new(config);
        runner
            .run(&mut context, &projects)
            .await
            .expect("Run aborted")
    }
}

pub fn config(workers: usize) -> RunnerConfig {
    RunnerConfig {
        workers,
        ..RunnerConfig::default()
    }
}

pub fn dry_run_config(workers: usize) -> RunnerConfig {
    RunnerConfig {
        workers,
        dry_run: true,
        ..RunnerConfig::default()
    }
}

/// Invocation log shared by recording task bodies: `project:task`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// In-memory task table: project name to `(task, succeeds)` pairs.
#[derive(Clone, Default)]
pub struct RecordingDiscovery {
    tasks: BTreeMap<String, Vec<(String, bool)>>,
    pub calls: CallLog,
}

impl RecordingDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: &str, tasks: &[&str]) -> Self {
        self.tasks.insert(
            project.to_string(),
            tasks.iter().map(|t| (t.to_string(), true)).collect(),
        );
        self
    }

    /// Make `project:task` return a failed result.
    pub fn failing(mut self, project: &str, task: &str) -> Self {
        if let Some(tasks) = self.tasks.get_mut(project) {
            for entry in tasks.iter_mut().filter(|(name, _)| name == task) {
                entry.1 = false;
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TaskDiscovery for RecordingDiscovery {
    fn tasks_for(&self, project: &Project) -> TaskSet {
        let plugin = Arc::new(Plugin::new("test"));
        self.tasks
            .get(&project.name)
            .into_iter()
            .flatten()
            .map(|(name, succeeds)| {
                let calls = Arc::clone(&self.calls);
                let task = name.clone();
                let succeeds = *succeeds;
                Task::new(name, Arc::clone(&plugin), move |p: &Project| {
                    calls.lock().unwrap().push(format!("{}:{}", p.name, task));
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    if succeeds {
                        Ok(TaskResult::success())
                    } else {
                        Ok(TaskResult::failure(format!("{} failed", task)))
                    }
                })
            })
            .collect()
    }
}

/// Records project lifecycle events as `start p` / `end p STATUS`.
#[derive(Default)]
pub struct EventLog {
    pub events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl BuildListener for EventLog {
    fn project_start(&self, project: &Project, _context: &RunContext) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {}", project.name));
    }

    fn project_end(
        &self,
        project: &Project,
        _context: &RunContext,
        status: kiln::core::ProjectStatus,
    ) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end {} {}", project.name, status));
    }
}

/// Run in-memory projects to completion.
pub async fn run_projects(
    discovery: RecordingDiscovery,
    ordering: OrderingIndex,
    projects: &[Project],
    workers: usize,
) -> RunResult {
    let runner = ProjectRunner::new(discovery, Arc::new(ordering));
    let mut context = RunContext::new(config(workers));
    runner
        .run(&mut context, projects)
        .await
        .expect("Run aborted")
}
