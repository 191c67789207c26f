//! Build plan files.
//!
//! A build plan is a TOML file declaring plugins, projects with their shell
//! tasks, and the ordering relations between task names:
//!
//! ```toml
//! [plugins.java]
//! projects = ["core"]
//!
//! [[projects]]
//! name = "core"
//!
//! [[projects.tasks]]
//! name = "compile"
//! plugin = "java"
//! command = "javac -d out src/*.java"
//!
//! [ordering]
//! depends_on = { test = ["compile"] }
//! ```
//!
//! Task commands run through `sh -c` with the plan's directory as the
//! working directory.

use crate::core::dag::{DynamicGraph, EdgeKind};
use crate::core::ordering::OrderingIndex;
use crate::core::project::Project;
use crate::core::task::{Plugin, Task, TaskResult, TaskSet, DEFAULT_PLUGIN};
use crate::execution::runner::TaskDiscovery;
use crate::{klog_debug, Error, Result};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

fn default_plugin() -> String {
    DEFAULT_PLUGIN.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Projects the plugin applies to; `None` means all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default = "default_plugin")]
    pub plugin: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl ProjectSpec {
    pub fn to_project(&self) -> Project {
        Project {
            name: self.name.clone(),
            depends_on: self.depends_on.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The `[ordering]` table: task name to related task names, per relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingSpec {
    #[serde(default)]
    pub depends_on: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub run_before: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub run_after: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub always_run_after: BTreeMap<String, Vec<String>>,
}

/// A parsed build plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSpec>,
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,
    #[serde(default)]
    pub ordering: OrderingSpec,
    /// Working directory for task commands.
    #[serde(skip)]
    pub root: PathBuf,
}

impl BuildPlan {
    /// Read and validate a plan file. Commands run relative to its directory.
    pub fn load(path: &Path) -> Result<Self> {
        klog_debug!("BuildPlan::load path={}", path.display());
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&fs::read_to_string(path)?, root)
    }

    pub fn parse(text: &str, root: PathBuf) -> Result<Self> {
        let mut plan: Self = toml::from_str(text)?;
        plan.root = root;
        plan.validate()?;
        klog_debug!(
            "Plan parsed: {} projects, {} plugins",
            plan.projects.len(),
            plan.plugins.len()
        );
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for project in &self.projects {
            if project.name.is_empty() {
                return Err(Error::Validation("Project with empty name".to_string()));
            }
            if !seen.insert(project.name.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate project: {}",
                    project.name
                )));
            }
            for task in &project.tasks {
                if task.name.is_empty() || task.name.contains(':') {
                    return Err(Error::Validation(format!(
                        "Invalid task name {:?} in project {}",
                        task.name, project.name
                    )));
                }
            }
        }
        for project in &self.projects {
            for dependency in &project.depends_on {
                if !seen.contains(dependency.as_str()) {
                    return Err(Error::UnknownProject {
                        project: project.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn project(&self, name: &str) -> Option<&ProjectSpec> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Projects ordered so every project follows its dependencies.
    ///
    /// Declaration order is kept wherever dependencies allow it.
    pub fn sorted_projects(&self) -> Result<Vec<Project>> {
        let mut graph: DynamicGraph<&str> = DynamicGraph::new();
        let index: BTreeMap<&str, NodeIndex> = self
            .projects
            .iter()
            .map(|p| (p.name.as_str(), graph.add_node(p.name.as_str())))
            .collect();
        for project in &self.projects {
            for dependency in &project.depends_on {
                if let (Some(&from), Some(&to)) =
                    (index.get(dependency.as_str()), index.get(project.name.as_str()))
                {
                    graph.add_edge(from, to, EdgeKind::DependsOn);
                }
            }
        }
        if let Some(cycle) = graph.find_cycle() {
            let names: Vec<&str> = cycle
                .iter()
                .filter_map(|i| graph.node(*i).copied())
                .collect();
            return Err(Error::ProjectCycle(names.join(" -> ")));
        }

        let mut placed = BTreeSet::new();
        let mut order = Vec::with_capacity(self.projects.len());
        for project in &self.projects {
            self.place(project, &mut placed, &mut order);
        }
        Ok(order)
    }

    fn place<'a>(
        &'a self,
        project: &'a ProjectSpec,
        placed: &mut BTreeSet<&'a str>,
        order: &mut Vec<Project>,
    ) {
        if !placed.insert(project.name.as_str()) {
            return;
        }
        for dependency in &project.depends_on {
            if let Some(spec) = self.project(dependency) {
                self.place(spec, placed, order);
            }
        }
        order.push(project.to_project());
    }

    /// The ordering relations as an index.
    pub fn ordering_index(&self) -> OrderingIndex {
        let mut index = OrderingIndex::new();
        for (task, deps) in &self.ordering.depends_on {
            for dep in deps {
                index.add_dependency(task, dep);
            }
        }
        for (task, others) in &self.ordering.run_before {
            for other in others {
                index.add_run_before(task, other);
            }
        }
        for (task, others) in &self.ordering.run_after {
            for other in others {
                index.add_run_after(task, other);
            }
        }
        for (task, followers) in &self.ordering.always_run_after {
            for follower in followers {
                index.add_always_run_after(task, follower);
            }
        }
        index
    }

    /// Plugins declared in `[plugins]` plus any only named by tasks.
    pub fn plugins(&self) -> BTreeMap<String, Arc<Plugin>> {
        let mut plugins: BTreeMap<String, Arc<Plugin>> = self
            .plugins
            .iter()
            .map(|(name, spec)| {
                let plugin = match &spec.projects {
                    Some(projects) => Plugin::for_projects(name, projects),
                    None => Plugin::new(name),
                };
                (name.clone(), Arc::new(plugin))
            })
            .collect();
        for task in self.projects.iter().flat_map(|p| &p.tasks) {
            plugins
                .entry(task.plugin.clone())
                .or_insert_with(|| Arc::new(Plugin::new(&task.plugin)));
        }
        plugins
    }

    /// Reject targets that no project can satisfy.
    ///
    /// `task` must be defined by some project; `project:task` by that project.
    pub fn validate_targets(&self, targets: &[String]) -> Result<()> {
        for target in targets {
            let known = match target.split_once(':') {
                Some((project, task)) => self
                    .project(project)
                    .is_some_and(|p| p.tasks.iter().any(|t| t.name == task)),
                None => self
                    .projects
                    .iter()
                    .any(|p| p.tasks.iter().any(|t| &t.name == target)),
            };
            if !known {
                return Err(Error::UnknownTarget(target.clone()));
            }
        }
        Ok(())
    }
}

impl TaskDiscovery for BuildPlan {
    fn tasks_for(&self, project: &Project) -> TaskSet {
        let Some(spec) = self.project(&project.name) else {
            return TaskSet::new();
        };
        let plugins = self.plugins();
        spec.tasks
            .iter()
            .map(|task| {
                let plugin = plugins
                    .get(&task.plugin)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(Plugin::new(&task.plugin)));
                shell_task(task, plugin, self.root.clone())
            })
            .collect()
    }
}

/// A task whose body runs `command` through `sh -c` in `root`.
///
/// The project name is exported as `KILN_PROJECT` and each metadata entry
/// as `KILN_META_<KEY>`.
fn shell_task(spec: &TaskSpec, plugin: Arc<Plugin>, root: PathBuf) -> Task {
    let command = spec.command.clone();
    Task::new(&spec.name, plugin, move |project: &Project| {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&root)
            .env("KILN_PROJECT", &project.name);
        for (key, value) in &project.metadata {
            cmd.env(format!("KILN_META_{}", key.to_uppercase()), value);
        }

        let output = cmd.output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            klog_debug!("[{}] {}", project.name, stdout.trim_end());
        }
        if output.status.success() {
            return Ok(TaskResult::success());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut message = match output.status.code() {
            Some(code) => format!("`{}` exited with status {}", command, code),
            None => format!("`{}` terminated by signal", command),
        };
        if let Some(line) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            message.push_str(": ");
            message.push_str(line.trim());
        }
        Ok(TaskResult::failure(message))
    })
}
