//! Per-project task graph construction.
//!
//! [`TaskGraphBuilder`] turns one project's task set and the shared
//! [`OrderingIndex`] into a validated [`TaskGraph`]. Relation entries that
//! name tasks absent from the project are ignored.

use crate::core::dag::{DynamicGraph, EdgeKind};
use crate::core::ordering::OrderingIndex;
use crate::core::project::Project;
use crate::core::task::{Task, TaskNode, TaskSet};
use crate::error::{Error, Result};
use crate::klog_debug;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// The execution graph of one project.
pub type TaskGraph = DynamicGraph<TaskNode>;

/// Builds the task graph of a single project.
///
/// # Example
///
/// ```ignore
/// let graph = TaskGraphBuilder::new(project, &tasks, &ordering)
///     .with_targets(&["assemble".to_string()])
///     .build()?;
/// ```
pub struct TaskGraphBuilder<'a> {
    project: Arc<Project>,
    tasks: &'a TaskSet,
    ordering: &'a OrderingIndex,
    targets: Vec<String>,
}

impl<'a> TaskGraphBuilder<'a> {
    pub fn new(project: Arc<Project>, tasks: &'a TaskSet, ordering: &'a OrderingIndex) -> Self {
        Self {
            project,
            tasks,
            ordering,
            targets: Vec::new(),
        }
    }

    /// Restrict the graph to these tasks and what they pull in.
    ///
    /// A target is either a task name or `project:task`; qualified targets
    /// for other projects are ignored. An empty list selects every task.
    pub fn with_targets(mut self, targets: &[String]) -> Self {
        self.targets = targets.to_vec();
        self
    }

    pub fn build(self) -> Result<TaskGraph> {
        let accepted = self.accepted_tasks();
        let selected = self.select(&accepted);

        let mut graph = TaskGraph::new();
        let mut by_name: BTreeMap<&str, Vec<NodeIndex>> = BTreeMap::new();
        for &name in &selected {
            for &task in accepted.get(name).into_iter().flatten() {
                let node = TaskNode::new(Arc::clone(&self.project), task.clone());
                by_name.entry(name).or_default().push(graph.add_node(node));
            }
        }

        // Hard edges first so they win over an exempt edge on the same pair.
        for &name in &selected {
            for dep in self.ordering.dependencies_of(name) {
                connect(&mut graph, &by_name, dep, name, EdgeKind::DependsOn);
            }
            for later in self.ordering.must_run_before_of(name) {
                connect(&mut graph, &by_name, name, later, EdgeKind::RunBefore);
            }
            for earlier in self.ordering.must_run_after_of(name) {
                connect(&mut graph, &by_name, earlier, name, EdgeKind::RunAfter);
            }
        }
        for &name in &selected {
            for follower in self.ordering.always_after_of(name) {
                connect(&mut graph, &by_name, name, follower, EdgeKind::AlwaysRunAfter);
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            let path = cycle
                .iter()
                .filter_map(|index| graph.node(*index))
                .map(|node| node.name().to_string())
                .collect();
            return Err(Error::TaskCycle {
                project: self.project.name.clone(),
                path,
            });
        }

        klog_debug!(
            "Built task graph for {}: {} nodes, {} edges",
            self.project.name,
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Tasks whose plugin applies to the project, grouped by name.
    fn accepted_tasks(&self) -> BTreeMap<&'a str, Vec<&'a Task>> {
        let tasks: &'a TaskSet = self.tasks;
        let mut accepted: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in tasks.iter() {
            if task.applies_to(&self.project) {
                accepted.entry(task.name.as_str()).or_default().push(task);
            } else {
                klog_debug!(
                    "Plugin {} does not apply to {}, dropping {}",
                    task.plugin.name(),
                    self.project.name,
                    task.name
                );
            }
        }
        accepted
    }

    fn select(&self, accepted: &BTreeMap<&'a str, Vec<&'a Task>>) -> BTreeSet<&'a str> {
        if self.targets.is_empty() {
            return accepted.keys().copied().collect();
        }

        let mut selected = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for target in &self.targets {
            let name = match target.split_once(':') {
                Some((project, name)) if project == self.project.name => name,
                Some(_) => continue,
                None => target.as_str(),
            };
            queue.push_back(name);
        }

        while let Some(name) = queue.pop_front() {
            let Some((&key, _)) = accepted.get_key_value(name) else {
                continue;
            };
            if !selected.insert(key) {
                continue;
            }
            let pulled = self
                .ordering
                .dependencies_of(key)
                .iter()
                .chain(self.ordering.always_after_of(key));
            for next in pulled {
                queue.push_back(next);
            }
        }
        selected
    }
}

/// Add `kind` edges from every `from` task to every `to` task present.
fn connect(
    graph: &mut TaskGraph,
    by_name: &BTreeMap<&str, Vec<NodeIndex>>,
    from: &str,
    to: &str,
    kind: EdgeKind,
) {
    let (Some(sources), Some(targets)) = (by_name.get(from), by_name.get(to)) else {
        return;
    };
    for &source in sources {
        for &target in targets {
            graph.add_edge(source, target, kind);
        }
    }
}
