//! Concurrent executor for dynamic graphs.
//!
//! [`DynamicGraphExecutor`] runs every node of a [`DynamicGraph`] under a
//! fixed number of worker slots. A node becomes ready once all of its
//! predecessors have resolved. When a node fails or is skipped, every
//! successor reached over a non-exempt edge is skipped instead of run, so
//! the graph always drains.
//!
//! The ready set and predecessor counters are the only shared mutable
//! state. They live behind one mutex that is held only to pick the next
//! node and to record a completion; worker bodies run outside it on the
//! blocking pool.

use crate::core::dag::DynamicGraph;
use crate::core::task::TaskResult;
use crate::execution::worker::Worker;
use crate::util;
use crate::{klog_debug, klog_trace, klog_warn};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Final state of one node after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeOutcome {
    Succeeded,
    Failed {
        /// Error message reported by the worker.
        error: String,
    },
    /// Not run because a predecessor failed or was skipped.
    Skipped,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, NodeOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeOutcome::Skipped)
    }
}

impl std::fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeOutcome::Succeeded => write!(f, "succeeded"),
            NodeOutcome::Failed { error } => write!(f, "failed: {}", error),
            NodeOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of executing a whole graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// `true` iff no node failed.
    pub success: bool,
    /// One outcome per node, indexed like the graph.
    pub outcomes: Vec<NodeOutcome>,
}

impl ExecutionReport {
    pub fn outcome(&self, index: NodeIndex) -> Option<&NodeOutcome> {
        self.outcomes.get(index.index())
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Error message of the lowest-indexed failed node.
    pub fn first_error(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|o| match o {
            NodeOutcome::Failed { error } => Some(error.as_str()),
            _ => None,
        })
    }
}

enum Next<W> {
    Run(usize, W),
    Wait,
    Done,
}

/// Scheduling bookkeeping, guarded by [`Shared::state`].
struct SchedulerState<W> {
    /// Ready node indices; the lowest index runs first.
    ready: BTreeSet<usize>,
    /// Unresolved predecessor count per node.
    pending: Vec<usize>,
    /// Nodes with a failed or skipped non-exempt predecessor.
    doomed: Vec<bool>,
    workers: Vec<Option<W>>,
    outcomes: Vec<Option<NodeOutcome>>,
    active: usize,
}

impl<W> SchedulerState<W> {
    fn next(&mut self, successors: &[Vec<(usize, bool)>]) -> Next<W> {
        while let Some(index) = self.ready.pop_first() {
            match self.workers[index].take() {
                Some(worker) => {
                    self.active += 1;
                    return Next::Run(index, worker);
                }
                None => {
                    let error = format!("no worker for node {}", index);
                    self.resolve(index, NodeOutcome::Failed { error }, successors);
                }
            }
        }
        if self.active == 0 {
            Next::Done
        } else {
            Next::Wait
        }
    }

    /// Record `outcome` for `index` and release its successors.
    ///
    /// Successors whose last predecessor resolves while doomed are skipped
    /// right here, transitively.
    fn resolve(&mut self, index: usize, outcome: NodeOutcome, successors: &[Vec<(usize, bool)>]) {
        let mut worklist = vec![(index, outcome)];
        while let Some((node, outcome)) = worklist.pop() {
            let propagates = !outcome.is_success();
            klog_trace!("node {} resolved: {}", node, outcome);
            self.outcomes[node] = Some(outcome);

            for &(next, exempt) in &successors[node] {
                if propagates && !exempt {
                    self.doomed[next] = true;
                }
                self.pending[next] -= 1;
                if self.pending[next] == 0 {
                    if self.doomed[next] {
                        worklist.push((next, NodeOutcome::Skipped));
                    } else {
                        self.ready.insert(next);
                    }
                }
            }
        }
    }
}

struct Shared<W> {
    state: Mutex<SchedulerState<W>>,
    successors: Vec<Vec<(usize, bool)>>,
    notify: Notify,
}

impl<W> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, SchedulerState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Executes a dynamic graph with at most `workers` nodes in flight.
///
/// # Example
///
/// ```ignore
/// let executor = DynamicGraphExecutor::new(4);
/// let report = executor
///     .run(&graph, |node| TaskWorker::new(node.clone(), false, profiler.clone(), listeners.clone()))
///     .await;
/// assert!(report.success);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DynamicGraphExecutor {
    workers: usize,
}

impl DynamicGraphExecutor {
    /// Create an executor; a pool size of zero is treated as one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every node of `graph`, turning each into a worker with
    /// `make_worker`. Returns once every node has run or been skipped.
    ///
    /// `graph` must be acyclic.
    pub async fn run<T, W, F>(&self, graph: &DynamicGraph<T>, mut make_worker: F) -> ExecutionReport
    where
        W: Worker,
        F: FnMut(&T) -> W,
    {
        let count = graph.node_count();
        if count == 0 {
            return ExecutionReport {
                success: true,
                outcomes: Vec::new(),
            };
        }

        let successors: Vec<Vec<(usize, bool)>> = graph
            .node_indices()
            .map(|index| {
                graph
                    .successors(index)
                    .into_iter()
                    .map(|(next, kind)| (next.index(), kind.is_exempt()))
                    .collect()
            })
            .collect();
        let pending: Vec<usize> = graph
            .node_indices()
            .map(|index| graph.predecessor_count(index))
            .collect();
        let ready = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(index, _)| index)
            .collect();
        let workers = graph
            .node_indices()
            .map(|index| graph.node(index).map(&mut make_worker))
            .collect();

        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                ready,
                pending,
                doomed: vec![false; count],
                workers,
                outcomes: vec![None; count],
                active: 0,
            }),
            successors,
            notify: Notify::new(),
        });

        let slots = self.workers.min(count);
        klog_debug!("Executing {} nodes on {} slots", count, slots);
        let handles: Vec<_> = (0..slots)
            .map(|slot| tokio::spawn(drive_slot(slot, Arc::clone(&shared))))
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                klog_warn!("Executor slot ended abnormally: {}", e);
            }
        }

        let mut state = shared.lock();
        let outcomes: Vec<NodeOutcome> = state
            .outcomes
            .iter_mut()
            .map(|o| o.take().unwrap_or(NodeOutcome::Skipped))
            .collect();
        let success = !outcomes.iter().any(NodeOutcome::is_failure);
        ExecutionReport { success, outcomes }
    }
}

async fn drive_slot<W: Worker>(slot: usize, shared: Arc<Shared<W>>) {
    loop {
        // Register interest before checking so a completion between the
        // check and the await still wakes this slot.
        let notified = shared.notify.notified();
        let next = shared.lock().next(&shared.successors);

        match next {
            Next::Run(index, worker) => {
                let name = worker.name();
                klog_debug!("slot {} running {}", slot, name);
                let outcome = match util::blocking(move || worker.run()).await {
                    Ok(TaskResult { success: true, .. }) => NodeOutcome::Succeeded,
                    Ok(result) => NodeOutcome::Failed {
                        error: result
                            .error_message
                            .unwrap_or_else(|| format!("{} failed", name)),
                    },
                    Err(e) => NodeOutcome::Failed {
                        error: e.to_string(),
                    },
                };
                if let NodeOutcome::Failed { error } = &outcome {
                    klog_warn!("{} failed: {}", name, error);
                }
                {
                    let mut state = shared.lock();
                    state.active -= 1;
                    state.resolve(index, outcome, &shared.successors);
                }
                shared.notify.notify_waiters();
            }
            Next::Wait => notified.await,
            Next::Done => {
                shared.notify.notify_waiters();
                return;
            }
        }
    }
}
