//! Executable units for the graph executor.

use crate::core::task::{TaskNode, TaskResult};
use crate::error::Result;
use crate::execution::listener::Listeners;
use crate::execution::profiler::{Profiler, ProfilerInfo};
use crate::{klog, klog_warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// One node's work, run on an executor slot.
///
/// `run` executes on the blocking pool and may block. An `Err` or a panic
/// counts as a failure of the node.
pub trait Worker: Send + 'static {
    /// Label used in logs.
    fn name(&self) -> String;

    fn run(self) -> Result<TaskResult>;
}

/// Runs one task of one project, or simulates it in dry-run mode.
#[derive(Debug)]
pub struct TaskWorker {
    node: TaskNode,
    dry_run: bool,
    profiler: Profiler,
    listeners: Listeners,
}

impl TaskWorker {
    pub fn new(node: TaskNode, dry_run: bool, profiler: Profiler, listeners: Listeners) -> Self {
        Self {
            node,
            dry_run,
            profiler,
            listeners,
        }
    }
}

impl Worker for TaskWorker {
    fn name(&self) -> String {
        self.node.qualified_name()
    }

    fn run(self) -> Result<TaskResult> {
        self.listeners.task_start(&self.node);
        let start = Instant::now();

        let result = if self.dry_run {
            klog!("[dry-run] {}", self.node.qualified_name());
            TaskResult::success()
        } else {
            let node = &self.node;
            match panic::catch_unwind(AssertUnwindSafe(|| node.task.run(&node.project))) {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => TaskResult::failure(e.to_string()),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    klog_warn!("{} panicked: {}", node.qualified_name(), message);
                    TaskResult::failure(format!("Task panicked: {}", message))
                }
            }
        };

        self.profiler.record(ProfilerInfo::new(
            self.node.name(),
            &self.node.project.name,
            start.elapsed(),
        ));
        self.listeners.task_end(&self.node, &result);
        Ok(result)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
