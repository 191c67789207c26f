//! Per-task timing records.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Time spent in one task of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerInfo {
    pub task_name: String,
    pub project_name: String,
    pub elapsed: Duration,
}

impl ProfilerInfo {
    pub fn new(task_name: &str, project_name: &str, elapsed: Duration) -> Self {
        Self {
            task_name: task_name.to_string(),
            project_name: project_name.to_string(),
            elapsed,
        }
    }
}

/// Append-only record list shared by every worker of a run.
///
/// Cloning shares the underlying list.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    records: Arc<Mutex<Vec<ProfilerInfo>>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProfilerInfo>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, info: ProfilerInfo) {
        self.lock().push(info);
    }

    /// Records in the order they were appended.
    pub fn snapshot(&self) -> Vec<ProfilerInfo> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Format records slowest first, one `project:task` per line.
pub fn report(records: &[ProfilerInfo]) -> String {
    let mut sorted: Vec<&ProfilerInfo> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.elapsed
            .cmp(&a.elapsed)
            .then_with(|| a.project_name.cmp(&b.project_name))
            .then_with(|| a.task_name.cmp(&b.task_name))
    });

    let total: Duration = records.iter().map(|r| r.elapsed).sum();
    let mut out = String::from("Timings:\n");
    for info in sorted {
        out.push_str(&format!(
            "  {:>10.3}s  {}:{}\n",
            info.elapsed.as_secs_f64(),
            info.project_name,
            info.task_name
        ));
    }
    out.push_str(&format!("  {:>10.3}s  total\n", total.as_secs_f64()));
    out
}
