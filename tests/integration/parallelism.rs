//! Concurrency bounds of the worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln::core::{OrderingIndex, Plugin, Project, Task, TaskResult, TaskSet};
use kiln::execution::ProjectRunner;
use kiln::RunContext;

use crate::fixtures::{config, TestPlan};

/// Tasks that sleep and track how many of them run at once.
fn tracked_tasks(count: usize, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> TaskSet {
    let plugin = Arc::new(Plugin::new("sleep"));
    (0..count)
        .map(|i| {
            let running = Arc::clone(running);
            let peak = Arc::clone(peak);
            Task::new(&format!("task-{}", i), Arc::clone(&plugin), move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(40));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(TaskResult::success())
            })
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_never_exceeds_worker_count() {
    for workers in [1, 3] {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let discovery = move |_: &Project| tracked_tasks(8, &r, &p);

        let runner = ProjectRunner::new(discovery, Arc::new(OrderingIndex::new()));
        let mut context = RunContext::new(config(workers));
        let result = runner
            .run(&mut context, &[Project::new("core")])
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.profiling.len(), 8);
        let observed = peak.load(Ordering::SeqCst);
        assert!(
            observed <= workers,
            "peak concurrency {} exceeded pool size {}",
            observed,
            workers
        );
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_commands_overlap() {
    let plan = TestPlan::new(
        r#"
[[projects]]
name = "core"

[[projects.tasks]]
name = "a"
command = "sleep 0.3"

[[projects.tasks]]
name = "b"
command = "sleep 0.3"

[[projects.tasks]]
name = "c"
command = "sleep 0.3"

[[projects.tasks]]
name = "d"
command = "sleep 0.3"
"#,
    );

    let start = Instant::now();
    let result = plan.run(config(4), Vec::new()).await;
    let elapsed = start.elapsed();

    assert!(result.success());
    assert!(
        elapsed < Duration::from_millis(1000),
        "four 300ms commands on four slots took {:?}",
        elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chain_serializes_even_with_spare_slots() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&order);
    let discovery = move |_: &Project| {
        let plugin = Arc::new(Plugin::new("chain"));
        ["one", "three", "two"]
            .into_iter()
            .map(|name| {
                let log = Arc::clone(&log);
                Task::new(name, Arc::clone(&plugin), move |_| {
                    log.lock().unwrap().push(name);
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(TaskResult::success())
                })
            })
            .collect::<TaskSet>()
    };
    let mut ordering = OrderingIndex::new();
    ordering.add_dependency("two", "one").add_run_after("three", "two");

    let runner = ProjectRunner::new(discovery, Arc::new(ordering));
    let mut context = RunContext::new(config(8));
    let result = runner
        .run(&mut context, &[Project::new("core")])
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(*order.lock().unwrap(), vec!["one", "two", "three"]);
}
