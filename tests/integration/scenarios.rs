//! Failure handling scenarios across tasks and projects.

use std::sync::Arc;

use kiln::core::{OrderingIndex, Project, ProjectStatus};
use kiln::execution::{NodeOutcome, ProjectRunner, RunContext};

use crate::fixtures::{config, run_projects, EventLog, RecordingDiscovery};

/// Given tasks {compile, test} with test dependsOn compile
/// When compile fails
/// Then test is skipped and the project fails
#[tokio::test]
async fn test_failed_compile_skips_test() {
    let discovery = RecordingDiscovery::new()
        .project("core", &["compile", "test"])
        .failing("core", "compile");
    let calls = discovery.clone();
    let mut ordering = OrderingIndex::new();
    ordering.add_dependency("test", "compile");

    let result = run_projects(discovery, ordering, &[Project::new("core")], 4).await;

    assert!(!result.success());
    let core = result.project("core").unwrap();
    assert_eq!(core.status, ProjectStatus::Failed);
    assert!(core.task("compile").unwrap().outcome.is_failure());
    assert_eq!(core.task("test").unwrap().outcome, NodeOutcome::Skipped);
    assert_eq!(calls.calls(), vec!["core:compile"]);
}

/// Given project p2 dependsOn p1
/// When p1 fails
/// Then p2 is never built, is SKIPPED, and the diagnostic names p1
#[tokio::test]
async fn test_project_depending_on_failed_project_is_skipped() {
    let discovery = RecordingDiscovery::new()
        .project("p1", &["build"])
        .project("p2", &["build"])
        .failing("p1", "build");
    let calls = discovery.clone();
    let events = Arc::new(EventLog::default());

    let runner = ProjectRunner::new(discovery, Arc::new(OrderingIndex::new()))
        .with_listener(events.clone());
    let mut context = RunContext::new(config(2));
    let projects = [Project::new("p1"), Project::new("p2").depends_on("p1")];
    let result = runner.run(&mut context, &projects).await.unwrap();

    let p2 = result.project("p2").unwrap();
    assert_eq!(p2.status, ProjectStatus::Skipped);
    assert_eq!(
        p2.result.error_message.as_deref(),
        Some("Not building project p2 since it depends on failed project(s) p1")
    );
    assert_eq!(calls.calls(), vec!["p1:build"]);
    assert_eq!(
        events.events(),
        vec!["start p1", "end p1 FAILED", "end p2 SKIPPED"]
    );
    assert!(context.is_failed("p1"));
    assert!(context.is_failed("p2"));
}

/// Given cleanup alwaysRunAfter compile
/// When compile fails
/// Then cleanup still runs and reports its own result
#[tokio::test]
async fn test_cleanup_runs_after_failed_compile() {
    let discovery = RecordingDiscovery::new()
        .project("core", &["cleanup", "compile"])
        .failing("core", "compile");
    let calls = discovery.clone();
    let mut ordering = OrderingIndex::new();
    ordering.add_always_run_after("compile", "cleanup");

    let result = run_projects(discovery, ordering, &[Project::new("core")], 2).await;

    let core = result.project("core").unwrap();
    assert_eq!(core.status, ProjectStatus::Failed);
    assert_eq!(core.task("cleanup").unwrap().outcome, NodeOutcome::Succeeded);
    assert_eq!(calls.calls(), vec!["core:compile", "core:cleanup"]);
}

/// Given independent tasks {lint, docs}
/// When run with pool size 2 and pool size 1
/// Then both execute and the results match
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_independent_tasks_under_both_pool_sizes() {
    let mut records = Vec::new();
    for workers in [2, 1] {
        let discovery = RecordingDiscovery::new().project("core", &["lint", "docs"]);
        let calls = discovery.clone();
        let result =
            run_projects(discovery, OrderingIndex::new(), &[Project::new("core")], workers).await;

        assert!(result.success());
        let mut executed = calls.calls();
        executed.sort();
        assert_eq!(executed, vec!["core:docs", "core:lint"]);
        records.push(result.projects);
    }
    assert_eq!(records[0], records[1]);
}

#[tokio::test]
async fn test_independent_project_still_builds_after_failure() {
    let discovery = RecordingDiscovery::new()
        .project("lib", &["build"])
        .project("app", &["build"])
        .project("tools", &["build"])
        .failing("lib", "build");
    let calls = discovery.clone();
    let projects = [
        Project::new("lib"),
        Project::new("app").depends_on("lib"),
        Project::new("tools"),
    ];

    let result = run_projects(discovery, OrderingIndex::new(), &projects, 2).await;

    assert!(!result.success());
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.project("tools").unwrap().status, ProjectStatus::Success);
    assert_eq!(calls.calls(), vec!["lib:build", "tools:build"]);
    // A later success must not hide the earlier failure.
    assert_eq!(
        result.result.error_message.as_deref(),
        Some("Task lib:build failed: build failed")
    );
}

#[tokio::test]
async fn test_diagnostic_lists_every_failed_dependency() {
    let discovery = RecordingDiscovery::new()
        .project("a", &["build"])
        .project("b", &["build"])
        .project("c", &["build"])
        .failing("a", "build")
        .failing("b", "build");
    let projects = [
        Project::new("a"),
        Project::new("b"),
        Project::new("c").depends_on("a").depends_on("b"),
    ];

    let result = run_projects(discovery, OrderingIndex::new(), &projects, 1).await;

    assert_eq!(
        result.project("c").unwrap().result.error_message.as_deref(),
        Some("Not building project c since it depends on failed project(s) a, b")
    );
}
