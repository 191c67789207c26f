//! Plan files run end to end with real shell commands.

use kiln::core::ProjectStatus;
use kiln::execution::NodeOutcome;
use kiln::{BuildPlan, Error};

use crate::fixtures::{config, dry_run_config, TestPlan};

const JAVA_PLAN: &str = r#"
[plugins.java]
projects = ["core", "app"]

[[projects]]
name = "core"

[[projects.tasks]]
name = "compile"
plugin = "java"
command = "echo core:compile >> log.txt"

[[projects.tasks]]
name = "test"
plugin = "java"
command = "echo core:test >> log.txt"

[[projects.tasks]]
name = "docs"
command = "echo core:docs >> log.txt"

[[projects]]
name = "app"
depends_on = ["core"]

[[projects.tasks]]
name = "compile"
plugin = "java"
command = "echo app:compile >> log.txt"

[[projects.tasks]]
name = "test"
plugin = "java"
command = "echo app:test >> log.txt"

[[projects]]
name = "scripts"

[[projects.tasks]]
name = "compile"
plugin = "java"
command = "echo scripts:compile >> log.txt"

[ordering]
depends_on = { test = ["compile"] }
"#;

#[tokio::test]
async fn test_plan_runs_projects_in_dependency_order() {
    let plan = TestPlan::new(JAVA_PLAN);
    let result = plan.run(config(1), Vec::new()).await;

    assert!(result.success());
    assert_eq!(
        plan.read_lines("log.txt"),
        vec![
            "core:compile",
            "core:docs",
            "core:test",
            "app:compile",
            "app:test",
        ]
    );
    // The java plugin does not apply to scripts.
    let scripts = result.project("scripts").unwrap();
    assert_eq!(scripts.status, ProjectStatus::Success);
    assert!(scripts.tasks.is_empty());
}

#[tokio::test]
async fn test_plan_targets_select_closure() {
    let plan = TestPlan::new(JAVA_PLAN);
    let result = plan.run(config(2), vec!["test".to_string()]).await;

    assert!(result.success());
    let mut lines = plan.read_lines("log.txt");
    lines.sort();
    assert_eq!(
        lines,
        vec!["app:compile", "app:test", "core:compile", "core:test"]
    );
}

#[tokio::test]
async fn test_plan_qualified_target_only_applies_to_its_project() {
    let plan = TestPlan::new(JAVA_PLAN);
    let result = plan.run(config(2), vec!["core:docs".to_string()]).await;

    assert!(result.success());
    assert_eq!(plan.read_lines("log.txt"), vec!["core:docs"]);
    assert!(result.project("app").unwrap().tasks.is_empty());
}

#[tokio::test]
async fn test_plan_dry_run_touches_nothing() {
    let plan = TestPlan::new(JAVA_PLAN);
    let result = plan.run(dry_run_config(4), Vec::new()).await;

    assert!(result.success());
    assert!(!plan.dir().join("log.txt").exists());
    assert_eq!(result.profiling.len(), 5);
}

#[tokio::test]
async fn test_plan_command_failure_and_cleanup() {
    let plan = TestPlan::new(
        r#"
[[projects]]
name = "core"

[[projects.tasks]]
name = "compile"
command = "echo 'error: missing semicolon' >&2; exit 1"

[[projects.tasks]]
name = "test"
command = "touch tested"

[[projects.tasks]]
name = "cleanup"
command = "touch cleaned"

[[projects]]
name = "app"
depends_on = ["core"]

[[projects.tasks]]
name = "compile"
command = "touch app-built"

[ordering]
depends_on = { test = ["compile"] }
always_run_after = { compile = ["cleanup"] }
"#,
    );
    let result = plan.run(config(2), Vec::new()).await;

    assert!(!result.success());
    let core = result.project("core").unwrap();
    assert_eq!(core.status, ProjectStatus::Failed);
    assert_eq!(
        core.task("compile").unwrap().outcome,
        NodeOutcome::Failed {
            error: "`echo 'error: missing semicolon' >&2; exit 1` exited with status 1: error: missing semicolon"
                .to_string()
        }
    );
    assert_eq!(core.task("test").unwrap().outcome, NodeOutcome::Skipped);
    assert_eq!(core.task("cleanup").unwrap().outcome, NodeOutcome::Succeeded);
    assert!(plan.dir().join("cleaned").exists());
    assert!(!plan.dir().join("tested").exists());

    assert_eq!(result.project("app").unwrap().status, ProjectStatus::Skipped);
    assert!(!plan.dir().join("app-built").exists());
}

#[test]
fn test_plan_load_errors() {
    let cyclic = TestPlan::new(
        r#"
[[projects]]
name = "a"
depends_on = ["c"]
[[projects]]
name = "b"
depends_on = ["a"]
[[projects]]
name = "c"
depends_on = ["b"]
"#,
    );
    let err = cyclic.load().sorted_projects().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cycle detected in project dependencies: a -> b -> c -> a"
    );

    let broken = TestPlan::new("[[projects]]\nname = ");
    assert!(matches!(
        BuildPlan::load(&broken.path),
        Err(Error::TomlParse(_))
    ));

    let plan = TestPlan::new(JAVA_PLAN).load();
    assert!(matches!(
        plan.validate_targets(&["deploy".to_string()]),
        Err(Error::UnknownTarget(_))
    ));
}
