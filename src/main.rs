use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use kiln::core::TaskGraphBuilder;
use kiln::execution::profiler;
use kiln::execution::{LoggingListener, ProjectRunner, RunContext, RunResult, TaskDiscovery};
use kiln::{klog, klog_error, klog_warn, BuildPlan, Error, Result, RunnerConfig};

/// Kiln - dependency-ordered, parallel task runner for multi-project builds
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    KILN_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.kiln/kiln.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Build every project in a plan, or only the given tasks
    Run {
        /// Path to the build plan
        plan: PathBuf,

        /// Tasks to build (`task` or `project:task`); all tasks when empty
        tasks: Vec<String>,

        /// Worker slots per project (overrides the config file)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Walk the task graphs without running commands
        #[arg(long)]
        dry_run: bool,

        /// Print per-task timings after the run
        #[arg(long)]
        profiling: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one project's task graph in DOT format
    Graph {
        /// Path to the build plan
        plan: PathBuf,

        /// Project whose graph to print
        project: String,

        /// Restrict the graph to these tasks
        tasks: Vec<String>,
    },

    /// List projects in build order
    Projects {
        /// Path to the build plan
        plan: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    kiln::log::init_with_debug(cli.debug);
    if kiln::log::is_debug() {
        klog!("kiln starting (debug logging enabled)");
    }

    log_failure(execute(cli.command))
}

/// Record an aborted command at ERROR before it reaches the terminal.
fn log_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        klog_error!("kiln aborted: {}", e);
    }
    result
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run {
            plan,
            tasks,
            jobs,
            dry_run,
            profiling,
            json,
        } => {
            let mut config = RunnerConfig::load().unwrap_or_else(|e| {
                klog_warn!("Could not load config, using defaults: {}", e);
                RunnerConfig::default()
            });
            if let Some(jobs) = jobs {
                config.workers = jobs;
            }
            config.dry_run |= dry_run;
            config.profiling |= profiling;

            let result = run_build(&plan, tasks, config.clone())?;
            if json {
                print_json(&result)?;
            } else {
                print_summary(&result, config.profiling);
            }
            if !result.success() {
                std::process::exit(result.exit_code());
            }
            Ok(())
        }
        Command::Graph {
            plan,
            project,
            tasks,
        } => run_graph(&plan, &project, &tasks),
        Command::Projects { plan } => run_projects(&plan),
    }
}

fn run_build(path: &Path, targets: Vec<String>, config: RunnerConfig) -> Result<RunResult> {
    klog!(
        "Run command: plan={}, targets={:?}, workers={}, dry_run={}",
        path.display(),
        targets,
        config.effective_workers(),
        config.dry_run
    );

    let plan = BuildPlan::load(path)?;
    plan.validate_targets(&targets)?;
    let projects = plan.sorted_projects()?;
    let ordering = Arc::new(plan.ordering_index());

    let runner = ProjectRunner::new(plan, ordering)
        .with_listener(Arc::new(LoggingListener))
        .with_targets(targets);
    let mut context = RunContext::new(config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(runner.run(&mut context, &projects))
}

fn print_summary(result: &RunResult, profiling: bool) {
    println!();
    for record in &result.projects {
        println!("  {:<24} {}", record.project, record.status);
        if let Some(message) = &record.result.error_message {
            println!("      {}", message);
        }
    }
    println!();

    if profiling {
        print!("{}", profiler::report(&result.profiling));
        println!();
    }

    if result.success() {
        println!("BUILD SUCCESSFUL");
    } else {
        println!(
            "BUILD FAILED: {}",
            result.result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_json(result: &RunResult) -> Result<()> {
    let json_output = serde_json::json!({
        "success": result.success(),
        "error": result.result.error_message,
        "projects": result.projects,
        "profiling": result.profiling,
    });
    println!("{}", serde_json::to_string_pretty(&json_output)?);
    Ok(())
}

fn run_graph(path: &Path, project: &str, targets: &[String]) -> Result<()> {
    let plan = BuildPlan::load(path)?;
    let spec = plan
        .project(project)
        .ok_or_else(|| Error::Validation(format!("Project not found: {}", project)))?;
    let project = Arc::new(spec.to_project());

    let tasks = plan.tasks_for(&project);
    let ordering = plan.ordering_index();
    let graph = TaskGraphBuilder::new(project, &tasks, &ordering)
        .with_targets(targets)
        .build()?;

    print!("{}", graph.to_dot());
    Ok(())
}

fn run_projects(path: &Path) -> Result<()> {
    let plan = BuildPlan::load(path)?;
    for (position, project) in plan.sorted_projects()?.iter().enumerate() {
        if project.depends_on.is_empty() {
            println!("{:>3}. {}", position + 1, project.name);
        } else {
            println!(
                "{:>3}. {} (after {})",
                position + 1,
                project.name,
                kiln::util::comma_join(&project.depends_on)
            );
        }
    }
    Ok(())
}
