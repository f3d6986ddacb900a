use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use executor::{
    ExecutionConfig, ExecutionPlan, ExecutionResult, JobStatus, StepStatus, WorkflowExecutor,
};
use models::WorkflowDocument;
use runtime::{ConsoleSink, ContainerManager, RuntimeClient, RuntimeKind, SystemProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "jobbox",
    about = "Run workflow jobs locally, one ephemeral container per job",
    version,
    long_about = "Runs the jobs of a workflow file locally, each in its own podman or docker container.\n\nExamples:\n  jobbox run .github/workflows/build.yml              # Run every job\n  jobbox run .github/workflows/build.yml --job test   # Run 'test' and what it needs\n  jobbox run workflow.yml --dry-run                   # Show the execution plan only\n  jobbox validate workflow.yml --strict               # Schema check, warnings are errors\n  jobbox parse workflow.yml --format json             # Print the normalized workflow"
)]
struct Jobbox {
    #[command(subcommand)]
    command: Commands,

    /// Run in verbose mode with detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run in debug mode with extensive execution details
    #[arg(short, long, global = true)]
    debug: bool,

    /// Container CLI to use instead of auto-detection
    #[arg(long, global = true, value_enum, env = "JOBBOX_RUNTIME")]
    runtime: Option<RuntimeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RuntimeArg {
    Podman,
    Docker,
}

impl From<RuntimeArg> for RuntimeKind {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Podman => RuntimeKind::Podman,
            RuntimeArg::Docker => RuntimeKind::Docker,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a workflow file locally
    Run {
        /// Path to workflow file to execute
        path: PathBuf,

        /// Run only this job and the jobs it needs
        #[arg(short, long)]
        job: Option<String>,

        /// Event that triggers the workflow
        #[arg(short, long, default_value = "push")]
        event: String,

        /// Parse and plan without starting any container
        #[arg(long)]
        dry_run: bool,

        /// Run independent jobs concurrently
        #[arg(long)]
        parallel: bool,

        /// Host directory to mount at /workspace in every job container
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow file
        path: PathBuf,

        /// Also check the JSON schema and treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Parse a workflow file and print its normalized structure
    Parse {
        /// Path to workflow file
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
}

async fn handle_signals(manager: Arc<ContainerManager>) {
    // Hard deadline in case the container CLI hangs during cleanup
    let hard_exit_time = Duration::from_secs(10);

    match tokio::signal::ctrl_c().await {
        Ok(_) => {
            println!("Received Ctrl+C, shutting down and cleaning up...");
        }
        Err(e) => {
            eprintln!("Warning: Failed to properly listen for ctrl+c event: {}", e);
            return;
        }
    }

    let _ = std::thread::spawn(move || {
        std::thread::sleep(hard_exit_time);
        eprintln!(
            "Cleanup taking too long (over {} seconds), forcing exit...",
            hard_exit_time.as_secs()
        );
        logging::error("Forced exit due to cleanup timeout");
        std::process::exit(1);
    });

    match tokio::time::timeout(Duration::from_secs(5), manager.cleanup_all()).await {
        Ok(removed) => logging::info(&format!("Removed {} container(s)", removed)),
        Err(_) => logging::warning("Container cleanup timed out, continuing with shutdown"),
    }

    std::process::exit(130);
}

fn load(path: &Path) -> Option<WorkflowDocument> {
    match parser::parse_workflow(path) {
        Ok(workflow) => Some(workflow),
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            None
        }
    }
}

/// Absolute path of an existing directory. The container CLI would read a
/// relative `-v` source as a named volume.
fn resolve_workspace(dir: &Path) -> Result<PathBuf, String> {
    let resolved = std::fs::canonicalize(dir)
        .map_err(|e| format!("Workspace '{}' is not accessible: {}", dir.display(), e))?;
    if !resolved.is_dir() {
        return Err(format!("Workspace '{}' is not a directory", dir.display()));
    }
    Ok(resolved)
}

fn print_plan(workflow: &WorkflowDocument, plan: &ExecutionPlan) {
    let title = if workflow.name.is_empty() {
        "workflow"
    } else {
        workflow.name.as_str()
    };
    println!("Execution plan for '{}' ({} job(s)):", title.bold(), plan.len());
    for (i, level) in plan.levels().iter().enumerate() {
        println!("  Level {}: {}", i + 1, level.join(", "));
    }
    println!("Order: {}", plan.order().join(" -> "));
}

fn print_report(report: &ExecutionResult, verbose: bool) {
    for job in &report.jobs {
        let (icon, label) = match job.status {
            JobStatus::Success => ("✅", "succeeded".green()),
            JobStatus::Failure => ("❌", "failed".red()),
            JobStatus::Skipped => ("⏭️", "skipped".yellow()),
        };
        let image = job
            .image
            .as_deref()
            .map(|image| format!(" [{}]", image))
            .unwrap_or_default();
        println!("\n{} Job {}{}: {}", icon, job.name.bold(), image, label);

        for step in &job.steps {
            let icon = match step.status {
                StepStatus::Success => "✅",
                StepStatus::Failure => "❌",
                StepStatus::Skipped => "⏭️",
            };
            println!("  {} {}", icon, step.name);

            // Successful output was already streamed; repeat it only on request
            let show = verbose || step.status != StepStatus::Success;
            if show && !step.output.trim().is_empty() {
                for line in step.output.lines() {
                    println!("    {}", line);
                }
            }
        }
    }

    match &report.error {
        Some(err) => {
            println!("\n{} {}", "❌ Workflow execution failed:".red().bold(), err);
        }
        None => println!("\n{}", "✅ Workflow completed successfully!".green().bold()),
    }
}

struct RunOptions {
    job: Option<String>,
    event: String,
    dry_run: bool,
    parallel: bool,
    workspace: Option<PathBuf>,
}

async fn run_workflow(path: &Path, mut options: RunOptions, cli: &Jobbox) -> i32 {
    let Some(workflow) = load(path) else {
        return 1;
    };

    if let Some(dir) = options.workspace.take() {
        match resolve_workspace(&dir) {
            Ok(resolved) => options.workspace = Some(resolved),
            Err(e) => {
                eprintln!("{} {}", "❌".red(), e);
                return 1;
            }
        }
    }

    if !workflow.triggers.is_empty() && !workflow.triggers.contains(&options.event) {
        logging::warning(&format!(
            "Workflow is not triggered by '{}' (triggers: {})",
            options.event,
            workflow.triggers.join(", ")
        ));
    }

    let plan = match executor::plan(&workflow, options.job.as_deref()) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            return 1;
        }
    };

    if options.dry_run {
        print_plan(&workflow, &plan);
        println!("{}", "Dry run: no containers were started".dimmed());
        return 0;
    }

    let process_runner = Arc::new(SystemProcessRunner);
    let client = match cli.runtime {
        Some(kind) => RuntimeClient::for_kind(kind.into(), process_runner),
        None => RuntimeClient::detect_with(process_runner),
    };
    let manager = Arc::new(ContainerManager::new(client, Arc::new(ConsoleSink)));
    tokio::spawn(handle_signals(manager.clone()));

    let config = ExecutionConfig {
        parallel: options.parallel,
        workspace: options.workspace,
        ..Default::default()
    };
    let executor = WorkflowExecutor::new(manager, config);
    let report = executor
        .run_with_report(&workflow, options.job.as_deref(), &options.event)
        .await;

    print_report(&report, cli.verbose || cli.debug);
    if report.is_success() {
        0
    } else {
        1
    }
}

fn validate_workflow(path: &Path, strict: bool, verbose: bool) -> i32 {
    let Some(workflow) = load(path) else {
        return 1;
    };

    let mut result = validators::validate_workflow(&workflow);

    if strict {
        match parser::schema::SchemaValidator::new() {
            Ok(schema) => {
                if let Err(errors) = schema.validate_workflow(path) {
                    for error in errors {
                        result.add_issue(format!("Schema: {}", error));
                    }
                }
            }
            Err(e) => result.add_issue(e),
        }
        result.promote_warnings();
    }

    for warning in &result.warnings {
        println!("{} {}", "⚠️  Warning:".yellow(), warning);
    }
    for issue in &result.issues {
        println!("{} {}", "❌".red(), issue);
    }

    if verbose {
        println!("✓ Workflow name: {}", workflow.name);
        println!("✓ Jobs: {}", workflow.jobs.len());
        for job_id in workflow.job_ids() {
            println!("  - {}", job_id);
        }
    }

    if result.is_valid {
        println!("{} {}", "✓".green(), "Workflow is valid".green());
        0
    } else {
        println!(
            "{} {} ({} issue(s))",
            "✗".red(),
            "Workflow is invalid".red(),
            result.issues.len()
        );
        1
    }
}

fn parse_workflow(path: &Path, format: OutputFormat) -> i32 {
    let Some(workflow) = load(path) else {
        return 1;
    };

    let output = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&workflow).map_err(|e| e.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&workflow).map_err(|e| e.to_string()),
    };

    match output {
        Ok(text) => {
            println!("{}", text.trim_end());
            0
        }
        Err(e) => {
            eprintln!("{} Failed to format output: {}", "❌".red(), e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Jobbox::parse();
    let verbose = cli.verbose || cli.debug;

    logging::set_log_level(logging::LogLevel::from_flags(cli.verbose, cli.debug));
    if cli.debug {
        logging::debug("Debug mode enabled - showing detailed logs");
    }

    let code = match &cli.command {
        Commands::Run {
            path,
            job,
            event,
            dry_run,
            parallel,
            workspace,
        } => {
            if verbose {
                println!("Running workflow: {}", path.display());
                println!("Event: {}", event);
                if let Some(job) = job {
                    println!("Job: {}", job);
                }
            }
            let options = RunOptions {
                job: job.clone(),
                event: event.clone(),
                dry_run: *dry_run,
                parallel: *parallel,
                workspace: workspace.clone(),
            };
            run_workflow(path, options, &cli).await
        }
        Commands::Validate { path, strict } => {
            if verbose {
                println!("Validating workflow: {}", path.display());
            }
            validate_workflow(path, *strict, verbose)
        }
        Commands::Parse { path, format } => {
            if verbose {
                println!("Parsing workflow: {}", path.display());
            }
            parse_workflow(path, *format)
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_workspace_makes_relative_paths_absolute() {
        let resolved = resolve_workspace(Path::new(".")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::env::current_dir().unwrap().canonicalize().unwrap());

        let err = resolve_workspace(Path::new("/definitely/not/a/dir")).unwrap_err();
        assert!(err.contains("is not accessible"));
    }
}
