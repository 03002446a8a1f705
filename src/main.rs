use anyhow::{Context, Result};
use indexmap::IndexMap;
use localci::{
    backend::{CapabilityProber, ContainerBackend, DockerBackend},
    cli::{
        commands::{DoctorCommand, EventsCommand, JobsCommand, ListCommand, RunCommand, TestCommand},
        output::*,
        Cli, Command,
    },
    config::RunnerConfig,
    core::{trigger, RunOutcome, RunResult, WorkflowError},
    execution::{SchedulingStrategy, WorkflowEngine},
    exit_codes, logging,
    persistence::RunStateTracker,
    workspace::{self, WorkflowManager},
};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::error;

/// Timeout for docker host queries (version, buildx)
const HOST_QUERY_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();
    logging::init(cli.verbose);

    let config = cli.runner_config();

    let code = match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, config).await?,
        Command::List(cmd) => list_workflows(cmd, &config)?,
        Command::Events(cmd) => list_events(cmd, &config)?,
        Command::Jobs(cmd) => list_jobs(cmd, &config)?,
        Command::Doctor(cmd) => doctor(cmd, &config).await?,
        Command::Test(cmd) => test_workflows(cmd, config).await?,
    };

    if code != exit_codes::OK {
        std::process::exit(code);
    }
    Ok(())
}

fn create_manager(
    config: RunnerConfig,
    strategy: SchedulingStrategy,
    env: IndexMap<String, String>,
    secrets: IndexMap<String, String>,
) -> WorkflowManager<DockerBackend> {
    let backend = Arc::new(DockerBackend::new(config.docker_path.clone(), config.run_timeout_secs));
    let tracker = Arc::new(RunStateTracker::new());
    let engine = WorkflowEngine::new(backend, config, tracker)
        .with_strategy(strategy)
        .with_env(env)
        .with_secrets(secrets);
    WorkflowManager::new(engine)
}

fn definition_error(e: &WorkflowError) -> i32 {
    println!("{}{}", CROSS, style(e).red());
    exit_codes::DEFINITION
}

async fn run_workflow(cmd: &RunCommand, mut config: RunnerConfig) -> Result<i32> {
    if let Some(minutes) = cmd.timeout_minutes {
        config = config.with_timeout_minutes(minutes);
    }

    let manager = create_manager(
        config,
        cmd.strategy.into_strategy(cmd.max_parallel),
        cmd.env.iter().cloned().collect(),
        cmd.secrets.iter().cloned().collect(),
    );

    if !cmd.json {
        for (key, value) in &cmd.env {
            println!("{}Env override: {} = {}", INFO, style(key).cyan(), style(value).dim());
        }
        manager
            .engine()
            .add_event_handler(|event| println!("{}", format_execution_event(&event)))
            .await;
    }

    let result = match manager.run(&cmd.workflow, &cmd.event).await {
        Ok(result) => result,
        Err(e) => return Ok(definition_error(&e)),
    };

    if cmd.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize run result")?;
        println!("{}", json);
    } else {
        print_run_report(&cmd.workflow, &result);
    }

    Ok(match result.outcome {
        RunOutcome::Success => exit_codes::OK,
        RunOutcome::Failure => exit_codes::FAILURE,
        RunOutcome::Skipped => exit_codes::SKIPPED,
    })
}

fn print_run_report(name: &str, result: &RunResult) {
    if !result.output.is_empty() {
        println!("{}", separator());
        println!("{}", result.output);
        println!("{}", separator());
    }
    if !result.variants.is_empty() {
        println!("{}", format_run_summary(result));
    }

    match result.outcome {
        RunOutcome::Success => println!(
            "\n{}Workflow {} completed {}",
            CHECK,
            style(name).bold(),
            style("successfully").green()
        ),
        RunOutcome::Skipped => println!(
            "\n{}Workflow {} skipped: {}",
            SKIP,
            style(name).bold(),
            result.error.as_deref().unwrap_or_default()
        ),
        RunOutcome::Failure => {
            println!("\n{}Workflow {} {}", CROSS, style(name).bold(), style("failed").red());
            error!("{}", result.error.as_deref().unwrap_or("workflow failed"));
        }
    }
}

fn list_workflows(cmd: &ListCommand, config: &RunnerConfig) -> Result<i32> {
    let dir = config.workflows_dir();
    let files = workspace::discover(&dir).context("Failed to read workflow directory")?;
    let relative: Vec<String> = files
        .iter()
        .map(|path| relative_to(path, &config.workspace))
        .collect();

    if cmd.json {
        let data = serde_json::json!({ "workflows": relative });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(exit_codes::OK);
    }

    if !dir.is_dir() {
        println!(
            "No workflows found ({} directory does not exist)",
            relative_to(&dir, &config.workspace)
        );
    } else if relative.is_empty() {
        println!("No workflow files found");
    } else {
        for path in &relative {
            println!("{}", path);
        }
    }
    Ok(exit_codes::OK)
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn load(config: &RunnerConfig, name: &str) -> Result<localci::Workflow, WorkflowError> {
    let path = workspace::resolve(&config.workflows_dir(), name)?;
    localci::Workflow::from_file(path)
}

fn list_events(cmd: &EventsCommand, config: &RunnerConfig) -> Result<i32> {
    if !cmd.declared {
        for event in trigger::KNOWN_EVENTS {
            println!("{}", event);
        }
        return Ok(exit_codes::OK);
    }

    let workflow = match load(config, &cmd.workflow) {
        Ok(workflow) => workflow,
        Err(e) => return Ok(definition_error(&e)),
    };
    for event in trigger::declared_events(&workflow) {
        println!("{}", event);
    }
    Ok(exit_codes::OK)
}

fn list_jobs(cmd: &JobsCommand, config: &RunnerConfig) -> Result<i32> {
    let workflow = match load(config, &cmd.workflow) {
        Ok(workflow) => workflow,
        Err(e) => return Ok(definition_error(&e)),
    };

    if !trigger::should_run(&workflow, &cmd.event) {
        eprintln!(
            "{}Workflow {} does not run for {}",
            WARN,
            style(&cmd.workflow).bold(),
            style(&cmd.event).cyan()
        );
    }

    for job_id in workflow.jobs.keys() {
        println!("{}", job_id);
    }
    Ok(exit_codes::OK)
}

async fn doctor(cmd: &DoctorCommand, config: &RunnerConfig) -> Result<i32> {
    let backend = Arc::new(DockerBackend::new(config.docker_path.clone(), HOST_QUERY_TIMEOUT_SECS));
    let version = backend.server_version().await;
    let prober = CapabilityProber::new(backend);
    let buildx = prober.probe_buildx().await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&doctor_json(&version, buildx))?);
    } else {
        println!("{}", format_doctor_report(&version, buildx));
    }
    Ok(exit_codes::OK)
}

async fn test_workflows(cmd: &TestCommand, mut config: RunnerConfig) -> Result<i32> {
    if let Some(minutes) = cmd.timeout_minutes {
        config = config.with_timeout_minutes(minutes);
    }
    let events: Vec<String> = if cmd.events.is_empty() {
        trigger::DEFAULT_TEST_EVENTS.iter().map(|e| e.to_string()).collect()
    } else {
        cmd.events.clone()
    };

    let strategy = if cmd.sequential {
        SchedulingStrategy::Sequential
    } else {
        SchedulingStrategy::Parallel
    };
    let manager = Arc::new(create_manager(
        config,
        strategy,
        IndexMap::new(),
        IndexMap::new(),
    ));
    let names = manager.names().context("Failed to discover workflows")?;
    if names.is_empty() {
        println!("{}No workflows found in {}", WARN, manager.workflows_dir().display());
        return Ok(exit_codes::OK);
    }

    let runs: Vec<(String, String)> = names
        .iter()
        .flat_map(|name| events.iter().map(move |event| (name.clone(), event.clone())))
        .collect();

    println!(
        "{}Testing {} workflow(s) for {} event(s)",
        ROCKET,
        style(names.len()).cyan(),
        style(events.len()).cyan()
    );

    let progress = create_progress_bar(runs.len());
    let mut outcomes = Vec::with_capacity(runs.len());

    if cmd.sequential {
        for (name, event) in runs {
            progress.set_message(format!("{} ({})", name, event));
            let result = manager.run(&name, &event).await;
            progress.inc(1);
            outcomes.push((name, event, result));
        }
    } else {
        let mut set = JoinSet::new();
        for (name, event) in runs {
            let manager = manager.clone();
            set.spawn(async move {
                let result = manager.run(&name, &event).await;
                (name, event, result)
            });
        }
        while let Some(joined) = set.join_next().await {
            let outcome = joined.context("Workflow task panicked")?;
            progress.set_message(format!("{} ({})", outcome.0, outcome.1));
            progress.inc(1);
            outcomes.push(outcome);
        }
        outcomes.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    }
    progress.finish_and_clear();

    let mut failed = 0;
    for (name, event, result) in &outcomes {
        if !matches!(result, Ok(result) if !result.failed()) {
            failed += 1;
        }
        println!("{}", format_test_run(name, event, result));
    }

    println!("{}", separator());
    println!("{}Last recorded status per workflow:", INFO);
    for record in manager.engine().tracker().snapshot().await {
        println!("  {}", format_run_record(&record));
    }

    if failed > 0 {
        println!("\n{}{} run(s) failed", CROSS, style(failed).red());
        Ok(exit_codes::FAILURE)
    } else {
        println!("\n{}All runs passed", CHECK);
        Ok(exit_codes::OK)
    }
}
