//! CLI output formatting

use crate::{
    backend::{BackendError, BuildxInfo},
    core::{MatrixBinding, RunOutcome, RunResult, StepState, WorkflowError},
    execution::ExecutionEvent,
    persistence::{RunRecord, RunStatus},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over `total` workflow runs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    style("─".repeat(width)).dim().to_string()
}

fn with_binding(job: &str, binding: &MatrixBinding) -> String {
    if binding.is_empty() {
        job.to_string()
    } else {
        format!("{} ({})", job, binding.label())
    }
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { continued: true, .. } => style("FAILED (continued)").yellow().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run outcome for display
pub fn format_outcome(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Success => style("SUCCESS").green().to_string(),
        RunOutcome::Failure => style("FAILURE").red().to_string(),
        RunOutcome::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a tracked status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Unknown => style("UNKNOWN").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Failure => style("FAILURE").red().to_string(),
        RunStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn status_icon(status: RunStatus) -> &'static Emoji<'static, 'static> {
    match status {
        RunStatus::Success => &CHECK,
        RunStatus::Failure => &CROSS,
        RunStatus::Running => &SPINNER,
        RunStatus::Skipped => &SKIP,
        RunStatus::Unknown => &INFO,
    }
}

/// One line of the `test` summary
pub fn format_run_record(record: &RunRecord) -> String {
    let mut line = format!(
        "{}{} - {}",
        status_icon(record.status),
        style(&record.workflow).bold(),
        format_status(record.status)
    );
    if let Some(detail) = &record.detail {
        line.push_str(&format!(" - {}", style(detail).dim()));
    }
    line
}

/// Per-variant breakdown of a finished run
pub fn format_run_summary(result: &RunResult) -> String {
    let mut lines = Vec::new();
    for variant in &result.variants {
        lines.push(format!(
            "  {} {} ({} ms)",
            format_outcome(variant.outcome),
            style(variant.label()).bold(),
            variant.duration_ms()
        ));
        for step in &variant.steps {
            lines.push(format!(
                "    {:>2}. {} {}",
                step.index + 1,
                step.name,
                format_step_state(&step.state)
            ));
        }
    }
    lines.join("\n")
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::WorkflowStarted {
            run_id,
            workflow,
            event,
        } => format!(
            "{}Starting workflow {} for {} ({})",
            ROCKET,
            style(workflow).bold(),
            style(event).cyan(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::WorkflowSkipped { workflow, reason } => format!(
            "{}{} skipped: {}",
            SKIP,
            style(workflow).bold(),
            style(reason).dim()
        ),
        ExecutionEvent::JobStarted { job, variants } => {
            if *variants > 1 {
                format!("{}Job {} ({} variants)", INFO, style(job).bold(), variants)
            } else {
                format!("{}Job {}", INFO, style(job).bold())
            }
        }
        ExecutionEvent::JobSkipped { job, reason } => {
            format!("{}Job {}: {}", SKIP, style(job).dim(), style(reason).dim())
        }
        ExecutionEvent::VariantStarted { job, binding } => {
            format!("{}{}", SPINNER, style(with_binding(job, binding)).cyan())
        }
        ExecutionEvent::VariantSkipped {
            job,
            binding,
            reason,
        } => format!(
            "{}{} skipped: {}",
            SKIP,
            style(with_binding(job, binding)).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StepStarted { index, name, .. } => {
            format!("  {} {}", style(format!("{:>2}.", index + 1)).dim(), name)
        }
        ExecutionEvent::StepCompleted { index, name, .. } => {
            format!("  {}{}. {}", CHECK, index + 1, style(name).green())
        }
        ExecutionEvent::StepSkipped { index, name, .. } => {
            format!("  {}{}. {}", SKIP, index + 1, style(name).dim())
        }
        ExecutionEvent::StepFailed {
            index,
            name,
            error,
            continued,
            ..
        } => {
            if *continued {
                format!(
                    "  {}{}. {}: {} (continuing)",
                    WARN,
                    index + 1,
                    style(name).yellow(),
                    style(error).dim()
                )
            } else {
                format!(
                    "  {}{}. {}: {}",
                    CROSS,
                    index + 1,
                    style(name).red(),
                    style(error).dim()
                )
            }
        }
        ExecutionEvent::VariantCompleted {
            job,
            binding,
            outcome,
        } => {
            let icon = match outcome {
                RunOutcome::Success => CHECK,
                RunOutcome::Failure => CROSS,
                RunOutcome::Skipped => SKIP,
            };
            format!("{}{} {}", icon, style(with_binding(job, binding)).bold(), format_outcome(*outcome))
        }
        ExecutionEvent::WorkflowCompleted {
            run_id,
            workflow,
            outcome,
        } => {
            let outcome_str = match outcome {
                RunOutcome::Success => format!("completed {}", style("successfully").green()),
                RunOutcome::Failure => style("failed").red().to_string(),
                RunOutcome::Skipped => style("was skipped").dim().to_string(),
            };
            format!(
                "{}Workflow {} ({}) {}",
                INFO,
                style(workflow).bold(),
                style(&run_id.to_string()[..8]).dim(),
                outcome_str
            )
        }
    }
}

/// `doctor` report in console form
pub fn format_doctor_report(version: &Result<String, BackendError>, buildx: &BuildxInfo) -> String {
    let mut lines = vec!["Docker and buildx capability check:".to_string()];
    match version {
        Ok(version) => lines.push(format!("{}Docker: {}", CHECK, version)),
        Err(e) => lines.push(format!("{}Docker: {}", CROSS, style(e).red())),
    }

    if buildx.available {
        lines.push(format!(
            "{}Docker buildx: Available ({})",
            CHECK,
            buildx.version.as_deref().unwrap_or("unknown version")
        ));
        lines.push(format!("   Builders: {:?}", buildx.builders));
    } else {
        lines.push(format!("{}Docker buildx: Not available", WARN));
        lines.push("   Install with: docker buildx install".to_string());
        lines.push("   Or update to Docker Desktop 2.4.0+ / Docker CE 19.03+".to_string());
    }

    lines.push(String::new());
    lines.push(format!(
        "{}Some actions (like docker/build-push-action) may require buildx for multi-platform builds.",
        INFO
    ));
    lines.join("\n")
}

/// `doctor --json` document
pub fn doctor_json(version: &Result<String, BackendError>, buildx: &BuildxInfo) -> serde_json::Value {
    serde_json::json!({
        "docker": {
            "version": version.as_ref().ok(),
            "error": version.as_ref().err().map(|e| e.to_string()),
        },
        "buildx": buildx,
    })
}

/// One `test` result line; failure details go on an indented second line
pub fn format_test_run(name: &str, event: &str, result: &Result<RunResult, WorkflowError>) -> String {
    match result {
        Ok(result) => {
            let icon = match result.outcome {
                RunOutcome::Success => &CHECK,
                RunOutcome::Failure => &CROSS,
                RunOutcome::Skipped => &SKIP,
            };
            let mut line = format!(
                "{}{} [{}] {}",
                icon,
                style(name).bold(),
                style(event).cyan(),
                format_outcome(result.outcome)
            );
            if let (true, Some(detail)) = (result.failed(), &result.error) {
                line.push_str(&format!("\n    {}", style(detail).dim()));
            }
            line
        }
        Err(e) => format!("{}{} [{}] {}", CROSS, style(name).bold(), style(event).cyan(), style(e).red()),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}
