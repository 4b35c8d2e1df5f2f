//! `baton process`: run workflow documents in order.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use baton_core::normalize::{normalize_input, normalize_string_slice};
use baton_core::workflow::definition::{WorkflowPlan, load_workflow_file};
use baton_core::workflow::executor::{RunReport, WorkflowProcessor};
use baton_types::workflow::{NO_INPUT, Step};

use crate::state::AppState;

/// Read piped stdin once. Returns `None` for a terminal or empty input.
fn read_piped_stdin() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    stdin
        .lock()
        .read_to_string(&mut buf)
        .context("failed to read piped stdin")?;
    Ok((!buf.is_empty()).then_some(buf))
}

/// Run every document, continuing past failures.
pub async fn handle_process(state: &AppState, files: &[PathBuf], json: bool) -> Result<()> {
    let initial = read_piped_stdin()?;
    if let Some(piped) = &initial {
        tracing::debug!(bytes = piped.len(), "using piped stdin as initial input");
    }

    let services = state.step_services(&state.cwd).await?;
    let processor = WorkflowProcessor::new(services);

    let mut failed = 0usize;
    for file in files {
        let outcome = run_document(&processor, file, &state.cwd, initial.clone(), json).await;
        if let Err(err) = &outcome {
            failed += 1;
            tracing::error!(file = %file.display(), error = %err, "workflow failed");
            if !json {
                eprintln!(
                    "  {} {}: {err:#}",
                    style("x").red().bold(),
                    style(file.display()).cyan()
                );
            }
        }
        if json {
            println!("{}", serde_json::to_string_pretty(&json_result(file, &outcome))?);
        }
    }

    if failed > 0 {
        bail!("{failed} of {} workflow documents failed", files.len());
    }
    Ok(())
}

async fn run_document(
    processor: &WorkflowProcessor,
    file: &Path,
    base_dir: &Path,
    initial: Option<String>,
    json: bool,
) -> Result<RunReport> {
    let plan = load_workflow_file(file, base_dir)
        .with_context(|| format!("failed to load {}", file.display()))?;

    if !json {
        println!();
        println!(
            "  {} Processing {}",
            style(">").blue().bold(),
            style(file.display()).cyan()
        );
        println!("{}", summary_table(&plan));
        println!();
    }

    let report = processor
        .run(&plan, initial)
        .await
        .with_context(|| format!("failed to run {}", file.display()))?;

    if !json {
        let total: u64 = report.metrics.iter().map(|m| m.metrics.total_ms).sum();
        println!(
            "  {} {} steps in {}ms (run {})",
            style("*").green().bold(),
            report.metrics.len(),
            total,
            style(report.run_id).dim()
        );
    }
    Ok(report)
}

fn json_result(file: &Path, outcome: &Result<RunReport>) -> serde_json::Value {
    match outcome {
        Ok(report) => serde_json::json!({
            "file": file.display().to_string(),
            "status": "ok",
            "run_id": report.run_id,
            "final_output": report.final_output,
            "metrics": report.metrics,
        }),
        Err(err) => serde_json::json!({
            "file": file.display().to_string(),
            "status": "error",
            "error": format!("{err:#}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Configuration summary
// ---------------------------------------------------------------------------

const COLUMNS: [&str; 6] = ["Step", "Input", "Model", "Action", "Output", "Next Action"];

/// One summary row per main-sequence step, group members prefixed by group.
fn summary_rows(plan: &WorkflowPlan) -> Vec<[String; 6]> {
    let mut rows: Vec<[String; 6]> = plan.steps().map(|step| step_row(step, None)).collect();
    for (group, members) in plan.parallel_groups() {
        rows.extend(members.iter().map(|step| step_row(step, Some(group))));
    }
    rows.extend(
        plan.defer_table()
            .iter()
            .map(|step| step_row(step, Some("defer"))),
    );
    rows
}

fn step_row(step: &Step, prefix: Option<&str>) -> [String; 6] {
    let config = &step.config;
    let name = match prefix {
        Some(prefix) => format!("{prefix}/{}", step.name),
        None => step.name.clone(),
    };

    let inputs = normalize_input(config.input.as_ref());
    let input = if inputs.first().is_some_and(|i| i == NO_INPUT) {
        String::new()
    } else {
        inputs.join(", ")
    };

    let (model, action, output) = if let Some(generate) = &config.generate {
        (
            generate.model.clone().unwrap_or_default(),
            generate.action.clone(),
            generate.output.clone(),
        )
    } else if let Some(process) = &config.process {
        (
            String::new(),
            format!("run {}", process.workflow_file),
            normalize_string_slice(config.output.as_ref()).join(", "),
        )
    } else {
        (
            normalize_string_slice(config.model.as_ref()).join(", "),
            normalize_string_slice(config.action.as_ref()).join(" / "),
            normalize_string_slice(config.output.as_ref()).join(", "),
        )
    };

    let next = normalize_string_slice(config.next_action.as_ref()).join(" / ");
    [name, input, model, action, output, next]
}

fn summary_table(plan: &WorkflowPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            COLUMNS
                .iter()
                .map(|c| Cell::new(c).fg(Color::White))
                .collect::<Vec<_>>(),
        );

    for row in summary_rows(plan) {
        let [name, input, model, action, output, next] = row;
        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan),
            Cell::new(input),
            Cell::new(model).fg(Color::Yellow),
            Cell::new(truncate(&action, 60)),
            Cell::new(output).fg(Color::Green),
            Cell::new(truncate(&next, 40)).fg(Color::DarkGrey),
        ]);
    }
    table
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
