//! Batch command - score a JSONL file of requests in parallel

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::{build_predictor, emit, finish_dispatcher, start_dispatcher};
use crate::config::UserConfig;
use crate::models::CustomerRequest;
use crate::pipeline::{PredictionReport, Predictor};
use crate::reporters::{self, OutputFormat};

/// Result for one input line (1-based)
struct LineOutcome {
    line: usize,
    result: Result<PredictionReport>,
}

pub(super) fn run(
    config: &UserConfig,
    input: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    top_k: Option<usize>,
    no_alert: bool,
) -> Result<()> {
    let content = read_input(input)?;
    let predictor = build_predictor(config, top_k)?;

    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let bar = ProgressBar::new(lines.len() as u64);
    bar.set_style(create_bar_style());
    bar.set_message("Scoring customers...");

    let outcomes: Vec<LineOutcome> = lines
        .par_iter()
        .map(|&(line, text)| {
            let result = score_line(&predictor, text);
            bar.inc(1);
            LineOutcome { line, result }
        })
        .collect();
    bar.finish_and_clear();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            warn!(line = outcome.line, "request failed: {e:#}");
        }
    }

    let rendered = render_outcomes(&outcomes, format)?;
    emit(&rendered, format, output)?;

    let alerts: Vec<_> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .filter_map(|r| r.alert.clone())
        .collect();
    let alert_count = alerts.len();

    if !alerts.is_empty() && !no_alert {
        let capacity = alerts.len().max(config.queue_capacity());
        if let Some(dispatcher) = start_dispatcher(config, capacity) {
            for alert in alerts {
                dispatcher.dispatch(alert);
            }
            finish_dispatcher(dispatcher, config, alert_count);
        }
    }

    eprintln!(
        "{} Scored {} of {} request(s), {} alert(s){}",
        if failed == 0 {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        outcomes.len() - failed,
        outcomes.len(),
        alert_count,
        if no_alert && alert_count > 0 {
            " (not sent, --no-alert)"
        } else {
            ""
        }
    );

    if failed > 0 {
        anyhow::bail!("{failed} request(s) failed; see the error entries in the output");
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read requests from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

fn score_line(predictor: &Predictor, text: &str) -> Result<PredictionReport> {
    let request: CustomerRequest =
        serde_json::from_str(text).context("Invalid request JSON")?;
    let report = predictor.predict(&request).with_context(|| {
        format!("Failed to score customer '{}'", request.identity.customer_id)
    })?;
    Ok(report)
}

/// JSON: one compact object per line, errors as `{"line", "error"}`.
/// Text: each report in turn, errors inline.
fn render_outcomes(outcomes: &[LineOutcome], format: OutputFormat) -> Result<String> {
    let mut out = String::new();
    for outcome in outcomes {
        match (&outcome.result, format) {
            (Ok(report), OutputFormat::Json) => {
                out.push_str(&reporters::render_compact(report)?);
                out.push('\n');
            }
            (Ok(report), OutputFormat::Text) => {
                out.push_str(&format!("\x1b[2mline {}\x1b[0m", outcome.line));
                out.push_str(&reporters::report_with_format(report, OutputFormat::Text)?);
            }
            (Err(e), OutputFormat::Json) => {
                let entry = serde_json::json!({
                    "line": outcome.line,
                    "error": format!("{e:#}"),
                });
                out.push_str(&serde_json::to_string(&entry)?);
                out.push('\n');
            }
            (Err(e), OutputFormat::Text) => {
                out.push_str(&format!("\n\x1b[31mline {}: {e:#}\x1b[0m\n", outcome.line));
            }
        }
    }
    Ok(out)
}

/// Create bar progress style
fn create_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}
