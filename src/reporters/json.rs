//! JSON reporter
//!
//! Pretty JSON for a single prediction; compact single-line JSON for
//! batch output (one report per line).

use crate::pipeline::PredictionReport;
use anyhow::Result;

/// Render report as JSON
pub fn render(report: &PredictionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render report as compact JSON (single line)
pub fn render_compact(report: &PredictionReport) -> Result<String> {
    Ok(serde_json::to_string(report)?)
}
