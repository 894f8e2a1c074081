//! Text (terminal) reporter with colors and formatting

use crate::models::AttributionEntry;
use crate::pipeline::PredictionReport;
use crate::risk::RiskCategory;
use anyhow::Result;

/// Risk band colors (ANSI escape codes)
fn category_color(category: RiskCategory) -> &'static str {
    match category {
        RiskCategory::High => "\x1b[31m",   // Red
        RiskCategory::Medium => "\x1b[33m", // Yellow
        RiskCategory::Low => "\x1b[32m",    // Green
    }
}

/// Reset ANSI color
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[91m";
const BLUE: &str = "\x1b[94m";

const BAR_WIDTH: usize = 24;

/// Render report as formatted terminal output
pub fn render(report: &PredictionReport) -> Result<String> {
    let mut out = String::new();
    let color = category_color(report.category);

    out.push_str(&format!("\n{BOLD}Churn Prediction{RESET}\n"));
    out.push_str(&format!(
        "{DIM}──────────────────────────────────────{RESET}\n"
    ));
    if !report.identity.name.is_empty() || !report.identity.customer_id.is_empty() {
        out.push_str(&format!(
            "Customer: {BOLD}{}{RESET}  {DIM}({}){RESET}\n",
            display_or_dash(&report.identity.name),
            display_or_dash(&report.identity.customer_id)
        ));
    }
    out.push_str(&format!(
        "Churn probability: {BOLD}{:.2}%{RESET}\n",
        report.probability * 100.0
    ));
    out.push_str(&format!(
        "Risk: {color}{BOLD}{}{RESET}  {color}{}{RESET}\n\n",
        report.category, report.label
    ));

    out.push_str(&format!("{BOLD}TOP REASONS{RESET}"));
    match &report.attributions {
        Some(entries) if !entries.is_empty() => {
            if let Some(base) = report.base_value {
                out.push_str(&format!("  {DIM}(baseline log-odds {base:+.3}){RESET}"));
            }
            out.push('\n');
            render_attributions(&mut out, entries);
        }
        _ => {
            out.push('\n');
            let note = report
                .explanation_note
                .as_deref()
                .unwrap_or("no attributions available");
            out.push_str(&format!("  {DIM}{note}{RESET}\n"));
        }
    }

    if !report.warnings.is_empty() {
        out.push_str(&format!("\n{BOLD}WARNINGS{RESET}\n"));
        for warning in &report.warnings {
            out.push_str(&format!("  \x1b[33m!{RESET} {warning}\n"));
        }
    }

    out.push('\n');
    if report.should_alert {
        out.push_str(&format!(
            "{color}{BOLD}ALERT{RESET} customer flagged for retention follow-up\n"
        ));
    } else {
        out.push_str(&format!("{DIM}No alert raised{RESET}\n"));
    }

    Ok(out)
}

/// Signed contributions with a bar scaled to the largest magnitude
fn render_attributions(out: &mut String, entries: &[AttributionEntry]) {
    let name_width = entries.iter().map(|e| e.feature.len()).max().unwrap_or(0);
    let max_abs = entries
        .iter()
        .map(|e| e.contribution.abs())
        .fold(0.0_f64, f64::max);

    for entry in entries {
        let (bar_color, glyph) = if entry.contribution >= 0.0 {
            (RED, '▲')
        } else {
            (BLUE, '▼')
        };
        let len = if max_abs > 0.0 {
            ((entry.contribution.abs() / max_abs) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "  {glyph} {:<name_width$}  {:+.3}  {bar_color}{}{RESET}\n",
            entry.feature,
            entry.contribution,
            "█".repeat(len.max(1)),
        ));
    }
}

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_text_render_contains_summary() {
        let out = render(&test_report()).unwrap();
        assert!(out.contains("Churn Prediction"));
        assert!(out.contains("81.76%"));
        assert!(out.contains("HIGH"));
        assert!(out.contains("Highly Likely to Churn"));
        assert!(out.contains("ALERT"));
    }

    #[test]
    fn test_attributions_in_rank_order() {
        let out = render(&test_report()).unwrap();
        let tenure = out.find("tenure").unwrap();
        let contract = out.find("Contract_Month-to-month").unwrap();
        let security = out.find("OnlineSecurity_Yes").unwrap();
        assert!(tenure < contract && contract < security);
        assert!(out.contains("+0.874"));
        assert!(out.contains("-0.210"));
    }

    #[test]
    fn test_unexplained_report_shows_note() {
        let mut report = test_report();
        report.attributions = None;
        report.explanation_note = Some("no tree structure is exposed".into());
        let out = render(&report).unwrap();
        assert!(out.contains("no tree structure is exposed"));
    }

    #[test]
    fn test_low_risk_has_no_alert_line() {
        let mut report = test_report();
        report.probability = 0.12;
        report.category = RiskCategory::Low;
        report.should_alert = false;
        report.alert = None;
        let out = render(&report).unwrap();
        assert!(out.contains("No alert raised"));
        assert!(!out.contains("ALERT"));
    }
}
