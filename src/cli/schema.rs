//! Schema command - show the model's columns and the raw input fields

use anyhow::Result;
use serde::Serialize;

use super::{emit, load_bundle};
use crate::config::UserConfig;
use crate::reporters::OutputFormat;
use crate::schema::{FieldKind, InputContract};

#[derive(Serialize)]
struct SchemaView<'a> {
    model_kind: String,
    model_version: Option<&'a str>,
    source: String,
    fingerprint: &'a str,
    columns: &'a [String],
    fields: Vec<FieldView>,
}

#[derive(Serialize)]
struct FieldView {
    name: &'static str,
    kind: &'static str,
    allowed: &'static [&'static str],
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Categorical => "categorical",
        FieldKind::Integer => "integer",
        FieldKind::Float => "float",
    }
}

pub(super) fn run(config: &UserConfig, format: OutputFormat) -> Result<()> {
    let bundle = load_bundle(config)?;
    let contract = InputContract::telco();
    let schema = bundle.schema();

    let view = SchemaView {
        model_kind: bundle.kind().to_string(),
        model_version: bundle.version(),
        source: bundle.source().to_string(),
        fingerprint: schema.fingerprint(),
        columns: schema.columns(),
        fields: contract
            .fields()
            .iter()
            .map(|f| FieldView {
                name: f.name,
                kind: kind_name(f.kind),
                allowed: f.allowed,
            })
            .collect(),
    };

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&view)?,
        OutputFormat::Text => render_text(&view),
    };
    emit(&rendered, format, None)
}

fn render_text(view: &SchemaView<'_>) -> String {
    const BOLD: &str = "\x1b[1m";
    const DIM: &str = "\x1b[2m";
    const RESET: &str = "\x1b[0m";

    let mut out = String::new();
    out.push_str(&format!(
        "\n{BOLD}Model{RESET}  {} {}  {DIM}({}){RESET}\n",
        view.model_kind,
        view.model_version.unwrap_or("unversioned"),
        view.source
    ));
    out.push_str(&format!("Fingerprint: {}\n\n", view.fingerprint));

    out.push_str(&format!(
        "{BOLD}FEATURE COLUMNS{RESET} ({})\n",
        view.columns.len()
    ));
    for (i, column) in view.columns.iter().enumerate() {
        out.push_str(&format!("  {:>3}  {column}\n", i + 1));
    }

    out.push_str(&format!(
        "\n{BOLD}INPUT FIELDS{RESET} ({})\n",
        view.fields.len()
    ));
    let width = view.fields.iter().map(|f| f.name.len()).max().unwrap_or(0);
    for field in &view.fields {
        let allowed = if field.allowed.is_empty() {
            ">= 0".to_string()
        } else {
            field.allowed.join(" | ")
        };
        out.push_str(&format!(
            "  {:<width$}  {DIM}{:<11}{RESET}  {allowed}\n",
            field.name, field.kind
        ));
    }
    out
}
