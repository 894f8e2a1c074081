//! CLI command definitions and handlers

mod batch;
mod doctor;
mod predict;
mod schema;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::classifier::ModelBundle;
use crate::config::{UserConfig, ENV_WEBHOOK_TOKEN, PROJECT_CONFIG_FILE};
use crate::notify::{build_sink, AlertDispatcher, DeliveryStats};
use crate::pipeline::Predictor;
use crate::reporters::OutputFormat;
use crate::schema::InputContract;

pub use predict::FieldArgs;

/// Parse a non-negative, finite number
fn parse_non_negative(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !v.is_finite() {
        Err("value must be finite".to_string())
    } else if v < 0.0 {
        Err("value cannot be negative".to_string())
    } else {
        Ok(v)
    }
}

/// churnlens - explainable customer churn scoring
#[derive(Parser, Debug)]
#[command(name = "churnlens")]
#[command(
    version,
    about = "Score customer churn risk, explain it with TreeSHAP, and alert on at-risk customers",
    after_help = "\
Examples:
  churnlens predict --contract \"Two year\" --tenure 60     Score one customer from flags
  churnlens predict --input customer.json --format json   Score a JSON request
  churnlens batch customers.jsonl -o scored.jsonl         Score a JSONL file in parallel
  churnlens schema                                        Show model columns and input fields
  churnlens doctor                                        Check model bundle and alert channel"
)]
pub struct Cli {
    /// Config file (default: ./churnlens.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model bundle directory (overrides config and CHURNLENS_MODEL_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score one customer and explain the prediction
    #[command(after_help = "\
Examples:
  churnlens predict                                         Form defaults
  churnlens predict --tenure 1 --internet-service \"Fiber optic\" --monthly-charges 90
  churnlens predict --input customer.json --format json     JSON request file
  churnlens predict --no-alert                              Never deliver an alert")]
    Predict {
        /// Customer name (display only)
        #[arg(long)]
        name: Option<String>,

        /// Customer ID (display only)
        #[arg(long)]
        customer_id: Option<String>,

        /// JSON request file ({"name", "customer_id", "attributes": {...}}); field flags are ignored
        #[arg(long, short = 'i', value_name = "FILE")]
        input: Option<PathBuf>,

        /// Number of top contributors to show (default: config, 5)
        #[arg(long)]
        top_k: Option<usize>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Compute alerts but do not deliver them
        #[arg(long)]
        no_alert: bool,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Score every request in a JSONL file (one request per line)
    Batch {
        /// JSONL file; `-` reads stdin
        input: PathBuf,

        /// Output format: json (one report per line), text
        #[arg(long, short = 'f', default_value = "json", value_parser = ["json", "text"])]
        format: String,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Number of top contributors per report (default: config, 5)
        #[arg(long)]
        top_k: Option<usize>,

        /// Compute alerts but do not deliver them
        #[arg(long)]
        no_alert: bool,
    },

    /// Show the feature schema, its fingerprint and the input fields
    Schema {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Check the model bundle, risk policy and alert channel
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Initialize user config file with example settings
    Init,
    /// Show resolved config and paths
    Show,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Predict {
            ref name,
            ref customer_id,
            ref input,
            top_k,
            ref format,
            no_alert,
            ref fields,
        } => {
            let config = load_config(&cli)?;
            predict::run(
                &config,
                predict::PredictOptions {
                    name: name.clone(),
                    customer_id: customer_id.clone(),
                    input: input.clone(),
                    top_k,
                    format: format.parse()?,
                    no_alert,
                },
                fields,
            )
        }

        Commands::Batch {
            ref input,
            ref format,
            ref output,
            top_k,
            no_alert,
        } => {
            let config = load_config(&cli)?;
            batch::run(
                &config,
                input,
                format.parse()?,
                output.as_deref(),
                top_k,
                no_alert,
            )
        }

        Commands::Schema { ref format } => {
            let config = load_config(&cli)?;
            schema::run(&config, format.parse()?)
        }

        Commands::Doctor => {
            let config = load_config(&cli)?;
            doctor::run(&config)
        }

        Commands::Config { ref action } => run_config_action(&cli, action),
    }
}

/// Resolve configuration; `--model-dir` wins over every other source
fn load_config(cli: &Cli) -> Result<UserConfig> {
    let mut config = UserConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.model_dir {
        config.model.dir = Some(dir.clone());
    }
    Ok(config)
}

fn load_bundle(config: &UserConfig) -> Result<ModelBundle> {
    ModelBundle::load_or_seed(config.model_dir()).with_context(|| match config.model_dir() {
        Some(dir) => format!("Failed to load model bundle from {}", dir.display()),
        None => "Failed to load the embedded seed model".to_string(),
    })
}

/// Bundle + configured policy and explanation size
fn build_predictor(config: &UserConfig, top_k: Option<usize>) -> Result<Predictor> {
    let bundle = load_bundle(config)?;
    let policy = config.risk_policy()?;
    Ok(Predictor::new(
        &bundle,
        InputContract::telco(),
        policy,
        top_k.unwrap_or_else(|| config.top_k()),
    ))
}

/// Start the configured alert channel with room for `capacity` queued alerts.
///
/// A misconfigured channel only disables delivery; predictions still run.
fn start_dispatcher(config: &UserConfig, capacity: usize) -> Option<AlertDispatcher> {
    let sink = match build_sink(config) {
        Ok(Some(sink)) => sink,
        Ok(None) => return None,
        Err(e) => {
            warn!("alert delivery disabled: {e}");
            eprintln!("{} alert delivery disabled: {}", style("!").yellow(), e);
            return None;
        }
    };
    match AlertDispatcher::spawn(sink, capacity, config.retry_policy()) {
        Ok(dispatcher) => Some(dispatcher),
        Err(e) => {
            warn!("failed to start alert dispatcher: {e}");
            None
        }
    }
}

/// Shutdown wait covering every attempt and backoff for `alerts` alerts
fn delivery_timeout(config: &UserConfig, alerts: usize) -> Duration {
    config
        .retry_policy()
        .delivery_budget(config.notify_timeout())
        .saturating_mul(u32::try_from(alerts.max(1)).unwrap_or(u32::MAX))
}

/// Drain the dispatcher and tell the operator about undelivered alerts
fn finish_dispatcher(dispatcher: AlertDispatcher, config: &UserConfig, alerts: usize) -> DeliveryStats {
    let stats = dispatcher.shutdown(delivery_timeout(config, alerts));
    if stats.undelivered() > 0 {
        eprintln!(
            "{} {} alert(s) not delivered via {} (see log)",
            style("!").yellow(),
            stats.undelivered(),
            config.notify_channel()
        );
    }
    stats
}

/// Write rendered output to a file or stdout, stripping colors when stdout
/// is not a terminal
fn emit(rendered: &str, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let plain = format == OutputFormat::Json || output.is_some() || !console::colors_enabled();
    let text = if plain {
        console::strip_ansi_codes(rendered).into_owned()
    } else {
        rendered.to_string()
    };
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{text}");
            if !text.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}

fn run_config_action(cli: &Cli, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = UserConfig::init_user_config()?;
            println!("{} Config initialized at: {}", style("✓").green(), path.display());
            println!("\nSet the webhook token via environment only:");
            println!("  export {ENV_WEBHOOK_TOKEN}=\"...\"");
            Ok(())
        }
        ConfigAction::Show => show_config(cli),
    }
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    println!("Config paths:");
    if let Some(user_path) = UserConfig::user_config_path() {
        let status = if user_path.exists() { "✓" } else { "(not found)" };
        println!("  User:    {} {}", user_path.display(), status);
    }
    match &cli.config {
        Some(path) => println!("  Explicit: {}", path.display()),
        None => {
            let status = if Path::new(PROJECT_CONFIG_FILE).exists() {
                "✓"
            } else {
                "(not found)"
            };
            println!("  Project: ./{PROJECT_CONFIG_FILE} {status}");
        }
    }
    println!();
    println!("{}", config.to_toml()?);
    let token_status = if config.webhook_token().is_some() {
        "set (redacted)"
    } else {
        "not set"
    };
    println!("{ENV_WEBHOOK_TOKEN}: {token_status}");
    Ok(())
}
