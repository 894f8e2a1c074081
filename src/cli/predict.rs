//! Predict command - score and explain one customer

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

use super::{build_predictor, emit, finish_dispatcher, parse_non_negative, start_dispatcher};
use crate::config::UserConfig;
use crate::models::{CustomerIdentity, CustomerRequest, RawRecord};
use crate::reporters::{self, OutputFormat};

/// One flag per customer field, preset to the operator form's defaults
#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Customer fields")]
pub struct FieldArgs {
    #[arg(long, default_value = "Male")]
    pub gender: String,

    /// 1 if the customer is a senior citizen
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub senior_citizen: u8,

    #[arg(long, default_value = "Yes")]
    pub partner: String,

    #[arg(long, default_value = "Yes")]
    pub dependents: String,

    /// Months as a customer
    #[arg(long, default_value_t = 0)]
    pub tenure: u32,

    #[arg(long, default_value = "Yes")]
    pub phone_service: String,

    /// Yes, No, "No phone service"
    #[arg(long, default_value = "Yes")]
    pub multiple_lines: String,

    /// DSL, "Fiber optic", No
    #[arg(long, default_value = "DSL")]
    pub internet_service: String,

    /// Yes, No, "No internet service" (same for the add-on flags below)
    #[arg(long, default_value = "Yes")]
    pub online_security: String,

    #[arg(long, default_value = "Yes")]
    pub online_backup: String,

    #[arg(long, default_value = "Yes")]
    pub device_protection: String,

    #[arg(long, default_value = "Yes")]
    pub tech_support: String,

    #[arg(long, default_value = "Yes")]
    pub streaming_tv: String,

    #[arg(long, default_value = "Yes")]
    pub streaming_movies: String,

    /// "Month-to-month", "One year", "Two year"
    #[arg(long, default_value = "Month-to-month")]
    pub contract: String,

    #[arg(long, default_value = "Yes")]
    pub paperless_billing: String,

    /// "Electronic check", "Mailed check", "Bank transfer (automatic)", "Credit card (automatic)"
    #[arg(long, default_value = "Electronic check")]
    pub payment_method: String,

    #[arg(long, default_value_t = 0.0, value_parser = parse_non_negative)]
    pub monthly_charges: f64,

    #[arg(long, default_value_t = 0.0, value_parser = parse_non_negative)]
    pub total_charges: f64,
}

impl FieldArgs {
    /// Raw record keyed by the model's field names
    pub fn to_record(&self) -> RawRecord {
        RawRecord::new()
            .with("gender", self.gender.as_str())
            .with("SeniorCitizen", i64::from(self.senior_citizen))
            .with("Partner", self.partner.as_str())
            .with("Dependents", self.dependents.as_str())
            .with("tenure", i64::from(self.tenure))
            .with("PhoneService", self.phone_service.as_str())
            .with("MultipleLines", self.multiple_lines.as_str())
            .with("InternetService", self.internet_service.as_str())
            .with("OnlineSecurity", self.online_security.as_str())
            .with("OnlineBackup", self.online_backup.as_str())
            .with("DeviceProtection", self.device_protection.as_str())
            .with("TechSupport", self.tech_support.as_str())
            .with("StreamingTV", self.streaming_tv.as_str())
            .with("StreamingMovies", self.streaming_movies.as_str())
            .with("Contract", self.contract.as_str())
            .with("PaperlessBilling", self.paperless_billing.as_str())
            .with("PaymentMethod", self.payment_method.as_str())
            .with("MonthlyCharges", self.monthly_charges)
            .with("TotalCharges", self.total_charges)
    }
}

pub(super) struct PredictOptions {
    pub name: Option<String>,
    pub customer_id: Option<String>,
    pub input: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub format: OutputFormat,
    pub no_alert: bool,
}

pub(super) fn run(config: &UserConfig, options: PredictOptions, fields: &FieldArgs) -> Result<()> {
    let request = build_request(&options, fields)?;
    let predictor = build_predictor(config, options.top_k)?;

    let report = predictor.predict(&request).with_context(|| {
        format!(
            "Failed to score customer '{}'",
            display_id(&request.identity)
        )
    })?;

    let rendered = reporters::report_with_format(&report, options.format)?;
    emit(&rendered, options.format, None)?;

    let Some(alert) = report.alert else {
        return Ok(());
    };
    if options.no_alert {
        eprintln!("{} alert computed but not sent (--no-alert)", style("○").dim());
        return Ok(());
    }
    if let Some(dispatcher) = start_dispatcher(config, config.queue_capacity()) {
        dispatcher.dispatch(alert);
        let stats = finish_dispatcher(dispatcher, config, 1);
        if stats.delivered > 0 {
            eprintln!(
                "{} alert sent via {}",
                style("✓").green(),
                config.notify_channel()
            );
        }
    }
    Ok(())
}

/// Request from `--input` or from the field flags; `--name`/`--customer-id`
/// override identity from either source
fn build_request(options: &PredictOptions, fields: &FieldArgs) -> Result<CustomerRequest> {
    let mut request = match &options.input {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<CustomerRequest>(&content)
                .with_context(|| format!("Failed to parse request {}", path.display()))?
        }
        None => CustomerRequest {
            identity: CustomerIdentity::default(),
            attributes: fields.to_record(),
        },
    };
    if let Some(name) = &options.name {
        request.identity.name = name.clone();
    }
    if let Some(id) = &options.customer_id {
        request.identity.customer_id = id.clone();
    }
    Ok(request)
}

fn display_id(identity: &CustomerIdentity) -> &str {
    if identity.customer_id.is_empty() {
        "<unnamed>"
    } else {
        &identity.customer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::schema::InputContract;
    use clap::Parser;

    fn parse_fields(args: &[&str]) -> FieldArgs {
        let mut argv = vec!["churnlens", "predict"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Predict { fields, .. } => fields,
            other => panic!("unexpected command {other:?}"),
        }
    }

    fn options(input: Option<PathBuf>) -> PredictOptions {
        PredictOptions {
            name: None,
            customer_id: Some("C-42".into()),
            input,
            top_k: None,
            format: OutputFormat::Json,
            no_alert: true,
        }
    }

    #[test]
    fn test_flag_defaults_match_form_defaults() {
        let record = parse_fields(&[]).to_record();
        assert_eq!(record, InputContract::telco().default_record());
    }

    #[test]
    fn test_flags_map_to_field_names() {
        let record = parse_fields(&[
            "--contract",
            "Two year",
            "--tenure",
            "60",
            "--internet-service",
            "Fiber optic",
            "--monthly-charges",
            "90.5",
        ])
        .to_record();
        assert_eq!(record.get("Contract").and_then(|v| v.as_text()), Some("Two year"));
        assert_eq!(record.get("tenure").and_then(|v| v.as_f64()), Some(60.0));
        assert_eq!(record.get("MonthlyCharges").and_then(|v| v.as_f64()), Some(90.5));
        assert_eq!(
            record.get("InternetService").and_then(|v| v.as_text()),
            Some("Fiber optic")
        );
    }

    #[test]
    fn test_input_file_with_identity_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(
            &path,
            r#"{"name": "Ada", "customer_id": "X-1", "attributes": {"tenure": 3}}"#,
        )
        .unwrap();

        let request = build_request(&options(Some(path)), &parse_fields(&[])).unwrap();
        assert_eq!(request.identity.name, "Ada");
        assert_eq!(request.identity.customer_id, "C-42");
        assert_eq!(request.attributes.len(), 1);
    }

    #[test]
    fn test_malformed_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = build_request(&options(Some(path)), &parse_fields(&[])).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse request"));
    }
}
