//! Alert payload and its plain-text rendering
//!
//! A payload is built only when the risk policy says to alert. It carries
//! everything a sink needs; sinks never look back into the prediction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use uuid::Uuid;

use crate::models::{AttributionEntry, CustomerIdentity};
use crate::risk::RiskCategory;

pub const ALERT_SUBJECT: &str = "⚠️ Customer High Churn Risk Alert";

/// One churn alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub identity: CustomerIdentity,
    pub probability: f64,
    pub category: RiskCategory,
    pub label: String,
    pub attributions: Vec<AttributionEntry>,
    /// Why `attributions` is empty, when the model could not be explained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_note: Option<String>,
}

impl AlertPayload {
    pub fn new(
        identity: CustomerIdentity,
        probability: f64,
        category: RiskCategory,
        attributions: Vec<AttributionEntry>,
        explanation_note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            identity,
            probability,
            category,
            label: category.label().to_string(),
            attributions,
            explanation_note,
        }
    }

    pub fn subject(&self) -> &'static str {
        ALERT_SUBJECT
    }

    /// Plain-text message body
    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "🚨 Customer Churn Alert 🚨");
        let _ = writeln!(out);
        let _ = writeln!(out, "Customer Name: {}", self.identity.name);
        let _ = writeln!(out, "Customer ID: {}", self.identity.customer_id);
        let _ = writeln!(out, "Predicted Probability: {:.2}%", self.probability * 100.0);
        let _ = writeln!(out, "Risk Category: HIGH RISK");
        let _ = writeln!(out, "Risk Band: {} ({})", self.category, self.label);
        let _ = writeln!(out);
        let _ = write!(out, "Top Reasons for Churn (SHAP-driven):");

        if self.attributions.is_empty() {
            let note = self
                .explanation_note
                .as_deref()
                .unwrap_or("no attributions available");
            let _ = write!(out, "\n{note}");
        } else {
            for entry in &self.attributions {
                let _ = write!(out, "\n{}: {:.3}", entry.feature, entry.contribution);
            }
        }
        out
    }
}
