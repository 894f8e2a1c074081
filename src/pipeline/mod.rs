//! Prediction pipeline
//!
//! Orchestrates one scoring request:
//! 1. Check the raw record against the input contract (warnings only)
//! 2. Encode it against the bundle's feature schema
//! 3. Score it with the classifier
//! 4. Explain it (degrades to "no explanation" for unsupported models)
//! 5. Apply the risk policy and emit an alert event when it says so
//!
//! The predictor never delivers alerts itself; the event rides along in the
//! report and the caller decides where it goes.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alert::AlertPayload;
use crate::classifier::{Classifier, ModelBundle};
use crate::encoder::Encoder;
use crate::error::ChurnResult;
use crate::explain::Explainer;
use crate::models::{AttributionEntry, CustomerIdentity, CustomerRequest};
use crate::risk::{RiskCategory, RiskPolicy};
use crate::schema::InputContract;

/// Everything known about one scored customer
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    #[serde(flatten)]
    pub identity: CustomerIdentity,
    pub probability: f64,
    pub category: RiskCategory,
    pub label: String,
    pub should_alert: bool,
    /// Model expectation in margin space, when explained
    pub base_value: Option<f64>,
    /// Top contributors; `None` when the model cannot be explained
    pub attributions: Option<Vec<AttributionEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_note: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub model_kind: String,
    pub schema_fingerprint: String,
    /// Alert event for the dispatcher
    #[serde(skip)]
    pub alert: Option<AlertPayload>,
}

/// Stateless scorer built from an explicitly loaded bundle
pub struct Predictor {
    encoder: Encoder,
    classifier: Arc<dyn Classifier>,
    explainer: Explainer,
    policy: RiskPolicy,
    top_k: usize,
}

impl Predictor {
    pub fn new(bundle: &ModelBundle, contract: InputContract, policy: RiskPolicy, top_k: usize) -> Self {
        Self {
            encoder: Encoder::new(bundle.schema().clone(), contract),
            classifier: bundle.classifier(),
            explainer: Explainer::new(bundle.schema().clone()),
            policy,
            top_k,
        }
    }

    /// Assemble from parts (test doubles, alternative classifiers)
    pub fn from_parts(
        encoder: Encoder,
        classifier: Arc<dyn Classifier>,
        explainer: Explainer,
        policy: RiskPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            encoder,
            classifier,
            explainer,
            policy,
            top_k,
        }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score one customer.
    ///
    /// Encoding and scoring errors are returned. An unexplainable model is
    /// not an error: the report carries the probability and a note instead.
    pub fn predict(&self, request: &CustomerRequest) -> ChurnResult<PredictionReport> {
        let warnings: Vec<String> = self
            .encoder
            .contract()
            .check(&request.attributes)
            .into_iter()
            .map(|w| {
                warn!(customer_id = %request.identity.customer_id, "{w}");
                w.to_string()
            })
            .collect();

        let vector = self.encoder.encode(&request.attributes)?;
        let probability = self.classifier.predict_probability(&vector)?;

        let (base_value, attributions, explanation_note) =
            match self.explainer.explain_full(self.classifier.as_ref(), &vector) {
                Ok(explanation) => (
                    Some(explanation.base_value),
                    Some(explanation.top(self.top_k).to_vec()),
                    None,
                ),
                Err(e) if e.is_unsupported_model() => {
                    debug!("prediction without explanation: {e}");
                    (None, None, Some(e.to_string()))
                }
                Err(e) => return Err(e),
            };

        let category = self.policy.categorize(probability);
        let should_alert = self.policy.should_alert(probability);

        let alert = should_alert.then(|| {
            AlertPayload::new(
                request.identity.clone(),
                probability,
                category,
                attributions.clone().unwrap_or_default(),
                explanation_note.clone(),
            )
        });

        debug!(
            customer_id = %request.identity.customer_id,
            probability,
            %category,
            should_alert,
            "scored customer"
        );

        Ok(PredictionReport {
            identity: request.identity.clone(),
            probability,
            category,
            label: category.label().to_string(),
            should_alert,
            base_value,
            attributions,
            explanation_note,
            warnings,
            model_kind: self.classifier.kind().to_string(),
            schema_fingerprint: vector.schema_fingerprint().to_string(),
            alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChurnError;
    use crate::models::{EncodedVector, RawRecord};
    use crate::schema::FeatureSchema;

    /// Constant-probability classifier with no tree view
    struct FixedClassifier {
        probability: f64,
        schema: FeatureSchema,
    }

    impl Classifier for FixedClassifier {
        fn kind(&self) -> &'static str {
            "fixed"
        }
        fn feature_count(&self) -> usize {
            self.schema.len()
        }
        fn schema_fingerprint(&self) -> &str {
            self.schema.fingerprint()
        }
        fn predict_probability(&self, _vector: &EncodedVector) -> ChurnResult<f64> {
            Ok(self.probability)
        }
    }

    fn fixed_predictor(probability: f64) -> Predictor {
        let schema = FeatureSchema::new(["tenure", "Contract_Month-to-month"]).unwrap();
        let contract = InputContract::new(
            ["tenure", "Contract"]
                .iter()
                .filter_map(|n| InputContract::telco().field(n).copied())
                .collect(),
        );
        Predictor::from_parts(
            Encoder::new(schema.clone(), contract),
            Arc::new(FixedClassifier {
                probability,
                schema: schema.clone(),
            }),
            Explainer::new(schema),
            RiskPolicy::default(),
            5,
        )
    }

    fn request() -> CustomerRequest {
        CustomerRequest {
            identity: CustomerIdentity {
                name: "Grace".into(),
                customer_id: "9237-HQITU".into(),
            },
            attributes: RawRecord::new()
                .with("tenure", 2)
                .with("Contract", "Month-to-month"),
        }
    }

    #[test]
    fn test_unexplainable_model_still_reports_probability() {
        let report = fixed_predictor(0.83).predict(&request()).unwrap();
        assert_eq!(report.category, RiskCategory::High);
        assert!(report.should_alert);
        assert!(report.attributions.is_none());
        assert!(report.base_value.is_none());
        assert!(report
            .explanation_note
            .as_deref()
            .is_some_and(|n| n.contains("fixed")));

        let alert = report.alert.expect("alert event");
        assert_eq!(alert.identity.customer_id, "9237-HQITU");
        assert!(alert.attributions.is_empty());
        assert!(alert.explanation_note.is_some());
    }

    #[test]
    fn test_no_alert_below_threshold() {
        let report = fixed_predictor(0.4999).predict(&request()).unwrap();
        assert_eq!(report.category, RiskCategory::Low);
        assert!(!report.should_alert);
        assert!(report.alert.is_none());
    }

    #[test]
    fn test_medium_band_alerts() {
        let report = fixed_predictor(0.5).predict(&request()).unwrap();
        assert_eq!(report.category, RiskCategory::Medium);
        assert_eq!(report.label, "Moderately Likely to Churn");
        assert!(report.alert.is_some());
    }

    #[test]
    fn test_encoder_errors_are_terminal() {
        let mut req = request();
        req.attributes.remove("tenure");
        assert!(matches!(
            fixed_predictor(0.9).predict(&req),
            Err(ChurnError::MissingField { .. })
        ));
    }

    #[test]
    fn test_vocabulary_warnings_are_reported() {
        let mut req = request();
        req.attributes.set("Contract", "month-to-month");
        let report = fixed_predictor(0.2).predict(&req).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Contract:"));
    }

    #[test]
    fn test_seed_bundle_report() {
        let bundle = ModelBundle::seed().unwrap();
        let predictor = Predictor::new(&bundle, InputContract::telco(), RiskPolicy::default(), 3);

        let mut attributes = RawRecord::new();
        for spec in InputContract::telco().fields() {
            match spec.default_choice() {
                Some(choice) if !spec.kind.is_numeric() => attributes.set(spec.name, choice),
                _ => attributes.set(spec.name, 0),
            }
        }
        let report = predictor
            .predict(&CustomerRequest {
                identity: CustomerIdentity::default(),
                attributes,
            })
            .unwrap();

        assert_eq!(report.model_kind, "tree_ensemble");
        assert_eq!(report.schema_fingerprint, bundle.schema().fingerprint());
        assert_eq!(report.attributions.as_ref().map(Vec::len), Some(3));
        assert!(report.base_value.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("alert").is_none());
        assert!(json["probability"].as_f64().is_some());
    }
}
