//! GBDT model wrapper
//!
//! Wraps the `gbdt` crate for bundles whose `model.json` is the gbdt-rs
//! native serde format (what `GBDT::save_model` writes). The crate keeps
//! its trees private, so this backend scores only; asking it for an
//! explanation yields `UnsupportedModel`.
//!
//! Note: the gbdt crate scores in `f32`, while `EncodedVector` stores
//! `f64`. Conversion happens at the crate boundary.

use gbdt::decision_tree::Data;
use gbdt::gradient_boost::GBDT;

use super::{check_vector, Classifier};
use crate::error::{ChurnError, ChurnResult};
use crate::models::EncodedVector;
use crate::schema::FeatureSchema;

/// Predict-only classifier backed by `gbdt::gradient_boost::GBDT`.
///
/// Trained with the `LogLikelyhood` loss, so `predict` already returns a
/// probability for label `1.0` (churn).
pub struct GbdtClassifier {
    model: GBDT,
    feature_count: usize,
    schema_fingerprint: String,
}

impl GbdtClassifier {
    /// Load a model from a JSON string (gbdt-rs native format).
    pub fn from_json(json: &str, schema: &FeatureSchema) -> ChurnResult<Self> {
        let model: GBDT = serde_json::from_str(json)
            .map_err(|e| ChurnError::ModelLoad(format!("failed to parse GBDT JSON: {e}")))?;
        Ok(Self::from_trained(model, schema))
    }

    /// Wrap an already-trained `GBDT` bound to `schema`.
    pub fn from_trained(model: GBDT, schema: &FeatureSchema) -> Self {
        Self {
            model,
            feature_count: schema.len(),
            schema_fingerprint: schema.fingerprint().to_string(),
        }
    }
}

impl Classifier for GbdtClassifier {
    fn kind(&self) -> &'static str {
        "gbdt"
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn schema_fingerprint(&self) -> &str {
        &self.schema_fingerprint
    }

    fn predict_probability(&self, vector: &EncodedVector) -> ChurnResult<f64> {
        check_vector(self, vector)?;
        let data = vec![Data::new_test_data(vector.to_f32(), None)];
        let preds = self.model.predict(&data);
        let p = preds
            .first()
            .copied()
            .ok_or_else(|| ChurnError::ModelLoad("GBDT returned no prediction".to_string()))?
            as f64;
        if !p.is_finite() {
            return Err(ChurnError::ModelLoad(format!(
                "GBDT produced a non-finite score ({p})"
            )));
        }
        Ok(p.clamp(0.0, 1.0))
    }
}
