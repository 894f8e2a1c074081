//! Per-prediction feature attribution
//!
//! The explainer turns a classifier and one encoded row into signed
//! contributions per schema column, ranked by magnitude. Only tree
//! ensembles with cover statistics can be explained; every other backend
//! yields `UnsupportedModel` and the caller decides whether to show the
//! bare probability.

mod tree_shap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{check_vector, Classifier};
use crate::error::{ChurnError, ChurnResult};
use crate::models::{AttributionEntry, EncodedVector};
use crate::schema::FeatureSchema;

use tree_shap::shap_values;

/// Number of contributors shown by default
pub const DEFAULT_TOP_K: usize = 5;

/// Full explanation of one prediction, in margin (log-odds) space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Model expectation over the training distribution
    pub base_value: f64,
    /// Margin for this row; `base_value + sum(contributions)`
    pub margin: f64,
    /// Every column, ranked by descending absolute contribution
    pub ranked: Vec<AttributionEntry>,
}

impl Explanation {
    /// The first `top_k` entries
    pub fn top(&self, top_k: usize) -> &[AttributionEntry] {
        &self.ranked[..top_k.min(self.ranked.len())]
    }
}

/// Sort scores by descending absolute value and keep the first `top_k`.
///
/// The sort is stable, so equal magnitudes keep schema order.
pub fn rank_attributions(names: &[String], scores: &[f64], top_k: usize) -> Vec<AttributionEntry> {
    let mut entries: Vec<AttributionEntry> = names
        .iter()
        .zip(scores)
        .map(|(name, &score)| AttributionEntry::new(name.clone(), score))
        .collect();
    entries.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    entries.truncate(top_k);
    entries
}

/// Attribution engine bound to one feature schema
#[derive(Debug, Clone)]
pub struct Explainer {
    schema: FeatureSchema,
}

impl Explainer {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    /// Top-K contributors for one row.
    pub fn explain(
        &self,
        model: &dyn Classifier,
        vector: &EncodedVector,
        top_k: usize,
    ) -> ChurnResult<Vec<AttributionEntry>> {
        let mut explanation = self.explain_full(model, vector)?;
        explanation.ranked.truncate(top_k);
        Ok(explanation.ranked)
    }

    /// Baseline, margin and every column's contribution, ranked.
    pub fn explain_full(
        &self,
        model: &dyn Classifier,
        vector: &EncodedVector,
    ) -> ChurnResult<Explanation> {
        check_vector(model, vector)?;
        if vector.schema_fingerprint() != self.schema.fingerprint() {
            return Err(ChurnError::SchemaMismatch(
                "explainer and vector use different feature schemas".to_string(),
            ));
        }

        let ensemble = model
            .as_tree_ensemble()
            .ok_or_else(|| ChurnError::UnsupportedModel {
                kind: model.kind().to_string(),
                reason: "no tree structure is exposed".to_string(),
            })?;
        if !ensemble.is_explainable() {
            return Err(ChurnError::UnsupportedModel {
                kind: model.kind().to_string(),
                reason: "tree dump has no cover statistics".to_string(),
            });
        }

        let values = shap_values(ensemble, vector.values());
        debug!(
            base_value = values.base_value,
            margin = values.margin,
            "computed tree attributions"
        );

        Ok(Explanation {
            base_value: values.base_value,
            margin: values.margin,
            ranked: rank_attributions(self.schema.columns(), &values.phi, self.schema.len()),
        })
    }
}
