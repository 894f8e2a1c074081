//! Churn classifiers
//!
//! A classifier is an opaque capability: it scores an `EncodedVector` and,
//! when its internal structure allows it, exposes a tree view for
//! attribution. Two backends ship:
//!
//! - `TreeEnsemble`: XGBoost JSON tree dump, scored in margin space and
//!   explainable with TreeSHAP
//! - `GbdtClassifier`: gbdt-rs native JSON, predict-only
//!
//! Both are loaded through `ModelBundle`, which pairs the artifact with the
//! feature schema it was trained on.

mod bundle;
pub mod gbdt_model;
pub mod tree;

pub use bundle::{BundleManifest, BundleSource, ModelBundle, ModelKind};
pub use gbdt_model::GbdtClassifier;
pub use tree::TreeEnsemble;

use crate::error::{ChurnError, ChurnResult};
use crate::models::EncodedVector;

/// Scoring capability shared by every model backend.
///
/// Implementations are read-only after loading and safe to share across
/// threads (`batch` scores requests in parallel).
pub trait Classifier: Send + Sync {
    /// Backend name, as written in `bundle.json`
    fn kind(&self) -> &'static str;

    /// Vector width the model was trained on
    fn feature_count(&self) -> usize;

    /// Fingerprint of the schema the model is bound to
    fn schema_fingerprint(&self) -> &str;

    /// Probability of the positive (churn) class, in `[0, 1]`
    fn predict_probability(&self, vector: &EncodedVector) -> ChurnResult<f64>;

    /// Tree view for attribution, if this backend has one
    fn as_tree_ensemble(&self) -> Option<&TreeEnsemble> {
        None
    }
}

/// Reject a vector that was not encoded against the model's schema.
pub(crate) fn check_vector(model: &dyn Classifier, vector: &EncodedVector) -> ChurnResult<()> {
    if vector.len() != model.feature_count() {
        return Err(ChurnError::SchemaMismatch(format!(
            "vector has {} columns, model '{}' expects {}",
            vector.len(),
            model.kind(),
            model.feature_count()
        )));
    }
    if vector.schema_fingerprint() != model.schema_fingerprint() {
        return Err(ChurnError::SchemaMismatch(format!(
            "vector encoded against schema {}, model bound to {}",
            vector.schema_fingerprint(),
            model.schema_fingerprint()
        )));
    }
    Ok(())
}

/// Logistic link from margin to probability
pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}
