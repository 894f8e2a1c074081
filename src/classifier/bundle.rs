//! Model bundle: a classifier paired with the schema it was trained on
//!
//! A bundle directory holds:
//!
//! ```text
//! model_columns.json   ordered feature columns (FeatureSchema)
//! model.json           classifier artifact
//! bundle.json          optional manifest {kind, version, schema_fingerprint}
//! ```
//!
//! The seed bundle under `models/` is compiled into the binary so a fresh
//! install can score customers without any setup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Classifier, GbdtClassifier, TreeEnsemble};
use crate::error::{ChurnError, ChurnResult};
use crate::schema::FeatureSchema;

pub const COLUMNS_FILE: &str = "model_columns.json";
pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "bundle.json";

const SEED_COLUMNS_JSON: &str = include_str!("../../models/model_columns.json");
const SEED_MODEL_JSON: &str = include_str!("../../models/model.json");
const SEED_MANIFEST_JSON: &str = include_str!("../../models/bundle.json");

/// Model artifact format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    TreeEnsemble,
    Gbdt,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::TreeEnsemble => write!(f, "tree_ensemble"),
            ModelKind::Gbdt => write!(f, "gbdt"),
        }
    }
}

/// Contents of `bundle.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default)]
    pub version: Option<String>,
    /// Expected fingerprint of `model_columns.json`, checked at load
    #[serde(default)]
    pub schema_fingerprint: Option<String>,
}

/// Where a bundle was loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum BundleSource {
    Embedded,
    Directory(PathBuf),
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleSource::Embedded => write!(f, "embedded seed model"),
            BundleSource::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

/// A loaded classifier and its feature schema
#[derive(Clone)]
pub struct ModelBundle {
    schema: FeatureSchema,
    classifier: Arc<dyn Classifier>,
    manifest: BundleManifest,
    source: BundleSource,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("kind", &self.manifest.kind)
            .field("version", &self.manifest.version)
            .field("columns", &self.schema.len())
            .field("source", &self.source)
            .finish()
    }
}

impl ModelBundle {
    /// Load the bundle embedded in the binary.
    pub fn seed() -> ChurnResult<Self> {
        Self::from_parts(
            SEED_COLUMNS_JSON,
            SEED_MODEL_JSON,
            Some(SEED_MANIFEST_JSON),
            BundleSource::Embedded,
        )
    }

    /// Load a bundle from a directory.
    pub fn load(dir: &Path) -> ChurnResult<Self> {
        let read = |name: &str| -> ChurnResult<String> {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                ChurnError::ModelLoad(format!("cannot read {}: {e}", path.display()))
            })
        };

        let columns = read(COLUMNS_FILE)?;
        let model = read(MODEL_FILE)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            Some(read(MANIFEST_FILE)?)
        } else {
            debug!(dir = %dir.display(), "no bundle.json, assuming tree_ensemble");
            None
        };

        Self::from_parts(
            &columns,
            &model,
            manifest.as_deref(),
            BundleSource::Directory(dir.to_path_buf()),
        )
    }

    /// Load from a configured directory, or the embedded seed when unset.
    pub fn load_or_seed(dir: Option<&Path>) -> ChurnResult<Self> {
        match dir {
            Some(dir) => Self::load(dir),
            None => Self::seed(),
        }
    }

    /// Assemble a bundle from file contents.
    pub fn from_parts(
        columns_json: &str,
        model_json: &str,
        manifest_json: Option<&str>,
        source: BundleSource,
    ) -> ChurnResult<Self> {
        let schema = FeatureSchema::from_json(columns_json)?;

        let manifest: BundleManifest = match manifest_json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| ChurnError::ModelLoad(format!("invalid {MANIFEST_FILE}: {e}")))?,
            None => BundleManifest::default(),
        };

        if let Some(expected) = &manifest.schema_fingerprint {
            if expected != schema.fingerprint() {
                return Err(ChurnError::SchemaMismatch(format!(
                    "{MANIFEST_FILE} expects schema {expected}, {COLUMNS_FILE} is {}",
                    schema.fingerprint()
                )));
            }
        }

        let classifier: Arc<dyn Classifier> = match manifest.kind {
            ModelKind::TreeEnsemble => Arc::new(TreeEnsemble::from_json(model_json, &schema)?),
            ModelKind::Gbdt => Arc::new(GbdtClassifier::from_json(model_json, &schema)?),
        };

        info!(
            kind = %manifest.kind,
            version = manifest.version.as_deref().unwrap_or("unversioned"),
            columns = schema.len(),
            source = %source,
            "loaded model bundle"
        );

        Ok(Self {
            schema,
            classifier,
            manifest,
            source,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.classifier)
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn kind(&self) -> ModelKind {
        self.manifest.kind
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    pub fn source(&self) -> &BundleSource {
        &self.source
    }
}
