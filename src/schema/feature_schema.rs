//! Feature schema: the ordered model columns
//!
//! The schema is data, produced at training time and shipped next to the
//! model artifact as `model_columns.json`. Its fingerprint ties encoded
//! vectors to the schema they were built against.
//!
//! Rules:
//! 1. Never edit a schema in place. A new column set means a new bundle.
//! 2. Column order is significant and is part of the fingerprint.

use crate::error::{ChurnError, ChurnResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Number of hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 16;

/// Ordered, immutable list of feature columns a model was trained on
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    fingerprint: String,
}

impl FeatureSchema {
    /// Build a schema from column names, rejecting empty or duplicate sets.
    pub fn new<I, S>(columns: I) -> ChurnResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(ChurnError::SchemaMismatch(
                "feature schema has no columns".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(ChurnError::SchemaMismatch(format!(
                    "duplicate column '{name}' in feature schema"
                )));
            }
        }

        let fingerprint = compute_fingerprint(&columns);
        Ok(Self {
            columns,
            index,
            fingerprint,
        })
    }

    /// Parse a schema from a JSON array of column names
    pub fn from_json(json: &str) -> ChurnResult<Self> {
        let columns: Vec<String> = serde_json::from_str(json)?;
        Self::new(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column position by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column name by position
    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// SHA-256 over the ordered column names, NUL-separated
fn compute_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in columns {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_index_lookup() {
        let schema = FeatureSchema::new(["tenure", "Contract_Two year"]).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("tenure"), Some(0));
        assert_eq!(schema.index_of("Contract_Two year"), Some(1));
        assert_eq!(schema.index_of("Contract_One year"), None);
        assert_eq!(schema.name(1), Some("Contract_Two year"));
        assert_eq!(schema.name(2), None);
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = FeatureSchema::new(["a", "b"]).unwrap();
        let b = FeatureSchema::new(["b", "a"]).unwrap();
        let a2 = FeatureSchema::new(["a", "b"]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a2.fingerprint());
        assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_separates_names() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = FeatureSchema::new(["ab", "c"]).unwrap();
        let b = FeatureSchema::new(["a", "bc"]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            FeatureSchema::new(empty),
            Err(ChurnError::SchemaMismatch(_))
        ));
        assert!(matches!(
            FeatureSchema::new(["tenure", "tenure"]),
            Err(ChurnError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let schema = FeatureSchema::from_json(r#"["SeniorCitizen", "tenure"]"#).unwrap();
        assert_eq!(schema.columns(), &["SeniorCitizen".to_string(), "tenure".to_string()]);
        assert!(FeatureSchema::from_json("{}").is_err());
    }
}
