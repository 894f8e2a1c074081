//! Core data models for churnlens
//!
//! These models flow through a single prediction request:
//! `CustomerRequest` -> `EncodedVector` -> `AttributionEntry` list.
//! None of them are persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single raw attribute value as entered by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Numeric view of the value (`None` for text)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            RawValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Int(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::Text(_) => "text",
        }
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Int(i) => write!(f, "{i}"),
            RawValue::Float(v) => write!(f, "{v}"),
            RawValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<i32> for RawValue {
    fn from(i: i32) -> Self {
        RawValue::Int(i64::from(i))
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

/// Raw attribute record for one customer, keyed by field name.
///
/// Field names are case-sensitive and follow the training data's column
/// names (`gender`, `SeniorCitizen`, `tenure`, `Contract`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: &str, value: impl Into<RawValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<RawValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<RawValue> {
        self.fields.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterate fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Freeform identity fields carried into reports and alerts. Never validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub customer_id: String,
}

/// One scoring request: identity plus raw attributes.
///
/// This is the JSON shape accepted by `predict --input` and by each line
/// of a `batch` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRequest {
    #[serde(flatten)]
    pub identity: CustomerIdentity,
    pub attributes: RawRecord,
}

/// Numeric row aligned to a `FeatureSchema`.
///
/// Carries the fingerprint of the schema it was encoded against so a model
/// bound to a different schema can refuse it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVector {
    values: Vec<f64>,
    schema_fingerprint: String,
}

impl EncodedVector {
    pub(crate) fn new(values: Vec<f64>, schema_fingerprint: impl Into<String>) -> Self {
        Self {
            values,
            schema_fingerprint: schema_fingerprint.into(),
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn schema_fingerprint(&self) -> &str {
        &self.schema_fingerprint
    }

    /// Convert to `f32` for backends that score in single precision
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Signed contribution of one feature column to a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionEntry {
    pub feature: String,
    pub contribution: f64,
}

impl AttributionEntry {
    pub fn new(feature: impl Into<String>, contribution: f64) -> Self {
        Self {
            feature: feature.into(),
            contribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_untagged_json() {
        let record: RawRecord =
            serde_json::from_str(r#"{"tenure": 12, "MonthlyCharges": 29.85, "Contract": "One year"}"#)
                .unwrap();
        assert_eq!(record.get("tenure"), Some(&RawValue::Int(12)));
        assert_eq!(record.get("MonthlyCharges"), Some(&RawValue::Float(29.85)));
        assert_eq!(record.get("Contract"), Some(&RawValue::Text("One year".into())));
    }

    #[test]
    fn test_customer_request_flattens_identity() {
        let json = r#"{"name": "Ada", "customer_id": "7590-VHVEG", "attributes": {"gender": "Female"}}"#;
        let req: CustomerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.identity.name, "Ada");
        assert_eq!(req.identity.customer_id, "7590-VHVEG");
        assert_eq!(req.attributes.len(), 1);
    }

    #[test]
    fn test_identity_fields_default_to_empty() {
        let req: CustomerRequest = serde_json::from_str(r#"{"attributes": {}}"#).unwrap();
        assert!(req.identity.name.is_empty());
        assert!(req.attributes.is_empty());
    }

    #[test]
    fn test_record_builder_overwrites() {
        let record = RawRecord::new().with("tenure", 1).with("tenure", 2);
        assert_eq!(record.get("tenure").and_then(RawValue::as_f64), Some(2.0));
    }
}
