//! Raw record -> model feature vector
//!
//! Two stages:
//!   1. `expand`: one-hot categorical fields as `<field>_<category>`,
//!      numeric fields pass through under their own name. Fields outside
//!      the input contract are dropped here, so a stray attribute can never
//!      land on a schema column.
//!   2. `encode`: align the expanded columns to the `FeatureSchema`,
//!      zero-filling absent columns and dropping unknown ones
//!
//! Missing required fields fail fast with `MissingField`. Only a category
//! that the schema has never seen is silently zero, so "field present but
//! category unseen" is never confused with "field missing".

use crate::error::{ChurnError, ChurnResult};
use crate::models::{EncodedVector, RawRecord, RawValue};
use crate::schema::{FeatureSchema, FieldKind, FieldSpec, InputContract};
use tracing::debug;

/// One column produced by expansion
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedColumn {
    pub name: String,
    pub value: f64,
}

/// Encodes raw records against one feature schema
#[derive(Debug, Clone)]
pub struct Encoder {
    schema: FeatureSchema,
    contract: InputContract,
}

impl Encoder {
    pub fn new(schema: FeatureSchema, contract: InputContract) -> Self {
        Self { schema, contract }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn contract(&self) -> &InputContract {
        &self.contract
    }

    /// One-hot expansion of the contract fields, in field-name order.
    ///
    /// Contract fields are type-checked; anything else is dropped.
    pub fn expand(&self, raw: &RawRecord) -> ChurnResult<Vec<ExpandedColumn>> {
        for spec in self.contract.fields() {
            if !raw.contains(spec.name) {
                return Err(ChurnError::MissingField {
                    field: spec.name.to_string(),
                });
            }
        }

        let mut columns = Vec::with_capacity(raw.len());
        for (name, value) in raw.iter() {
            match self.contract.field(name) {
                Some(spec) => columns.push(expand_declared(spec, value)?),
                None => debug!(field = %name, "dropping field outside input contract"),
            }
        }
        Ok(columns)
    }

    /// Encode a record into a vector aligned to the schema.
    ///
    /// Output length always equals the schema length and follows its order.
    pub fn encode(&self, raw: &RawRecord) -> ChurnResult<EncodedVector> {
        let expanded = self.expand(raw)?;

        let mut values = vec![0.0; self.schema.len()];
        for column in &expanded {
            match self.schema.index_of(&column.name) {
                Some(i) => values[i] = column.value,
                None => debug!(column = %column.name, "dropping column not in feature schema"),
            }
        }

        Ok(EncodedVector::new(values, self.schema.fingerprint()))
    }
}

fn one_hot(field: &str, category: &str) -> ExpandedColumn {
    ExpandedColumn {
        name: format!("{field}_{category}"),
        value: 1.0,
    }
}

fn expand_declared(spec: &FieldSpec, value: &RawValue) -> ChurnResult<ExpandedColumn> {
    match spec.kind {
        FieldKind::Categorical => match value {
            RawValue::Text(category) => Ok(one_hot(spec.name, category)),
            other => Err(ChurnError::invalid(
                spec.name,
                format!("expected a category, got {} {}", other.kind_name(), other),
            )),
        },
        FieldKind::Integer | FieldKind::Float => {
            let number = value.as_f64().ok_or_else(|| {
                ChurnError::invalid(spec.name, format!("expected a number, got '{value}'"))
            })?;
            if !number.is_finite() {
                return Err(ChurnError::invalid(spec.name, "value is not finite"));
            }
            if spec.kind == FieldKind::Integer && number.fract() != 0.0 {
                return Err(ChurnError::invalid(
                    spec.name,
                    format!("expected a whole number, got {number}"),
                ));
            }
            if let Some(min) = spec.min {
                if number < min {
                    return Err(ChurnError::invalid(
                        spec.name,
                        format!("must be at least {min}, got {number}"),
                    ));
                }
            }
            Ok(ExpandedColumn {
                name: spec.name.to_string(),
                value: number,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new([
            "tenure",
            "MonthlyCharges",
            "gender_Female",
            "gender_Male",
            "Contract_Month-to-month",
            "Contract_Two year",
        ])
        .unwrap()
    }

    fn small_contract() -> InputContract {
        let telco = InputContract::telco();
        let fields = ["gender", "tenure", "Contract", "MonthlyCharges"]
            .iter()
            .filter_map(|name| telco.field(name).copied())
            .collect();
        InputContract::new(fields)
    }

    fn record() -> RawRecord {
        RawRecord::new()
            .with("gender", "Female")
            .with("tenure", 5)
            .with("Contract", "Two year")
            .with("MonthlyCharges", 42.5)
    }

    #[test]
    fn test_encode_aligns_to_schema_order() {
        let encoder = Encoder::new(schema(), small_contract());
        let vector = encoder.encode(&record()).unwrap();
        assert_eq!(vector.values(), &[5.0, 42.5, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vector.schema_fingerprint(), encoder.schema().fingerprint());
    }

    #[test]
    fn test_expand_names_one_hot_columns() {
        let encoder = Encoder::new(schema(), small_contract());
        let names: Vec<String> = encoder
            .expand(&record())
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec!["Contract_Two year", "MonthlyCharges", "gender_Female", "tenure"]
        );
    }

    #[test]
    fn test_unseen_category_does_not_grow_vector() {
        let encoder = Encoder::new(schema(), small_contract());
        let raw = record().with("Contract", "Three year");
        let vector = encoder.encode(&raw).unwrap();
        assert_eq!(vector.len(), 6);
        assert_eq!(vector.get(4), Some(0.0));
        assert_eq!(vector.get(5), Some(0.0));
    }

    #[test]
    fn test_case_variant_category_is_not_normalized() {
        let encoder = Encoder::new(schema(), small_contract());
        let raw = record().with("gender", "female");
        let vector = encoder.encode(&raw).unwrap();
        assert_eq!(vector.get(2), Some(0.0));
        assert_eq!(vector.get(3), Some(0.0));

        let padded = record().with("gender", " Female");
        assert_eq!(encoder.encode(&padded).unwrap().get(2), Some(0.0));
    }

    #[test]
    fn test_missing_field_fails_fast() {
        let encoder = Encoder::new(schema(), small_contract());
        let mut raw = record();
        raw.remove("Contract");
        match encoder.encode(&raw) {
            Err(ChurnError::MissingField { field }) => assert_eq!(field, "Contract"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let encoder = Encoder::new(schema(), small_contract());

        let text_tenure = record().with("tenure", "five");
        assert!(matches!(
            encoder.encode(&text_tenure),
            Err(ChurnError::InvalidField { ref field, .. }) if field == "tenure"
        ));

        let numeric_contract = record().with("Contract", 2);
        assert!(matches!(
            encoder.encode(&numeric_contract),
            Err(ChurnError::InvalidField { ref field, .. }) if field == "Contract"
        ));

        let fractional_tenure = record().with("tenure", 1.5);
        assert!(encoder.encode(&fractional_tenure).is_err());

        let negative_charge = record().with("MonthlyCharges", -1.0);
        assert!(encoder.encode(&negative_charge).is_err());

        let nan_charge = record().with("MonthlyCharges", f64::NAN);
        assert!(encoder.encode(&nan_charge).is_err());
    }

    #[test]
    fn test_whole_float_accepted_for_integer_field() {
        let encoder = Encoder::new(schema(), small_contract());
        let raw = record().with("tenure", 12.0);
        assert_eq!(encoder.encode(&raw).unwrap().get(0), Some(12.0));
    }

    #[test]
    fn test_extra_fields_are_dropped_by_alignment() {
        let encoder = Encoder::new(schema(), small_contract());
        let raw = record().with("Region", "North").with("NumTickets", 3);
        let vector = encoder.encode(&raw).unwrap();
        assert_eq!(vector.len(), 6);
        assert_eq!(vector, encoder.encode(&record()).unwrap());
    }

    #[test]
    fn test_extra_fields_cannot_overwrite_one_hot_columns() {
        let encoder = Encoder::new(schema(), small_contract());
        let clean = record().with("Contract", "Month-to-month");
        let tampered = clean
            .clone()
            .with("Contract_Month-to-month", 0)
            .with("Contract_Two year", 1)
            .with("tenure_", 99);

        let vector = encoder.encode(&tampered).unwrap();
        assert_eq!(vector.get(4), Some(1.0));
        assert_eq!(vector.get(5), Some(0.0));
        assert_eq!(vector, encoder.encode(&clean).unwrap());

        let names: Vec<String> = encoder
            .expand(&tampered)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names.len(), 4);
        assert!(!names.iter().any(|n| n == "Contract_Two year"));
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let encoder = Encoder::new(schema(), small_contract());
        let a = encoder.encode(&record()).unwrap();
        let b = encoder.encode(&record()).unwrap();
        let bits_a: Vec<u64> = a.values().iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}
