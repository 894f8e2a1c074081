//! Raw input contract
//!
//! Describes the attribute fields an operator supplies for one customer,
//! their kinds and allowed categories. This is the input surface, not the
//! model's feature space: the model side is always `FeatureSchema`.

use crate::models::{RawRecord, RawValue};

/// How a raw field is typed and expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One-hot expanded into `<field>_<category>` columns
    Categorical,
    /// Whole number, passes through under its own name
    Integer,
    /// Real number, passes through under its own name
    Float,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, FieldKind::Categorical)
    }
}

/// Declaration of one raw field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Allowed categories (categorical) or allowed integer codes as text
    /// (integer flags such as `SeniorCitizen`). Empty means unrestricted.
    pub allowed: &'static [&'static str],
    /// Lower bound for numeric fields
    pub min: Option<f64>,
}

impl FieldSpec {
    const fn categorical(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            name,
            kind: FieldKind::Categorical,
            allowed,
            min: None,
        }
    }

    const fn integer(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            name,
            kind: FieldKind::Integer,
            allowed,
            min: Some(0.0),
        }
    }

    const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Float,
            allowed: &[],
            min: Some(0.0),
        }
    }

    /// Category the operator form preselects (first allowed value)
    pub fn default_choice(&self) -> Option<&'static str> {
        self.allowed.first().copied()
    }
}

const YES_NO: &[&str] = &["Yes", "No"];
const INTERNET_ADDON: &[&str] = &["Yes", "No", "No internet service"];

/// Telco customer fields, in form order
const TELCO_FIELDS: &[FieldSpec] = &[
    FieldSpec::categorical("gender", &["Male", "Female"]),
    FieldSpec::integer("SeniorCitizen", &["0", "1"]),
    FieldSpec::categorical("Partner", YES_NO),
    FieldSpec::categorical("Dependents", YES_NO),
    FieldSpec::integer("tenure", &[]),
    FieldSpec::categorical("PhoneService", YES_NO),
    FieldSpec::categorical("MultipleLines", &["Yes", "No", "No phone service"]),
    FieldSpec::categorical("InternetService", &["DSL", "Fiber optic", "No"]),
    FieldSpec::categorical("OnlineSecurity", INTERNET_ADDON),
    FieldSpec::categorical("OnlineBackup", INTERNET_ADDON),
    FieldSpec::categorical("DeviceProtection", INTERNET_ADDON),
    FieldSpec::categorical("TechSupport", INTERNET_ADDON),
    FieldSpec::categorical("StreamingTV", INTERNET_ADDON),
    FieldSpec::categorical("StreamingMovies", INTERNET_ADDON),
    FieldSpec::categorical("Contract", &["Month-to-month", "One year", "Two year"]),
    FieldSpec::categorical("PaperlessBilling", YES_NO),
    FieldSpec::categorical(
        "PaymentMethod",
        &[
            "Electronic check",
            "Mailed check",
            "Bank transfer (automatic)",
            "Credit card (automatic)",
        ],
    ),
    FieldSpec::float("MonthlyCharges"),
    FieldSpec::float("TotalCharges"),
];

/// Non-fatal observation about a record (value outside the known vocabulary)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWarning {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Set of required raw fields
#[derive(Debug, Clone, PartialEq)]
pub struct InputContract {
    fields: Vec<FieldSpec>,
}

impl InputContract {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The Telco customer form
    pub fn telco() -> Self {
        Self::new(TELCO_FIELDS.to_vec())
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A complete record with the operator form's preselected values:
    /// the first allowed category, and 0 for numerics.
    pub fn default_record(&self) -> RawRecord {
        let mut record = RawRecord::new();
        for spec in &self.fields {
            match spec.kind {
                FieldKind::Categorical => {
                    record.set(spec.name, spec.default_choice().unwrap_or_default())
                }
                FieldKind::Integer => record.set(spec.name, 0),
                FieldKind::Float => record.set(spec.name, 0.0),
            }
        }
        record
    }

    /// Collect vocabulary warnings without rejecting anything.
    ///
    /// Unknown categories are legal input (they encode to all-zero
    /// indicator columns) but usually mean a typo or a casing difference.
    pub fn check(&self, record: &RawRecord) -> Vec<FieldWarning> {
        let mut warnings = Vec::new();

        for spec in &self.fields {
            let Some(value) = record.get(spec.name) else {
                continue;
            };
            if spec.allowed.is_empty() {
                continue;
            }

            let observed = match value {
                RawValue::Text(s) => s.clone(),
                RawValue::Int(i) => i.to_string(),
                RawValue::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
                RawValue::Float(f) => f.to_string(),
            };

            if !spec.allowed.contains(&observed.as_str()) {
                warnings.push(FieldWarning {
                    field: spec.name.to_string(),
                    message: format!(
                        "'{}' is not one of [{}]",
                        observed,
                        spec.allowed.join(", ")
                    ),
                });
            }
        }

        for (name, _) in record.iter() {
            if self.field(name).is_none() {
                warnings.push(FieldWarning {
                    field: name.to_string(),
                    message: "not part of the input contract".to_string(),
                });
            }
        }

        warnings
    }
}

impl Default for InputContract {
    fn default() -> Self {
        Self::telco()
    }
}
