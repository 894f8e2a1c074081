//! Feature schema and raw input contract
//!
//! - `FeatureSchema`: model-side column order, loaded from the bundle
//! - `InputContract`: operator-side raw fields and their vocabularies

mod feature_schema;
mod input;

pub use feature_schema::FeatureSchema;
pub use input::{FieldKind, FieldSpec, FieldWarning, InputContract};
