//! churnlens - explainable customer churn scoring
//!
//! Encodes raw customer attributes against a model's feature schema,
//! scores them with a boosted tree ensemble, explains each prediction with
//! TreeSHAP and raises an alert event for at-risk customers.
//!
//! ```no_run
//! use churnlens::classifier::ModelBundle;
//! use churnlens::models::{CustomerIdentity, CustomerRequest};
//! use churnlens::pipeline::Predictor;
//! use churnlens::risk::RiskPolicy;
//! use churnlens::schema::InputContract;
//!
//! let bundle = ModelBundle::seed()?;
//! let predictor = Predictor::new(&bundle, InputContract::telco(), RiskPolicy::default(), 5);
//! let report = predictor.predict(&CustomerRequest {
//!     identity: CustomerIdentity::default(),
//!     attributes: InputContract::telco().default_record(),
//! })?;
//! println!("{:.2}% {}", report.probability * 100.0, report.category);
//! # Ok::<(), churnlens::error::ChurnError>(())
//! ```

pub mod alert;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod explain;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod reporters;
pub mod risk;
pub mod schema;
