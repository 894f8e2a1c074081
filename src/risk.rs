//! Risk bands
//!
//! `RiskPolicy` is the only place the band thresholds live. The alert
//! trigger is defined in terms of the same table, so moving a threshold
//! moves both.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChurnError, ChurnResult};

/// Ordered risk band; `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Operator-facing description
    pub fn label(self) -> &'static str {
        match self {
            RiskCategory::High => "Highly Likely to Churn",
            RiskCategory::Medium => "Moderately Likely to Churn",
            RiskCategory::Low => "Low Risk (Customer Likely to Stay)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::High => "HIGH",
            RiskCategory::Medium => "MEDIUM",
            RiskCategory::Low => "LOW",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold table mapping probabilities to bands.
///
/// Bands are upper-inclusive on the thresholds:
/// `p >= high` is HIGH, `medium <= p < high` is MEDIUM, the rest LOW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            medium_threshold: 0.5,
        }
    }
}

impl RiskPolicy {
    pub fn new(high_threshold: f64, medium_threshold: f64) -> ChurnResult<Self> {
        let policy = Self {
            high_threshold,
            medium_threshold,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Require `0 <= medium <= high <= 1`, both finite.
    pub fn validate(&self) -> ChurnResult<()> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.high_threshold) || !in_unit(self.medium_threshold) {
            return Err(ChurnError::Config(format!(
                "risk thresholds must be within [0, 1] (high={}, medium={})",
                self.high_threshold, self.medium_threshold
            )));
        }
        if self.medium_threshold > self.high_threshold {
            return Err(ChurnError::Config(format!(
                "medium_threshold ({}) must not exceed high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        Ok(())
    }

    pub fn categorize(&self, probability: f64) -> RiskCategory {
        if probability >= self.high_threshold {
            RiskCategory::High
        } else if probability >= self.medium_threshold {
            RiskCategory::Medium
        } else {
            RiskCategory::Low
        }
    }

    /// Alert on MEDIUM or HIGH
    pub fn should_alert(&self, probability: f64) -> bool {
        self.categorize(probability) >= RiskCategory::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        let policy = RiskPolicy::default();
        assert_eq!(policy.categorize(0.79), RiskCategory::Medium);
        assert_eq!(policy.categorize(0.8), RiskCategory::High);
        assert_eq!(policy.categorize(1.0), RiskCategory::High);
        assert_eq!(policy.categorize(0.5), RiskCategory::Medium);
        assert_eq!(policy.categorize(0.4999), RiskCategory::Low);
        assert_eq!(policy.categorize(0.0), RiskCategory::Low);
    }

    #[test]
    fn test_alert_threshold() {
        let policy = RiskPolicy::default();
        assert!(policy.should_alert(0.5));
        assert!(!policy.should_alert(0.4999999));
        assert!(policy.should_alert(0.95));
    }

    #[test]
    fn test_alert_follows_configured_table() {
        let policy = RiskPolicy::new(0.9, 0.7).unwrap();
        assert!(!policy.should_alert(0.6));
        assert_eq!(policy.categorize(0.85), RiskCategory::Medium);
        assert!(policy.should_alert(0.7));
    }

    #[test]
    fn test_validation() {
        assert!(RiskPolicy::new(0.5, 0.8).is_err());
        assert!(RiskPolicy::new(1.2, 0.5).is_err());
        assert!(RiskPolicy::new(0.8, f64::NAN).is_err());
        assert!(RiskPolicy::new(0.6, 0.6).is_ok());
        assert!(RiskPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_category_ordering_and_labels() {
        assert!(RiskCategory::Low < RiskCategory::Medium);
        assert!(RiskCategory::Medium < RiskCategory::High);
        assert_eq!(RiskCategory::High.to_string(), "HIGH");
        assert_eq!(RiskCategory::Low.label(), "Low Risk (Customer Likely to Stay)");
        assert_eq!(serde_json::to_string(&RiskCategory::Medium).unwrap(), "\"MEDIUM\"");
    }

    #[test]
    fn test_policy_from_partial_toml() {
        let policy: RiskPolicy = toml::from_str("high_threshold = 0.9").unwrap();
        assert_eq!(policy.high_threshold, 0.9);
        assert_eq!(policy.medium_threshold, 0.5);
    }
}
