//! Configuration module for churnlens
//!
//! This module handles:
//! - Model bundle location
//! - Risk thresholds and explanation size
//! - Alert channel settings (token from the environment only)

mod user_config;

pub use user_config::{
    ExplainConfig, ModelConfig, NotifyConfig, RiskConfig, UserConfig, ENV_MODEL_DIR,
    ENV_NOTIFY_CHANNEL, ENV_WEBHOOK_TOKEN, ENV_WEBHOOK_URL, PROJECT_CONFIG_FILE,
};
