//! User-level configuration for churnlens
//!
//! Supports loading config from (lowest to highest priority):
//! - built-in defaults
//! - ~/.config/churnlens/config.toml
//! - ./churnlens.toml, or the file given with `--config`
//! - environment variables
//!
//! CLI flags are applied on top by the command handlers.
//!
//! The webhook token is never read from a file; only
//! `CHURNLENS_WEBHOOK_TOKEN` can set it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ChurnResult;
use crate::explain::DEFAULT_TOP_K;
use crate::notify::{NotifyChannel, RetryPolicy};
use crate::risk::RiskPolicy;

pub const PROJECT_CONFIG_FILE: &str = "churnlens.toml";

pub const ENV_MODEL_DIR: &str = "CHURNLENS_MODEL_DIR";
pub const ENV_WEBHOOK_URL: &str = "CHURNLENS_WEBHOOK_URL";
pub const ENV_NOTIFY_CHANNEL: &str = "CHURNLENS_NOTIFY_CHANNEL";
pub const ENV_WEBHOOK_TOKEN: &str = "CHURNLENS_WEBHOOK_TOKEN";

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub explain: ExplainConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    /// Bearer token for the webhook sink (environment only)
    #[serde(skip)]
    webhook_token: Option<Secret>,
}

/// String that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq)]
struct Secret(String);

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Bundle directory; the embedded seed model is used when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskConfig {
    pub high_threshold: Option<f64>,
    pub medium_threshold: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExplainConfig {
    pub top_k: Option<usize>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// "log" (default), "webhook", "outbox" or "none". Every channel carries
    /// the email-format subject and body, so a webhook can front an email
    /// relay.
    pub channel: Option<NotifyChannel>,

    pub webhook_url: Option<String>,

    /// JSONL file for the outbox channel
    pub outbox_path: Option<PathBuf>,

    /// Attempts after the first (default: 2)
    pub max_retries: Option<u32>,

    /// First retry delay, doubled per attempt (default: 250)
    pub backoff_ms: Option<u64>,

    /// HTTP timeout for the webhook (default: 10)
    pub timeout_secs: Option<u64>,

    /// Alerts buffered before new ones are dropped (default: 64)
    pub queue_capacity: Option<usize>,
}

impl UserConfig {
    /// Load config from all sources.
    ///
    /// `explicit` replaces the `./churnlens.toml` lookup; a file named
    /// explicitly must exist and parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = UserConfig::default();

        if let Some(path) = Self::user_config_path().filter(|p| p.exists()) {
            match Self::from_file(&path) {
                Ok(user_config) => config.merge(user_config),
                Err(e) => warn!("ignoring {}: {e:#}", path.display()),
            }
        }

        match explicit {
            Some(path) => config.merge(Self::from_file(path)?),
            None => {
                let local = PathBuf::from(PROJECT_CONFIG_FILE);
                if local.exists() {
                    config.merge(Self::from_file(&local)?);
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(?config, "resolved configuration");
        Ok(config)
    }

    /// Parse one TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("churnlens").join("config.toml"))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            self.model.dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.notify.webhook_url = Some(url);
        }
        if let Some(channel) = lookup(ENV_NOTIFY_CHANNEL) {
            let channel = channel
                .parse::<NotifyChannel>()
                .with_context(|| format!("Invalid {ENV_NOTIFY_CHANNEL}"))?;
            self.notify.channel = Some(channel);
        }
        self.webhook_token = lookup(ENV_WEBHOOK_TOKEN).map(Secret);
        Ok(())
    }

    /// Merge another config into this one (other takes priority)
    fn merge(&mut self, other: UserConfig) {
        fn take<T>(slot: &mut Option<T>, other: Option<T>) {
            if other.is_some() {
                *slot = other;
            }
        }

        take(&mut self.model.dir, other.model.dir);
        take(&mut self.risk.high_threshold, other.risk.high_threshold);
        take(&mut self.risk.medium_threshold, other.risk.medium_threshold);
        take(&mut self.explain.top_k, other.explain.top_k);
        take(&mut self.notify.channel, other.notify.channel);
        take(&mut self.notify.webhook_url, other.notify.webhook_url);
        take(&mut self.notify.outbox_path, other.notify.outbox_path);
        take(&mut self.notify.max_retries, other.notify.max_retries);
        take(&mut self.notify.backoff_ms, other.notify.backoff_ms);
        take(&mut self.notify.timeout_secs, other.notify.timeout_secs);
        take(&mut self.notify.queue_capacity, other.notify.queue_capacity);
    }

    pub fn model_dir(&self) -> Option<&Path> {
        self.model.dir.as_deref()
    }

    /// Validated risk policy, defaults filled in
    pub fn risk_policy(&self) -> ChurnResult<RiskPolicy> {
        let defaults = RiskPolicy::default();
        RiskPolicy::new(
            self.risk.high_threshold.unwrap_or(defaults.high_threshold),
            self.risk.medium_threshold.unwrap_or(defaults.medium_threshold),
        )
    }

    pub fn top_k(&self) -> usize {
        self.explain.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    pub fn notify_channel(&self) -> NotifyChannel {
        self.notify.channel.unwrap_or_default()
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.notify.webhook_url.as_deref()
    }

    pub fn webhook_token(&self) -> Option<&str> {
        self.webhook_token.as_ref().map(|s| s.0.as_str())
    }

    /// Outbox file (default: `<data dir>/churnlens/alerts.jsonl`)
    pub fn outbox_path(&self) -> PathBuf {
        self.notify.outbox_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("churnlens")
                .join("alerts.jsonl")
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.notify.max_retries.unwrap_or(defaults.max_retries),
            backoff: self
                .notify
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
        }
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn queue_capacity(&self) -> usize {
        self.notify.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    /// Render as TOML for `config show`. The token is never included.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    /// Initialize user config directory and create example config
    pub fn init_user_config() -> Result<PathBuf> {
        let config_path = Self::user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            let example = r#"# churnlens user configuration

[model]
# Directory with model_columns.json + model.json (+ optional bundle.json).
# The embedded seed model is used when unset.
# dir = "/opt/churnlens/bundle"

[risk]
# high_threshold = 0.8
# medium_threshold = 0.5   # alerts fire at or above this

[explain]
# top_k = 5

[notify]
# channel = "log"          # log | webhook | outbox | none
# webhook_url = "https://relay.example.com/churn"
# outbox_path = "/var/lib/churnlens/alerts.jsonl"
# max_retries = 2
# backoff_ms = 250
# timeout_secs = 10
# queue_capacity = 64
#
# The webhook posts {subject, body, payload}; subject and body keep the
# email alert format, so an email relay can forward them as-is.
# The webhook bearer token is read from CHURNLENS_WEBHOOK_TOKEN only.
"#;
            std::fs::write(&config_path, example)?;
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.top_k(), 5);
        assert_eq!(config.notify_channel(), NotifyChannel::Log);
        assert_eq!(config.risk_policy().unwrap(), RiskPolicy::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.queue_capacity(), 64);
        assert!(config.model_dir().is_none());
        assert!(config.webhook_token().is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
[model]
dir = "/srv/bundle"

[risk]
high_threshold = 0.9

[explain]
top_k = 3

[notify]
channel = "webhook"
webhook_url = "https://relay.example.com/hook"
max_retries = 4
backoff_ms = 100
"#;
        let config: UserConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model_dir(), Some(Path::new("/srv/bundle")));
        assert_eq!(config.top_k(), 3);
        assert_eq!(config.notify_channel(), NotifyChannel::Webhook);
        assert_eq!(config.webhook_url(), Some("https://relay.example.com/hook"));

        let policy = config.risk_policy().unwrap();
        assert_eq!(policy.high_threshold, 0.9);
        assert_eq!(policy.medium_threshold, 0.5);

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries, 4);
        assert_eq!(retry.backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_token_is_never_read_from_file() {
        let toml_str = r#"
webhook_token = "from-file"

[notify]
webhook_token = "also-from-file"
channel = "webhook"
"#;
        let config: UserConfig = toml::from_str(toml_str).unwrap();
        assert!(config.webhook_token().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config: UserConfig = toml::from_str(
            r#"
[model]
dir = "/from/file"
[notify]
webhook_url = "https://file.example.com"
"#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                (ENV_MODEL_DIR, "/from/env"),
                (ENV_WEBHOOK_URL, "https://env.example.com"),
                (ENV_NOTIFY_CHANNEL, "outbox"),
                (ENV_WEBHOOK_TOKEN, "tok-123"),
            ]))
            .unwrap();

        assert_eq!(config.model_dir(), Some(Path::new("/from/env")));
        assert_eq!(config.webhook_url(), Some("https://env.example.com"));
        assert_eq!(config.notify_channel(), NotifyChannel::Outbox);
        assert_eq!(config.webhook_token(), Some("tok-123"));
    }

    #[test]
    fn test_invalid_env_channel() {
        let mut config = UserConfig::default();
        assert!(config
            .apply_env(env(&[(ENV_NOTIFY_CHANNEL, "carrier-pigeon")]))
            .is_err());
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = UserConfig::default();
        config
            .apply_env(env(&[(ENV_MODEL_DIR, "  "), (ENV_WEBHOOK_TOKEN, "")]))
            .unwrap();
        assert!(config.model_dir().is_none());
        assert!(config.webhook_token().is_none());
    }

    #[test]
    fn test_invalid_risk_section() {
        let config: UserConfig =
            toml::from_str("[risk]\nhigh_threshold = 0.4\nmedium_threshold = 0.6").unwrap();
        assert!(config.risk_policy().is_err());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let bad_toml = "this is [[ not valid toml {{{}}}";
        assert!(toml::from_str::<UserConfig>(bad_toml).is_err());
    }

    #[test]
    fn test_merge_overrides_set_fields() {
        let mut base: UserConfig =
            toml::from_str("[explain]\ntop_k = 3\n[notify]\nchannel = \"log\"").unwrap();
        let other: UserConfig = toml::from_str("[notify]\nchannel = \"none\"").unwrap();
        base.merge(other);
        assert_eq!(base.top_k(), 3);
        assert_eq!(base.notify_channel(), NotifyChannel::None);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(UserConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_show_never_contains_token() {
        let mut config = UserConfig::default();
        config
            .apply_env(env(&[(ENV_WEBHOOK_TOKEN, "very-secret")]))
            .unwrap();
        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("very-secret"));
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[test]
    fn test_user_config_path() {
        if let Some(p) = UserConfig::user_config_path() {
            assert!(p.ends_with("churnlens/config.toml"));
        }
    }
}
