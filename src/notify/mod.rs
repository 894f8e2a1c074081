//! Alert delivery
//!
//! The prediction core never sends anything. It emits an `AlertPayload`,
//! and the `AlertDispatcher` hands it to a `NotificationSink` on a
//! background thread. Delivery failures are logged and counted, never
//! propagated back into the prediction.
//!
//! Every sink receives the same email-format subject and body rendered by
//! `AlertPayload`, so a webhook can front an email relay unchanged.
//!
//! Sinks:
//! - `log`: `tracing` at warn level (default)
//! - `webhook`: JSON POST via ureq, for an email relay or chat hook
//! - `outbox`: one JSON line per alert appended to a local file
//! - `none`: alerts are computed and shown but not delivered

mod dispatcher;
mod outbox;
mod webhook;

pub use dispatcher::{AlertDispatcher, DeliveryStats, RetryPolicy};
pub use outbox::{OutboxRecord, OutboxSink};
pub use webhook::WebhookSink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::alert::AlertPayload;
use crate::config::UserConfig;
use crate::error::{ChurnError, ChurnResult};

/// Errors raised by a sink's transport
#[derive(Error, Debug)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint rejected alert with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SendError {
    /// Transport failures and 5xx responses may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Transport(_) => true,
            SendError::Rejected { status, .. } => *status >= 500,
            SendError::Io(_) | SendError::Encode(_) => false,
        }
    }
}

/// Destination for alert messages
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Deliver one alert. `subject` and `body` are the rendered plain text;
    /// `payload` is the structured form for sinks that forward JSON.
    fn send(&self, subject: &str, body: &str, payload: &AlertPayload) -> Result<(), SendError>;
}

/// Writes alerts to the log at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, subject: &str, body: &str, payload: &AlertPayload) -> Result<(), SendError> {
        warn!(
            alert_id = %payload.id,
            customer_id = %payload.identity.customer_id,
            probability = payload.probability,
            "{subject}\n{body}"
        );
        Ok(())
    }
}

/// Configured delivery channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    #[default]
    Log,
    Webhook,
    Outbox,
    None,
}

impl NotifyChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyChannel::Log => "log",
            NotifyChannel::Webhook => "webhook",
            NotifyChannel::Outbox => "outbox",
            NotifyChannel::None => "none",
        }
    }
}

impl fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyChannel {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(NotifyChannel::Log),
            "webhook" => Ok(NotifyChannel::Webhook),
            "outbox" => Ok(NotifyChannel::Outbox),
            "none" | "off" => Ok(NotifyChannel::None),
            other => Err(ChurnError::Config(format!(
                "unknown notify channel '{other}' (expected log, webhook, outbox or none)"
            ))),
        }
    }
}

/// Build the sink selected by the configuration.
///
/// Returns `None` for the `none` channel.
pub fn build_sink(config: &UserConfig) -> ChurnResult<Option<Arc<dyn NotificationSink>>> {
    let sink: Arc<dyn NotificationSink> = match config.notify_channel() {
        NotifyChannel::None => return Ok(None),
        NotifyChannel::Log => Arc::new(LogSink),
        NotifyChannel::Outbox => Arc::new(OutboxSink::new(config.outbox_path())),
        NotifyChannel::Webhook => {
            let url = config.webhook_url().ok_or_else(|| {
                ChurnError::Config(
                    "notify channel 'webhook' needs [notify] webhook_url or CHURNLENS_WEBHOOK_URL"
                        .to_string(),
                )
            })?;
            Arc::new(WebhookSink::new(
                url,
                config.webhook_token().map(str::to_string),
                config.notify_timeout(),
            ))
        }
    };
    Ok(Some(sink))
}
