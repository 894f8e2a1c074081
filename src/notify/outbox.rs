//! Outbox sink: alerts appended to a local JSONL file
//!
//! Useful when no relay is reachable; another process (or a person) can
//! drain the file later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{NotificationSink, SendError};
use crate::alert::AlertPayload;

/// One line of the outbox file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub written_at: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub payload: AlertPayload,
}

#[derive(Debug)]
pub struct OutboxSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record, skipping malformed lines
    pub fn load_all(&self) -> std::io::Result<Vec<OutboxRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<OutboxRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl NotificationSink for OutboxSink {
    fn name(&self) -> &'static str {
        "outbox"
    }

    fn send(&self, subject: &str, body: &str, payload: &AlertPayload) -> Result<(), SendError> {
        let record = OutboxRecord {
            written_at: Utc::now(),
            subject: subject.to_string(),
            body: body.to_string(),
            payload: payload.clone(),
        };
        let json = serde_json::to_string(&record)?;

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }
}
