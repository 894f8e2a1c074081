//! Background alert delivery
//!
//! ```text
//! predict ──try_send──▶ [bounded queue] ──▶ worker ──▶ NotificationSink
//!                              │                 └─ retry with backoff
//!                              └─ full: drop + warn
//! ```
//!
//! `dispatch` never blocks. `shutdown` closes the queue and waits a bounded
//! time for the worker to drain it; alerts still queued or in flight at that
//! point are reported as `pending`.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{NotificationSink, SendError};
use crate::alert::AlertPayload;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << retry.min(16))
    }

    /// Worst-case time to deliver one alert when each attempt may take up
    /// to `per_attempt`: every attempt plus every backoff sleep.
    pub fn delivery_budget(&self, per_attempt: Duration) -> Duration {
        let attempts = per_attempt.saturating_mul(self.max_retries.saturating_add(1));
        (0..self.max_retries)
            .map(|retry| self.delay(retry))
            .fold(attempts, Duration::saturating_add)
    }
}

/// Outcome counters for one dispatcher lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
    /// Accepted but not yet finished (queued or in flight)
    pub pending: usize,
}

impl DeliveryStats {
    /// Alerts that did not reach the sink
    pub fn undelivered(&self) -> usize {
        self.failed + self.dropped + self.pending
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
    pending: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

/// Owns the delivery thread and the queue feeding it
pub struct AlertDispatcher {
    tx: Option<Sender<AlertPayload>>,
    done_rx: Receiver<()>,
    counters: Arc<Counters>,
    sink_name: &'static str,
}

impl AlertDispatcher {
    /// Start the worker thread.
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        capacity: usize,
        retry: RetryPolicy,
    ) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<AlertPayload>(capacity.max(1));
        let (done_tx, done_rx) = bounded::<()>(1);
        let counters = Arc::new(Counters::default());
        let sink_name = sink.name();

        let worker_counters = Arc::clone(&counters);
        thread::Builder::new()
            .name("churnlens-notify".to_string())
            .spawn(move || {
                for payload in rx.iter() {
                    let outcome = deliver(sink.as_ref(), &payload, retry);
                    worker_counters.pending.fetch_sub(1, Ordering::SeqCst);
                    match outcome {
                        Ok(attempts) => {
                            worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                            info!(
                                sink = sink.name(),
                                alert_id = %payload.id,
                                attempts,
                                "alert delivered"
                            );
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            error!(
                                sink = sink.name(),
                                alert_id = %payload.id,
                                "alert delivery failed: {e}"
                            );
                        }
                    }
                }
                let _ = done_tx.send(());
            })?;

        debug!(sink = sink_name, capacity, "alert dispatcher started");
        Ok(Self {
            tx: Some(tx),
            done_rx,
            counters,
            sink_name,
        })
    }

    /// Queue an alert without blocking. Returns false if it was dropped.
    pub fn dispatch(&self, payload: AlertPayload) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        // Counted before the send so the worker never decrements first
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        let result = tx.try_send(payload);
        if result.is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        }
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(payload)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sink = self.sink_name,
                    alert_id = %payload.id,
                    "alert queue full, dropping alert"
                );
                false
            }
            Err(TrySendError::Disconnected(payload)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(alert_id = %payload.id, "alert worker stopped, dropping alert");
                false
            }
        }
    }

    /// Counters so far
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Close the queue and wait up to `timeout` for queued alerts to finish.
    pub fn shutdown(mut self, timeout: Duration) -> DeliveryStats {
        drop(self.tx.take());
        let finished = self.done_rx.recv_timeout(timeout).is_ok();
        let stats = self.counters.snapshot();
        if !finished {
            warn!(
                sink = self.sink_name,
                timeout_ms = timeout.as_millis() as u64,
                pending = stats.pending,
                "alert delivery still in progress at shutdown"
            );
        }
        stats
    }
}

/// Send with retries; returns the number of attempts on success.
fn deliver(
    sink: &dyn NotificationSink,
    payload: &AlertPayload,
    retry: RetryPolicy,
) -> Result<u32, SendError> {
    let subject = payload.subject();
    let body = payload.body();
    let mut attempt = 0;

    loop {
        match sink.send(subject, &body, payload) {
            Ok(()) => return Ok(attempt + 1),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay(attempt);
                warn!(
                    sink = sink.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "alert send failed, retrying: {e}"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
