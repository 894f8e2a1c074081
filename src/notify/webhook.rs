//! Webhook sink
//!
//! POSTs `{subject, body, payload}` as JSON. Any 2xx is success. The bearer
//! token is passed in by the caller, which reads it from the environment.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::{NotificationSink, SendError};
use crate::alert::AlertPayload;

#[derive(Serialize)]
struct WebhookBody<'a> {
    subject: &'a str,
    body: &'a str,
    payload: &'a AlertPayload,
}

/// HTTP sink backed by a sync ureq agent
pub struct WebhookSink {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
}

impl fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSink")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self {
            agent,
            url: url.into(),
            token,
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, subject: &str, body: &str, payload: &AlertPayload) -> Result<(), SendError> {
        let message = WebhookBody {
            subject,
            body,
            payload,
        };

        let mut req = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }

        let response = req
            .send_json(&message)
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response.into_body().read_to_string().unwrap_or_default();
            return Err(SendError::Rejected { status, message });
        }

        debug!(url = %self.url, status, alert_id = %payload.id, "webhook accepted alert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CustomerIdentity;
    use crate::risk::RiskCategory;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn payload() -> AlertPayload {
        AlertPayload::new(
            CustomerIdentity {
                name: "Ada".into(),
                customer_id: "0001".into(),
            },
            0.91,
            RiskCategory::High,
            Vec::new(),
            None,
        )
    }

    /// Serve one request with `status`. The handle yields the request head and body.
    fn serve_once(status: &'static str) -> (String, thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope"
            )
            .unwrap();
            stream.flush().unwrap();
            (head, String::from_utf8(body).unwrap())
        });
        (url, handle)
    }

    #[test]
    fn test_posts_json_with_bearer_token() {
        let (url, server) = serve_once("200 OK");
        let sink = WebhookSink::new(url, Some("s3cret".into()), Duration::from_secs(5));
        let p = payload();
        sink.send(p.subject(), &p.body(), &p).unwrap();

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("POST /hook"), "{head}");
        assert!(head.to_ascii_lowercase().contains("authorization: bearer s3cret"));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["subject"], "⚠️ Customer High Churn Risk Alert");
        assert_eq!(json["body"], p.body());
        assert!(json["body"]
            .as_str()
            .unwrap()
            .starts_with("🚨 Customer Churn Alert 🚨\n\nCustomer Name: "));
        assert_eq!(json["payload"]["customer_id"], "0001");
    }

    #[test]
    fn test_non_2xx_is_rejected() {
        let (url, server) = serve_once("503 Service Unavailable");
        let sink = WebhookSink::new(url, None, Duration::from_secs(5));
        let p = payload();
        let err = sink.send(p.subject(), &p.body(), &p).unwrap_err();
        server.join().unwrap();
        match &err {
            SendError::Rejected { status, message } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "nope");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let sink = WebhookSink::new(
            format!("http://127.0.0.1:{port}/hook"),
            None,
            Duration::from_secs(2),
        );
        let p = payload();
        let err = sink.send(p.subject(), &p.body(), &p).unwrap_err();
        assert!(matches!(err, SendError::Transport(_)), "{err:?}");
    }

    #[test]
    fn test_debug_redacts_token() {
        let sink = WebhookSink::new("http://localhost/x", Some("s3cret".into()), Duration::from_secs(1));
        let shown = format!("{sink:?}");
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("<redacted>"));
    }
}
