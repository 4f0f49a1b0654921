use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{Sink, SinkError};
use crate::models::EmailMessage;
use crate::outbox::OutboxRecord;

/// Performs one mail-send call. Implementations must not retry.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &EmailMessage) -> Result<(), SinkError>;
}

// ============================================================================
// Transports
// ============================================================================

/// POSTs the message as JSON to a mail gateway.
pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
}

impl HttpMailTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Transport(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Writes messages to the log. Used when no mail gateway is configured.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), SinkError> {
        tracing::info!(
            recipient = %message.recipient,
            subject = %message.subject,
            body = %message.body,
            "📧 Email sent"
        );
        Ok(())
    }
}

// ============================================================================
// Sink
// ============================================================================

pub struct EmailSink {
    transport: Arc<dyn MailTransport>,
    timeout: Duration,
}

impl EmailSink {
    pub fn new(transport: Arc<dyn MailTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl Sink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, record: &OutboxRecord) -> Result<(), SinkError> {
        let message: EmailMessage = serde_json::from_str(&record.payload)
            .map_err(|e| SinkError::InvalidPayload(e.to_string()))?;

        tracing::debug!(
            record_id = %record.id,
            transport = self.transport.name(),
            recipient = %message.recipient,
            "Sending email"
        );

        match tokio::time::timeout(self.timeout, self.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    record_id = %record.id,
                    transport = self.transport.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Mail transport timed out"
                );
                Err(SinkError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::NewOutboxRecord;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct RecordingTransport {
        delay: Duration,
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingTransport {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> Result<(), SinkError> {
            tokio::time::sleep(self.delay).await;
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn email_record(payload: &str) -> OutboxRecord {
        OutboxRecord::pending(NewOutboxRecord::new("EMAIL", payload), Utc::now())
    }

    #[tokio::test]
    async fn test_delivers_parsed_message() {
        let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
        let sink = EmailSink::new(transport.clone(), Duration::from_secs(1));

        sink.deliver(&email_record(
            r#"{"recipient":"a@example.com","subject":"Hi","body":"Hello"}"#,
        ))
        .await
        .unwrap();

        let sent = transport.sent.lock().await;
        assert_eq!(
            sent.as_slice(),
            &[EmailMessage {
                recipient: "a@example.com".to_string(),
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_delivery_failure() {
        let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
        let sink = EmailSink::new(transport.clone(), Duration::from_secs(1));

        let result = sink.deliver(&email_record(r#"{"recipient":"a@example.com"}"#)).await;
        assert!(matches!(result, Err(SinkError::InvalidPayload(_))));
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_transport_times_out() {
        let transport = Arc::new(RecordingTransport::new(Duration::from_millis(200)));
        let sink = EmailSink::new(transport, Duration::from_millis(20));

        let result = sink
            .deliver(&email_record(r#"{"recipient":"a@b.c","subject":"s","body":"b"}"#))
            .await;
        assert!(matches!(result, Err(SinkError::Timeout(_))));
    }
}
