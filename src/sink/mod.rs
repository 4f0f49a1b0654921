use async_trait::async_trait;
use std::time::Duration;

use crate::outbox::OutboxRecord;

// ============================================================================
// Sinks - where relayed records go
// ============================================================================
//
// - EventSink - broker topic, keyed by the record's aggregate id
// - EmailSink - mail transport, one call per record
//
// The relay knows only the `Sink` trait. Any error counts as one failed
// attempt; sinks never retry internally.
//
// ============================================================================

pub mod email_sink;
pub mod event_sink;

pub use email_sink::{EmailSink, HttpMailTransport, LogMailTransport, MailTransport};
pub use event_sink::EventSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Hand the record's payload to the transport. Returns once the
    /// transport acknowledged it.
    async fn deliver(&self, record: &OutboxRecord) -> Result<(), SinkError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::outbox::{OutboxStatus, OutboxStore};
    use crate::storage::MemoryOutboxStore;
    use tokio::sync::Mutex;

    pub enum SinkScript {
        AlwaysOk,
        AlwaysFail,
        /// Fail the first `n` deliveries, then succeed
        FailFirst(usize),
        /// Simulate a second relay committing the same record mid-delivery
        BumpVersionThenOk(MemoryOutboxStore),
    }

    /// Sink that records every payload it is handed.
    pub struct ScriptedSink {
        script: SinkScript,
        delivered: Mutex<Vec<String>>,
    }

    impl ScriptedSink {
        pub fn new(script: SinkScript) -> Self {
            Self {
                script,
                delivered: Mutex::new(Vec::new()),
            }
        }

        pub async fn delivered(&self) -> Vec<String> {
            self.delivered.lock().await.clone()
        }
    }

    #[async_trait]
    impl Sink for ScriptedSink {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn deliver(&self, record: &OutboxRecord) -> Result<(), SinkError> {
            let calls = {
                let mut delivered = self.delivered.lock().await;
                delivered.push(record.payload.clone());
                delivered.len()
            };

            match &self.script {
                SinkScript::AlwaysOk => Ok(()),
                SinkScript::AlwaysFail => Err(SinkError::Transport("scripted failure".into())),
                SinkScript::FailFirst(n) if calls <= *n => {
                    Err(SinkError::Transport(format!("scripted failure {}", calls)))
                }
                SinkScript::FailFirst(_) => Ok(()),
                SinkScript::BumpVersionThenOk(store) => {
                    let claimant = record.claimed_by.clone().unwrap_or_default();
                    store
                        .commit_outcome(
                            record.id,
                            &claimant,
                            record.version,
                            OutboxStatus::Pending,
                            record.attempts + 1,
                        )
                        .await
                        .map_err(|e| SinkError::Transport(e.to_string()))?;
                    Ok(())
                }
            }
        }
    }
}
