use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message,
    Offset, TopicPartitionList,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::models::UserEvent;
use crate::notification::NotificationService;
use crate::outbox::UnitOfWork;

// ============================================================================
// User Event Listener
// ============================================================================
//
// Consumes the user-events topic and records one email per event.
//
// Offsets are committed manually, and only after the email outbox
// transaction has committed. A crash between the two replays the message,
// so an event can produce a duplicate email but is never lost.
//
// ============================================================================

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// The parts of a Kafka message the listener needs, copied out so nothing
/// borrowed from the consumer is held across an await.
#[derive(Debug, Clone)]
struct ReceivedMessage {
    topic: String,
    partition: i32,
    offset: i64,
    payload: Option<Vec<u8>>,
}

impl<M: Message> From<&M> for ReceivedMessage {
    fn from(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(|p| p.to_vec()),
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first. Returns `false` on
/// shutdown.
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

pub fn decode_event(payload: Option<&[u8]>) -> Result<UserEvent, String> {
    let bytes = payload.ok_or_else(|| "empty payload".to_string())?;
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}

pub struct UserEventListener<D> {
    consumer: StreamConsumer,
    service: Arc<NotificationService<D>>,
}

impl<D: UnitOfWork> UserEventListener<D> {
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        service: Arc<NotificationService<D>>,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[topic])?;

        tracing::info!(topic = %topic, group_id = %group_id, "Subscribed to user events");
        Ok(Self { consumer, service })
    }

    /// Consume until `shutdown` flips. The message being handled when the
    /// signal arrives is finished first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("🎧 User event listener started");

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = async {
                    self.consumer.recv().await.map(|m| ReceivedMessage::from(&m))
                } => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = %e, "Kafka receive error");
                    if !pause(&mut shutdown, RETRY_DELAY).await {
                        break;
                    }
                    continue;
                }
            };

            if !self.handle(&message, &mut shutdown).await {
                break;
            }
            self.commit(&message);
        }

        tracing::info!("User event listener stopped");
    }

    /// Returns `false` if shutdown interrupted the store retry; the offset
    /// must then stay uncommitted.
    async fn handle(&self, message: &ReceivedMessage, shutdown: &mut watch::Receiver<bool>) -> bool {
        let event = match decode_event(message.payload.as_deref()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    partition = message.partition,
                    offset = message.offset,
                    "Skipping undecodable user event"
                );
                return true;
            }
        };

        tracing::info!(
            subject_id = %event.subject_id,
            event_kind = %event.event_kind,
            "Received user event"
        );

        loop {
            match self.service.record_notification(&event).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        subject_id = %event.subject_id,
                        "Failed to record notification, retrying"
                    );
                    if !pause(shutdown, RETRY_DELAY).await {
                        return false;
                    }
                }
            }
        }
    }

    fn commit(&self, message: &ReceivedMessage) {
        let mut offsets = TopicPartitionList::new();
        let result = offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .and_then(|_| self.consumer.commit(&offsets, CommitMode::Async));

        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                partition = message.partition,
                offset = message.offset,
                "Failed to commit consumer offset"
            );
        }
    }
}
