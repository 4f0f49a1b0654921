use async_trait::async_trait;
use std::sync::Arc;

use super::{Sink, SinkError};
use crate::messaging::BrokerClient;
use crate::outbox::OutboxRecord;

/// Publishes user-event records to a broker topic.
///
/// The message key is the aggregate (user) id so all events of one user land
/// on the same partition. Records without an aggregate fall back to their own
/// id.
pub struct EventSink {
    client: Arc<BrokerClient>,
    topic: String,
}

impl EventSink {
    pub fn new(client: Arc<BrokerClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

pub(crate) fn message_key(record: &OutboxRecord) -> String {
    record.aggregate_id.unwrap_or(record.id).to_string()
}

#[async_trait]
impl Sink for EventSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn deliver(&self, record: &OutboxRecord) -> Result<(), SinkError> {
        let key = message_key(record);
        self.client.publish(&self.topic, &key, &record.payload).await
    }
}
