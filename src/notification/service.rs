use super::NotificationMessageBuilder;
use crate::models::{UserEvent, EMAIL_KIND};
use crate::outbox::{
    with_transaction, NewOutboxRecord, OutboxError, OutboxTable, OutboxWriter, UnitOfWork,
};

/// Producer of the email outbox: one EMAIL record per consumed user event.
pub struct NotificationService<D> {
    db: D,
    builder: NotificationMessageBuilder,
    writer: OutboxWriter,
}

impl<D: UnitOfWork> NotificationService<D> {
    pub fn new(db: D) -> Self {
        Self {
            db,
            builder: NotificationMessageBuilder,
            writer: OutboxWriter::new(OutboxTable::Email),
        }
    }

    /// Append the notification for `event` and commit. Returns once the
    /// record is durable.
    pub async fn record_notification(&self, event: &UserEvent) -> Result<(), OutboxError> {
        let message = self.builder.build(event);
        let record = NewOutboxRecord::json(EMAIL_KIND, &message)?.with_aggregate(event.subject_id);
        let writer = self.writer;

        with_transaction::<_, (), OutboxError, _>(&self.db, move |tx| {
            Box::pin(async move { writer.append(tx, record).await })
        })
        .await?;

        tracing::info!(
            subject_id = %event.subject_id,
            event_kind = %event.event_kind,
            recipient = %message.recipient,
            "Saved email outbox record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailMessage, UserEventKind};
    use crate::outbox::OutboxStatus;
    use crate::storage::MemoryDatabase;
    use chrono::Utc;
    use uuid::Uuid;

    fn event() -> UserEvent {
        UserEvent {
            subject_id: Uuid::new_v4(),
            subject_name: "john_doe".to_string(),
            contact_ref: "john@example.com".to_string(),
            event_kind: UserEventKind::Created,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_becomes_pending_email() {
        let db = MemoryDatabase::new();
        let service = NotificationService::new(db.clone());
        let event = event();

        service.record_notification(&event).await.unwrap();

        let records = db.records(OutboxTable::Email).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EMAIL_KIND);
        assert_eq!(records[0].aggregate_id, Some(event.subject_id));
        assert_eq!(records[0].status, OutboxStatus::Pending);
        assert_eq!(records[0].attempts, 0);

        let message: EmailMessage = serde_json::from_str(&records[0].payload).unwrap();
        assert_eq!(message.recipient, "john@example.com");
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let db = MemoryDatabase::new();
        db.fail_next_outbox_insert().await;
        let service = NotificationService::new(db.clone());

        assert!(service.record_notification(&event()).await.is_err());
        assert!(db.records(OutboxTable::Email).await.is_empty());
    }
}
