use chrono::Utc;

use super::{NewOutboxRecord, OutboxError, OutboxRecord, OutboxTable, OutboxTransaction};

/// Appends records to one outbox table through the caller's transaction.
///
/// The writer never commits. If `append` fails the caller must abandon the
/// transaction so the business change is rolled back with it.
#[derive(Debug, Clone, Copy)]
pub struct OutboxWriter {
    table: OutboxTable,
}

impl OutboxWriter {
    pub fn new(table: OutboxTable) -> Self {
        Self { table }
    }

    pub async fn append<T>(&self, tx: &mut T, new: NewOutboxRecord) -> Result<(), OutboxError>
    where
        T: OutboxTransaction,
    {
        let record = OutboxRecord::pending(new, Utc::now());
        tx.insert_outbox(self.table, &record).await?;

        tracing::debug!(
            outbox = self.table.label(),
            record_id = %record.id,
            kind = %record.kind,
            "Staged outbox record"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{OutboxStatus, UnitOfWork};
    use crate::storage::MemoryDatabase;

    #[tokio::test]
    async fn test_append_is_invisible_until_commit() {
        let db = MemoryDatabase::new();
        let writer = OutboxWriter::new(OutboxTable::Email);

        let mut tx = db.begin().await.unwrap();
        writer
            .append(&mut tx, NewOutboxRecord::new("EMAIL", r#"{"recipient":"a@b.c"}"#))
            .await
            .unwrap();
        assert!(db.records(OutboxTable::Email).await.is_empty());

        tx.commit().await.unwrap();
        let records = db.records(OutboxTable::Email).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, OutboxStatus::Pending);
        assert_eq!(records[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_record() {
        let db = MemoryDatabase::new();
        let writer = OutboxWriter::new(OutboxTable::UserEvents);

        {
            let mut tx = db.begin().await.unwrap();
            writer
                .append(&mut tx, NewOutboxRecord::new("CREATED", "{}"))
                .await
                .unwrap();
        }

        assert!(db.records(OutboxTable::UserEvents).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_surfaces_storage_failure() {
        let db = MemoryDatabase::new();
        db.fail_next_outbox_insert().await;
        let writer = OutboxWriter::new(OutboxTable::UserEvents);

        let mut tx = db.begin().await.unwrap();
        let result = writer.append(&mut tx, NewOutboxRecord::new("CREATED", "{}")).await;
        assert!(matches!(result, Err(OutboxError::Storage { .. })));
    }
}
