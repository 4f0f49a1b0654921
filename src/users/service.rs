use uuid::Uuid;

use super::{UserError, UserTransaction};
use crate::models::{User, UserEvent, UserEventKind};
use crate::outbox::{with_transaction, NewOutboxRecord, OutboxTable, OutboxWriter, UnitOfWork};

// ============================================================================
// User Service
// ============================================================================
//
// Every mutation runs in ONE transaction:
//   business write (users)  +  outbox append (user_outbox_events)
//
// Either both commit or neither does. An outbox failure fails the request.
//
// ============================================================================

pub struct UserService<D> {
    db: D,
    writer: OutboxWriter,
}

impl<D> UserService<D>
where
    D: UnitOfWork,
    D::Tx: UserTransaction,
{
    pub fn new(db: D) -> Self {
        Self {
            db,
            writer: OutboxWriter::new(OutboxTable::UserEvents),
        }
    }

    pub async fn create_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        age: Option<i32>,
    ) -> Result<User, UserError> {
        let user = User {
            id: Uuid::now_v7(),
            name: name.into(),
            email: email.into(),
            age,
        };
        let writer = self.writer;

        let user = with_transaction::<_, User, UserError, _>(&self.db, move |tx| {
            Box::pin(async move {
                if tx.email_in_use(&user.email, None).await? {
                    return Err(UserError::EmailInUse(user.email));
                }
                tx.save_user(&user).await?;
                writer.append(tx, event_record(&user, UserEventKind::Created)?).await?;
                Ok(user)
            })
        })
        .await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn update_user(
        &self,
        id: Uuid,
        name: impl Into<String>,
        email: impl Into<String>,
        age: Option<i32>,
    ) -> Result<User, UserError> {
        let name = name.into();
        let email = email.into();
        let writer = self.writer;

        let user = with_transaction::<_, User, UserError, _>(&self.db, move |tx| {
            Box::pin(async move {
                let mut user = tx.find_user(id).await?.ok_or(UserError::NotFound(id))?;
                if tx.email_in_use(&email, Some(id)).await? {
                    return Err(UserError::EmailInUse(email));
                }

                user.name = name;
                user.email = email;
                user.age = age;

                tx.save_user(&user).await?;
                writer.append(tx, event_record(&user, UserEventKind::Updated)?).await?;
                Ok(user)
            })
        })
        .await?;

        tracing::info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), UserError> {
        let writer = self.writer;

        with_transaction::<_, (), UserError, _>(&self.db, move |tx| {
            Box::pin(async move {
                let user = tx.find_user(id).await?.ok_or(UserError::NotFound(id))?;
                tx.delete_user(id).await?;
                writer.append(tx, event_record(&user, UserEventKind::Deleted)?).await?;
                Ok(())
            })
        })
        .await?;

        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn find_user(&self, id: Uuid) -> Result<User, UserError> {
        // Read-only; the transaction is dropped, not committed.
        let mut tx = self.db.begin().await?;
        tx.find_user(id).await?.ok_or(UserError::NotFound(id))
    }
}

fn event_record(user: &User, kind: UserEventKind) -> Result<NewOutboxRecord, UserError> {
    let event = UserEvent::for_user(user, kind);
    Ok(NewOutboxRecord::json(kind.as_str(), &event)?.with_aggregate(user.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::OutboxStatus;
    use crate::storage::MemoryDatabase;

    fn service() -> (MemoryDatabase, UserService<MemoryDatabase>) {
        let db = MemoryDatabase::new();
        (db.clone(), UserService::new(db))
    }

    #[tokio::test]
    async fn test_create_writes_user_and_event_together() {
        let (db, service) = service();

        let user = service
            .create_user("alice", "alice@example.com", Some(30))
            .await
            .unwrap();

        assert_eq!(db.users().await, vec![user.clone()]);
        let records = db.records(OutboxTable::UserEvents).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "CREATED");
        assert_eq!(records[0].aggregate_id, Some(user.id));
        assert_eq!(records[0].status, OutboxStatus::Pending);

        let event: UserEvent = serde_json::from_str(&records[0].payload).unwrap();
        assert_eq!(event.subject_id, user.id);
        assert_eq!(event.contact_ref, "alice@example.com");
        assert_eq!(event.event_kind, UserEventKind::Created);
    }

    #[tokio::test]
    async fn test_outbox_failure_rolls_back_user() {
        let (db, service) = service();
        db.fail_next_outbox_insert().await;

        let result = service.create_user("bob", "bob@example.com", None).await;

        assert!(matches!(result, Err(UserError::Outbox(_))));
        assert!(db.users().await.is_empty());
        assert!(db.records(OutboxTable::UserEvents).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_writes_nothing() {
        let (db, service) = service();
        service.create_user("carol", "carol@example.com", None).await.unwrap();

        let result = service.create_user("carol2", "carol@example.com", None).await;

        assert!(matches!(result, Err(UserError::EmailInUse(email)) if email == "carol@example.com"));
        assert_eq!(db.users().await.len(), 1);
        assert_eq!(db.records(OutboxTable::UserEvents).await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeping_own_email_is_allowed() {
        let (db, service) = service();
        let user = service.create_user("dave", "dave@example.com", Some(40)).await.unwrap();

        let updated = service
            .update_user(user.id, "David", "dave@example.com", Some(41))
            .await
            .unwrap();

        assert_eq!(updated.name, "David");
        assert_eq!(service.find_user(user.id).await.unwrap(), updated);
        let kinds: Vec<String> = db
            .records(OutboxTable::UserEvents)
            .await
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec!["CREATED", "UPDATED"]);
    }

    #[tokio::test]
    async fn test_update_to_taken_email_is_rejected() {
        let (_db, service) = service();
        service.create_user("erin", "erin@example.com", None).await.unwrap();
        let frank = service.create_user("frank", "frank@example.com", None).await.unwrap();

        let result = service
            .update_user(frank.id, "frank", "erin@example.com", None)
            .await;

        assert!(matches!(result, Err(UserError::EmailInUse(_))));
        assert_eq!(service.find_user(frank.id).await.unwrap().email, "frank@example.com");
    }

    #[tokio::test]
    async fn test_delete_emits_event_with_last_known_contact() {
        let (db, service) = service();
        let user = service.create_user("gina", "gina@example.com", None).await.unwrap();

        service.delete_user(user.id).await.unwrap();

        assert!(db.users().await.is_empty());
        let records = db.records(OutboxTable::UserEvents).await;
        let deleted: UserEvent = serde_json::from_str(&records[1].payload).unwrap();
        assert_eq!(deleted.event_kind, UserEventKind::Deleted);
        assert_eq!(deleted.contact_ref, "gina@example.com");
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let (db, service) = service();
        let id = Uuid::new_v4();

        assert!(matches!(service.delete_user(id).await, Err(UserError::NotFound(x)) if x == id));
        assert!(matches!(
            service.update_user(id, "x", "x@example.com", None).await,
            Err(UserError::NotFound(_))
        ));
        assert!(db.records(OutboxTable::UserEvents).await.is_empty());
    }
}
