use async_trait::async_trait;
use uuid::Uuid;

use crate::models::User;
use crate::outbox::{OutboxError, OutboxTransaction};

// ============================================================================
// Users - producer of the user-events outbox
// ============================================================================

pub mod errors;
pub mod service;

pub use errors::UserError;
pub use service::UserService;

/// User-table operations available inside an outbox transaction.
#[async_trait]
pub trait UserTransaction: OutboxTransaction {
    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, OutboxError>;

    /// Whether another user (not `except`) already has `email`.
    async fn email_in_use(&mut self, email: &str, except: Option<Uuid>) -> Result<bool, OutboxError>;

    /// Insert or replace by id.
    async fn save_user(&mut self, user: &User) -> Result<(), OutboxError>;

    async fn delete_user(&mut self, id: Uuid) -> Result<bool, OutboxError>;
}
