use uuid::Uuid;

use crate::outbox::OutboxError;

// ============================================================================
// User Service Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(Uuid),

    #[error("Email already in use: {0}")]
    EmailInUse(String),

    #[error(transparent)]
    Outbox(#[from] OutboxError),
}
