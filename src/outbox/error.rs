#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid outbox status: {0}")]
    InvalidStatus(String),

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl OutboxError {
    pub fn storage(message: impl Into<String>) -> Self {
        OutboxError::Storage {
            message: message.into(),
        }
    }
}
