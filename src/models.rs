use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

/// Business entity owned by the user service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: Option<i32>,
}

// ============================================================================
// Outbox Payloads
// These are serialized into `OutboxRecord::payload` and handed to sinks as-is
// ============================================================================

/// Discriminator stored in `OutboxRecord::kind` for mail-send requests.
pub const EMAIL_KIND: &str = "EMAIL";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserEventKind {
    Created,
    Updated,
    Deleted,
}

impl UserEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserEventKind::Created => "CREATED",
            UserEventKind::Updated => "UPDATED",
            UserEventKind::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for UserEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User lifecycle event published to the broker, keyed by `subject_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserEvent {
    pub subject_id: Uuid,
    #[serde(default)]
    pub subject_name: String,
    pub contact_ref: String,
    pub event_kind: UserEventKind,
    pub timestamp: DateTime<Utc>,
}

impl UserEvent {
    pub fn for_user(user: &User, event_kind: UserEventKind) -> Self {
        Self {
            subject_id: user.id,
            subject_name: user.name.clone(),
            contact_ref: user.email.clone(),
            event_kind,
            timestamp: Utc::now(),
        }
    }
}

/// Mail-send request stored in the email outbox.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_event_wire_format() {
        let user = User {
            id: Uuid::new_v4(),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            age: Some(30),
        };
        let event = UserEvent::for_user(&user, UserEventKind::Deleted);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["subject_id"], user.id.to_string());
        assert_eq!(json["contact_ref"], "alice@example.com");
        assert_eq!(json["event_kind"], "DELETED");
    }

    #[test]
    fn test_user_event_without_name_decodes() {
        let raw = r#"{
            "subject_id": "6f1c1b5e-8f42-4d8e-9a38-8b5b1f8a7c11",
            "contact_ref": "bob@example.com",
            "event_kind": "UPDATED",
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        let event: UserEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_kind, UserEventKind::Updated);
        assert!(event.subject_name.is_empty());
    }
}
