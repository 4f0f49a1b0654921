use crate::models::{EmailMessage, UserEvent, UserEventKind};

pub const NOTIFICATION_SUBJECT: &str = "Your account has changed";

/// Turns a user lifecycle event into the email the user receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationMessageBuilder;

impl NotificationMessageBuilder {
    pub fn build(&self, event: &UserEvent) -> EmailMessage {
        let change = match event.event_kind {
            UserEventKind::Created => "created",
            UserEventKind::Updated => "updated",
            UserEventKind::Deleted => "deleted",
        };
        let greeting = if event.subject_name.is_empty() {
            "Hello!".to_string()
        } else {
            format!("Hello, {}!", event.subject_name)
        };

        EmailMessage {
            recipient: event.contact_ref.clone(),
            subject: NOTIFICATION_SUBJECT.to_string(),
            body: format!("{} Your account has been {}.", greeting, change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(name: &str, kind: UserEventKind) -> UserEvent {
        UserEvent {
            subject_id: Uuid::new_v4(),
            subject_name: name.to_string(),
            contact_ref: "john@example.com".to_string(),
            event_kind: kind,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_message_names_user_and_change() {
        let message = NotificationMessageBuilder.build(&event("john_doe", UserEventKind::Deleted));

        assert_eq!(message.recipient, "john@example.com");
        assert_eq!(message.subject, NOTIFICATION_SUBJECT);
        assert_eq!(message.body, "Hello, john_doe! Your account has been deleted.");
    }

    #[test]
    fn test_message_without_name() {
        let message = NotificationMessageBuilder.build(&event("", UserEventKind::Created));
        assert_eq!(message.body, "Hello! Your account has been created.");
    }
}
