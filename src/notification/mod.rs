// Notifications - consumes user events, produces the email outbox.

pub mod builder;
pub mod service;

pub use builder::NotificationMessageBuilder;
pub use service::NotificationService;
