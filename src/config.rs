use clap::Parser;
use std::time::Duration;

use crate::messaging::broker::ACK_TIMEOUT;
use crate::outbox::RelayConfig;

/// Transactional outbox relay for user events and email notifications.
#[derive(Debug, Clone, Parser)]
#[command(name = "outbox-relay", version, about)]
pub struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKERS", default_value = "127.0.0.1:9092")]
    pub brokers: String,

    #[arg(long, env = "USER_EVENTS_TOPIC", default_value = "user-events")]
    pub user_events_topic: String,

    /// Consumer group of the user-event listener
    #[arg(long, env = "CONSUMER_GROUP", default_value = "notification-service")]
    pub consumer_group: String,

    /// Mail gateway URL. Without it, emails are written to the log.
    #[arg(long, env = "MAIL_ENDPOINT")]
    pub mail_endpoint: Option<String>,

    #[arg(long, env = "MAIL_TIMEOUT_SECS", default_value_t = 10)]
    pub mail_timeout_secs: u64,

    /// Records claimed per relay cycle
    #[arg(long, env = "OUTBOX_BATCH_SIZE", default_value_t = 20)]
    pub batch_size: usize,

    #[arg(long, env = "EVENT_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub event_poll_interval_secs: u64,

    #[arg(long, env = "EMAIL_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub email_poll_interval_secs: u64,

    /// Failed deliveries before a record is marked FAILED
    #[arg(long, env = "OUTBOX_MAX_ATTEMPTS", default_value_t = 5, value_parser = clap::value_parser!(i32).range(1..))]
    pub max_attempts: i32,

    /// Seconds a claim shields a record from other relay instances. Raised
    /// automatically when shorter than one batch of sink timeouts.
    #[arg(long, env = "OUTBOX_CLAIM_LEASE_SECS", default_value_t = 60)]
    pub claim_lease_secs: u64,

    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,
}

impl Args {
    pub fn event_relay_config(&self) -> RelayConfig {
        self.relay_config(self.event_poll_interval_secs)
            .fit_lease_to(ACK_TIMEOUT)
    }

    pub fn email_relay_config(&self) -> RelayConfig {
        self.relay_config(self.email_poll_interval_secs)
            .fit_lease_to(self.mail_timeout())
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_secs(self.mail_timeout_secs)
    }

    fn relay_config(&self, poll_interval_secs: u64) -> RelayConfig {
        RelayConfig {
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_attempts: self.max_attempts,
            claim_lease: Duration::from_secs(self.claim_lease_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_defaults() {
        let args = Args::parse_from(["outbox-relay", "--database-url", "postgres://localhost/test"]);

        let events = args.event_relay_config();
        let defaults = RelayConfig::default();
        assert_eq!(events.batch_size, defaults.batch_size);
        assert_eq!(events.poll_interval, defaults.poll_interval);
        assert_eq!(events.max_attempts, defaults.max_attempts);
        assert!(args.mail_endpoint.is_none());

        let email = args.email_relay_config();
        assert_eq!(email.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_lease_covers_a_full_batch_of_timeouts() {
        let args = Args::parse_from(["outbox-relay", "--database-url", "postgres://localhost/test"]);

        // 20 records x 5s broker ack, 20 records x 10s mail timeout
        assert_eq!(args.event_relay_config().claim_lease, Duration::from_secs(100));
        assert_eq!(args.email_relay_config().claim_lease, Duration::from_secs(200));

        let generous = Args::parse_from([
            "outbox-relay",
            "--database-url",
            "postgres://localhost/test",
            "--claim-lease-secs",
            "600",
        ]);
        assert_eq!(generous.email_relay_config().claim_lease, Duration::from_secs(600));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "outbox-relay",
            "--database-url",
            "postgres://localhost/test",
            "--batch-size",
            "50",
            "--max-attempts",
            "3",
            "--email-poll-interval-secs",
            "2",
        ]);

        let email = args.email_relay_config();
        assert_eq!(email.batch_size, 50);
        assert_eq!(email.max_attempts, 3);
        assert_eq!(email.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_max_attempts_is_rejected() {
        let result = Args::try_parse_from([
            "outbox-relay",
            "--database-url",
            "postgres://localhost/test",
            "--max-attempts",
            "0",
        ]);
        assert!(result.is_err());
    }
}
