use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::OutboxError;

// ============================================================================
// Outbox Record - durable unit of pending work
// ============================================================================
//
// Lifecycle:
//   PENDING --deliver ok---------------------> SENT    (terminal)
//   PENDING --deliver err, attempts < max----> PENDING (requeued)
//   PENDING --deliver err, attempts >= max---> FAILED  (terminal)
//
// Every status/attempts change bumps `version`; stores only accept a change
// whose expected version matches the stored one.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SENT" => Ok(OutboxStatus::Sent),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(OutboxError::InvalidStatus(other.to_string())),
        }
    }
}

/// The two outbox instances this service owns, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxTable {
    UserEvents,
    Email,
}

impl OutboxTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            OutboxTable::UserEvents => "user_outbox_events",
            OutboxTable::Email => "email_outbox",
        }
    }

    /// Short name used in logs, metric labels and claimant ids.
    pub fn label(&self) -> &'static str {
        match self {
            OutboxTable::UserEvents => "user_events",
            OutboxTable::Email => "email",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub aggregate_id: Option<Uuid>,
    pub kind: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

/// Status and attempt count a record should move to after one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: OutboxStatus,
    pub attempts: i32,
}

impl OutboxRecord {
    pub fn pending(new: NewOutboxRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            aggregate_id: new.aggregate_id,
            kind: new.kind,
            payload: new.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            claimed_by: None,
            claimed_until: None,
        }
    }

    /// Whether a claimant may take this record at `now`.
    pub fn is_claimable(&self, max_attempts: i32, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && !self.is_exhausted(max_attempts)
            && !self.is_leased(now)
    }

    fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.map_or(false, |until| until >= now)
    }

    /// Whether `claimant` holds a live lease on this record at `now`.
    pub fn is_held_by(&self, claimant: &str, now: DateTime<Utc>) -> bool {
        self.claimed_by.as_deref() == Some(claimant)
            && self.claimed_until.map_or(false, |until| until > now)
    }

    pub fn is_exhausted(&self, max_attempts: i32) -> bool {
        self.attempts >= max_attempts
    }

    /// PENDING with its attempts used up and nobody holding it, e.g. after
    /// the attempt limit was lowered.
    pub fn is_settleable(&self, max_attempts: i32, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.is_exhausted(max_attempts) && !self.is_leased(now)
    }

    pub fn after_success(&self) -> Transition {
        Transition {
            status: OutboxStatus::Sent,
            attempts: self.attempts,
        }
    }

    pub fn after_failure(&self, max_attempts: i32) -> Transition {
        let attempts = self.attempts + 1;
        let status = if attempts >= max_attempts {
            OutboxStatus::Failed
        } else {
            OutboxStatus::Pending
        };
        Transition { status, attempts }
    }
}

/// What a producer hands to `OutboxWriter::append`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxRecord {
    pub aggregate_id: Option<Uuid>,
    pub kind: String,
    pub payload: String,
}

impl NewOutboxRecord {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            aggregate_id: None,
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    pub fn with_aggregate(mut self, aggregate_id: Uuid) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn json<T: Serialize>(kind: impl Into<String>, value: &T) -> Result<Self, OutboxError> {
        Ok(Self::new(kind, serde_json::to_string(value)?))
    }
}
