use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::User;
use crate::outbox::{
    Claim, OutboxError, OutboxRecord, OutboxStats, OutboxStatus, OutboxStore, OutboxTable,
    OutboxTransaction, UnitOfWork,
};
use crate::users::UserTransaction;

// ============================================================================
// In-Memory Database
// ============================================================================
//
// Process-local backend with the same contract as PostgreSQL:
// - transactions stage writes and apply them atomically on commit
// - claims are leases; live leases are skipped, never waited on
// - commit_outcome is a compare-and-swap on `version` and the claimant
//
// Used by tests and for running the relay without infrastructure.
//
// ============================================================================

#[derive(Default)]
struct MemoryState {
    outboxes: HashMap<OutboxTable, Vec<OutboxRecord>>,
    users: HashMap<Uuid, User>,
    failing_outbox_inserts: usize,
    failing_claims: usize,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self, table: OutboxTable) -> MemoryOutboxStore {
        MemoryOutboxStore {
            db: self.clone(),
            table,
        }
    }

    /// Snapshot of one outbox table in insertion order.
    pub async fn records(&self, table: OutboxTable) -> Vec<OutboxRecord> {
        let state = self.state.lock().await;
        state.outboxes.get(&table).cloned().unwrap_or_default()
    }

    pub async fn record(&self, table: OutboxTable, id: Uuid) -> Option<OutboxRecord> {
        let state = self.state.lock().await;
        state
            .outboxes
            .get(&table)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
    }

    /// Insert a record directly, bypassing the writer.
    pub async fn insert_record(&self, table: OutboxTable, record: OutboxRecord) {
        let mut state = self.state.lock().await;
        state.outboxes.entry(table).or_default().push(record);
    }

    pub async fn users(&self) -> Vec<User> {
        let state = self.state.lock().await;
        state.users.values().cloned().collect()
    }

    /// Make the next staged outbox insert fail.
    pub async fn fail_next_outbox_insert(&self) {
        self.state.lock().await.failing_outbox_inserts += 1;
    }

    /// Make the next `claim_pending` call fail.
    pub async fn fail_next_claim(&self) {
        self.state.lock().await.failing_claims += 1;
    }
}

#[async_trait]
impl UnitOfWork for MemoryDatabase {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, OutboxError> {
        Ok(MemoryTransaction {
            db: self.clone(),
            outbox: Vec::new(),
            users: HashMap::new(),
        })
    }
}

// ============================================================================
// Transactions
// ============================================================================

pub struct MemoryTransaction {
    db: MemoryDatabase,
    outbox: Vec<(OutboxTable, OutboxRecord)>,
    /// `None` marks a staged delete
    users: HashMap<Uuid, Option<User>>,
}

#[async_trait]
impl OutboxTransaction for MemoryTransaction {
    async fn insert_outbox(
        &mut self,
        table: OutboxTable,
        record: &OutboxRecord,
    ) -> Result<(), OutboxError> {
        {
            let mut state = self.db.state.lock().await;
            if state.failing_outbox_inserts > 0 {
                state.failing_outbox_inserts -= 1;
                return Err(OutboxError::storage("injected outbox insert failure"));
            }
        }
        self.outbox.push((table, record.clone()));
        Ok(())
    }

    async fn commit(self) -> Result<(), OutboxError> {
        let mut state = self.db.state.lock().await;
        for (id, user) in self.users {
            match user {
                Some(user) => {
                    state.users.insert(id, user);
                }
                None => {
                    state.users.remove(&id);
                }
            }
        }
        for (table, record) in self.outbox {
            state.outboxes.entry(table).or_default().push(record);
        }
        Ok(())
    }
}

#[async_trait]
impl UserTransaction for MemoryTransaction {
    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, OutboxError> {
        if let Some(staged) = self.users.get(&id) {
            return Ok(staged.clone());
        }
        let state = self.db.state.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn email_in_use(&mut self, email: &str, except: Option<Uuid>) -> Result<bool, OutboxError> {
        let state = self.db.state.lock().await;
        let committed = state
            .users
            .values()
            .filter(|u| !self.users.contains_key(&u.id))
            .any(|u| u.email == email && Some(u.id) != except);
        let staged = self
            .users
            .values()
            .flatten()
            .any(|u| u.email == email && Some(u.id) != except);
        Ok(committed || staged)
    }

    async fn save_user(&mut self, user: &User) -> Result<(), OutboxError> {
        self.users.insert(user.id, Some(user.clone()));
        Ok(())
    }

    async fn delete_user(&mut self, id: Uuid) -> Result<bool, OutboxError> {
        let existed = self.find_user(id).await?.is_some();
        self.users.insert(id, None);
        Ok(existed)
    }
}

// ============================================================================
// Relay-side store
// ============================================================================

#[derive(Clone)]
pub struct MemoryOutboxStore {
    db: MemoryDatabase,
    table: OutboxTable,
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn claim_pending(
        &self,
        claim: &Claim,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError> {
        let mut state = self.db.state.lock().await;
        if state.failing_claims > 0 {
            state.failing_claims -= 1;
            return Err(OutboxError::storage("injected claim failure"));
        }

        let now = Utc::now();
        let lease = chrono::Duration::from_std(claim.lease)
            .map_err(|e| OutboxError::storage(format!("invalid lease: {}", e)))?;
        let records = state.outboxes.entry(self.table).or_default();

        let mut candidates: Vec<&mut OutboxRecord> = records
            .iter_mut()
            .filter(|r| r.is_claimable(claim.max_attempts, now))
            .collect();
        candidates.sort_by_key(|r| r.created_at);

        let claimed = candidates
            .into_iter()
            .take(limit)
            .map(|record| {
                record.claimed_by = Some(claim.claimant.clone());
                record.claimed_until = Some(now + lease);
                record.updated_at = now;
                record.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<OutboxRecord>, OutboxError> {
        Ok(self.db.record(self.table, id).await)
    }

    async fn commit_outcome(
        &self,
        id: Uuid,
        claimant: &str,
        expected_version: i32,
        status: OutboxStatus,
        attempts: i32,
    ) -> Result<bool, OutboxError> {
        let mut state = self.db.state.lock().await;
        let record = state
            .outboxes
            .get_mut(&self.table)
            .and_then(|records| records.iter_mut().find(|r| r.id == id));

        match record {
            Some(record)
                if record.version == expected_version
                    && record.status == OutboxStatus::Pending
                    && record.claimed_by.as_deref() == Some(claimant) =>
            {
                record.status = status;
                record.attempts = attempts;
                record.version += 1;
                record.updated_at = Utc::now();
                record.claimed_by = None;
                record.claimed_until = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle_exhausted(&self, max_attempts: i32) -> Result<u64, OutboxError> {
        let mut state = self.db.state.lock().await;
        let now = Utc::now();
        let mut settled = 0;
        for record in state.outboxes.entry(self.table).or_default().iter_mut() {
            if record.is_settleable(max_attempts, now) {
                record.status = OutboxStatus::Failed;
                record.version += 1;
                record.updated_at = now;
                record.claimed_by = None;
                record.claimed_until = None;
                settled += 1;
            }
        }
        Ok(settled)
    }

    async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let state = self.db.state.lock().await;
        let mut stats = OutboxStats::default();
        for record in state.outboxes.get(&self.table).into_iter().flatten() {
            match record.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Sent => stats.sent += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
