use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::time::Duration;
use uuid::Uuid;

use super::{OutboxError, OutboxRecord, OutboxStatus, OutboxTable};

// ============================================================================
// Storage Ports
// ============================================================================
//
// OutboxStore       - relay side: claim, re-read and conditionally update
// OutboxTransaction - producer side: stage a record inside a business tx
// UnitOfWork        - opens transactions for producers
//
// ============================================================================

/// Identity and lease a relay presents when claiming records.
#[derive(Debug, Clone)]
pub struct Claim {
    pub claimant: String,
    pub lease: Duration,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `limit` pending records, oldest first.
    ///
    /// Records locked or leased by another claimant are skipped, never waited
    /// on, so concurrent callers always receive disjoint batches.
    async fn claim_pending(
        &self,
        claim: &Claim,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<OutboxRecord>, OutboxError>;

    /// Compare-and-swap on `version`, applied only while `claimant` still
    /// holds the claim. Returns `false` when another writer got there first,
    /// the claim moved to another relay, or the record already left `PENDING`.
    async fn commit_outcome(
        &self,
        id: Uuid,
        claimant: &str,
        expected_version: i32,
        status: OutboxStatus,
        attempts: i32,
    ) -> Result<bool, OutboxError>;

    /// Mark FAILED every unleased PENDING record whose attempts already reach
    /// `max_attempts`, e.g. after the limit was lowered. Returns how many
    /// records were settled.
    async fn settle_exhausted(&self, max_attempts: i32) -> Result<u64, OutboxError>;

    async fn stats(&self) -> Result<OutboxStats, OutboxError>;
}

#[async_trait]
pub trait OutboxTransaction: Send + Sized {
    async fn insert_outbox(
        &mut self,
        table: OutboxTable,
        record: &OutboxRecord,
    ) -> Result<(), OutboxError>;

    async fn commit(self) -> Result<(), OutboxError>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Tx: OutboxTransaction;

    async fn begin(&self) -> Result<Self::Tx, OutboxError>;
}

/// Run `f` inside a fresh transaction and commit it if `f` succeeds.
///
/// On error the transaction is dropped without committing, which rolls back
/// everything `f` staged.
pub async fn with_transaction<U, T, E, F>(uow: &U, f: F) -> Result<T, E>
where
    U: UnitOfWork,
    E: From<OutboxError>,
    F: for<'t> FnOnce(&'t mut U::Tx) -> BoxFuture<'t, Result<T, E>>,
{
    let mut tx = uow.begin().await?;
    let value = f(&mut tx).await?;
    tx.commit().await?;
    Ok(value)
}
