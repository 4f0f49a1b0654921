use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::sink::Sink;
use super::{Claim, OutboxError, OutboxRecord, OutboxStatus, OutboxStore, OutboxTable, Transition};

// ============================================================================
// Outbox Relay - drains one outbox table into one sink
// ============================================================================
//
// One cycle:
//   1. fail PENDING records already past the attempt limit
//   2. claim a batch of PENDING records (skip-locked, leased)
//   3. for each record, independently:
//        re-read -> check the lease is still ours -> deliver
//        -> compare-and-swap the outcome
//   4. log a summary
//
// No database lock is held while the sink runs: the claim is a lease, the
// re-read and the final update are separate statements. A record whose
// lease ran out mid-batch is skipped and left to whoever claims it next.
//
// ============================================================================

/// Minimum spacing between outbox stats queries.
const STATS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Records claimed per cycle
    pub batch_size: usize,
    /// Delay between the end of one cycle and the start of the next
    pub poll_interval: Duration,
    /// Failed deliveries before a record becomes FAILED
    pub max_attempts: i32,
    /// How long a claim shields a record from other relays
    pub claim_lease: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(5),
            max_attempts: 5,
            claim_lease: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Stretch the lease so a full batch of deliveries, each allowed
    /// `delivery_timeout`, fits inside it.
    pub fn fit_lease_to(mut self, delivery_timeout: Duration) -> Self {
        let batch = u32::try_from(self.batch_size).unwrap_or(u32::MAX);
        let needed = delivery_timeout.saturating_mul(batch);
        if self.claim_lease < needed {
            tracing::info!(
                configured_secs = self.claim_lease.as_secs(),
                extended_secs = needed.as_secs(),
                batch_size = self.batch_size,
                "Claim lease shorter than one batch of deliveries, extending it"
            );
            self.claim_lease = needed;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Sent,
    Requeued,
    Failed,
    /// Record was no longer PENDING, or no longer ours, when re-read
    Skipped,
    /// Version or claim moved under us, update dropped
    Conflict,
    /// Store error while re-reading or committing
    Error,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Sent => "sent",
            RecordOutcome::Requeued => "requeued",
            RecordOutcome::Failed => "failed",
            RecordOutcome::Skipped => "skipped",
            RecordOutcome::Conflict => "conflict",
            RecordOutcome::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: usize,
    pub sent: usize,
    pub requeued: usize,
    pub failed: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Sent => self.sent += 1,
            RecordOutcome::Requeued => self.requeued += 1,
            RecordOutcome::Failed => self.failed += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Conflict => self.conflicts += 1,
            RecordOutcome::Error => self.errors += 1,
        }
    }
}

pub struct OutboxRelay {
    outbox: OutboxTable,
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn Sink>,
    config: RelayConfig,
    claimant: String,
    metrics: Option<Arc<Metrics>>,
    stats_refreshed: Mutex<Option<Instant>>,
}

impl OutboxRelay {
    pub fn new(
        outbox: OutboxTable,
        store: Arc<dyn OutboxStore>,
        sink: Arc<dyn Sink>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            store,
            sink,
            config,
            claimant: format!("{}-{}", outbox.label(), Uuid::new_v4()),
            metrics: None,
            stats_refreshed: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn outbox(&self) -> OutboxTable {
        self.outbox
    }

    pub fn claimant(&self) -> &str {
        &self.claimant
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn claim(&self) -> Claim {
        Claim {
            claimant: self.claimant.clone(),
            lease: self.config.claim_lease,
            max_attempts: self.config.max_attempts,
        }
    }

    /// Run one claim-and-deliver pass.
    ///
    /// Only a failure to claim is returned as an error; every per-record
    /// problem is folded into the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, OutboxError> {
        let started = Instant::now();
        let settled = self.settle_exhausted().await;

        let batch = self.store.claim_pending(&self.claim(), self.config.batch_size).await?;
        let mut report = CycleReport {
            claimed: batch.len(),
            failed: settled,
            ..Default::default()
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_claimed(self.outbox.label(), batch.len());
        }

        for record in batch {
            let outcome = self.process_record(record).await;
            report.record(outcome);
            if let Some(metrics) = &self.metrics {
                metrics.record_outcome(self.outbox.label(), outcome);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(self.outbox.label(), started.elapsed().as_secs_f64());
            self.refresh_stats(metrics).await;
        }

        if report.claimed > 0 {
            tracing::info!(
                outbox = self.outbox.label(),
                claimed = report.claimed,
                sent = report.sent,
                requeued = report.requeued,
                failed = report.failed,
                skipped = report.skipped,
                conflicts = report.conflicts,
                errors = report.errors,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Outbox cycle finished"
            );
        } else {
            tracing::debug!(outbox = self.outbox.label(), "Outbox cycle found nothing to send");
        }

        Ok(report)
    }

    /// Drive a single claimed record to its next state.
    pub async fn process_record(&self, claimed: OutboxRecord) -> RecordOutcome {
        let record = match self.store.fetch(claimed.id).await {
            Ok(Some(current)) if current.status != OutboxStatus::Pending => {
                tracing::info!(
                    record_id = %claimed.id,
                    status = %current.status,
                    "Record is no longer PENDING, skipping"
                );
                return RecordOutcome::Skipped;
            }
            Ok(Some(current)) if !current.is_held_by(&self.claimant, Utc::now()) => {
                tracing::warn!(
                    record_id = %claimed.id,
                    claimed_by = ?current.claimed_by,
                    "Claim on record expired, skipping"
                );
                return RecordOutcome::Skipped;
            }
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::warn!(record_id = %claimed.id, "Claimed record disappeared, skipping");
                return RecordOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(error = %e, record_id = %claimed.id, "Failed to re-read record");
                return RecordOutcome::Error;
            }
        };

        let started = Instant::now();
        let delivery = self.sink.deliver(&record).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_delivery(self.outbox.label(), started.elapsed().as_secs_f64());
        }

        let transition = match &delivery {
            Ok(()) => record.after_success(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    record_id = %record.id,
                    sink = self.sink.name(),
                    attempts = record.attempts,
                    "Delivery failed"
                );
                record.after_failure(self.config.max_attempts)
            }
        };

        self.commit(&record, transition).await
    }

    async fn commit(&self, record: &OutboxRecord, transition: Transition) -> RecordOutcome {
        match self
            .store
            .commit_outcome(
                record.id,
                &self.claimant,
                record.version,
                transition.status,
                transition.attempts,
            )
            .await
        {
            Ok(true) => {
                let outcome = match transition.status {
                    OutboxStatus::Sent => RecordOutcome::Sent,
                    OutboxStatus::Pending => RecordOutcome::Requeued,
                    OutboxStatus::Failed => RecordOutcome::Failed,
                };
                match outcome {
                    RecordOutcome::Sent => tracing::info!(
                        record_id = %record.id,
                        kind = %record.kind,
                        sink = self.sink.name(),
                        "✅ Record delivered"
                    ),
                    RecordOutcome::Failed => tracing::warn!(
                        record_id = %record.id,
                        attempts = transition.attempts,
                        "Record reached max attempts, marking as FAILED"
                    ),
                    _ => tracing::debug!(
                        record_id = %record.id,
                        attempts = transition.attempts,
                        "Record requeued"
                    ),
                }
                outcome
            }
            Ok(false) => {
                tracing::warn!(
                    record_id = %record.id,
                    expected_version = record.version,
                    "Concurrent modification detected, dropping outcome"
                );
                RecordOutcome::Conflict
            }
            Err(e) => {
                tracing::error!(error = %e, record_id = %record.id, "Failed to commit outcome");
                RecordOutcome::Error
            }
        }
    }

    async fn settle_exhausted(&self) -> usize {
        match self.store.settle_exhausted(self.config.max_attempts).await {
            Ok(0) => 0,
            Ok(settled) => {
                tracing::warn!(
                    outbox = self.outbox.label(),
                    settled,
                    max_attempts = self.config.max_attempts,
                    "Records past the attempt limit marked as FAILED without delivery"
                );
                usize::try_from(settled).unwrap_or(usize::MAX)
            }
            Err(e) => {
                tracing::error!(error = %e, outbox = self.outbox.label(), "Failed to settle exhausted records");
                0
            }
        }
    }

    async fn refresh_stats(&self, metrics: &Metrics) {
        let mut refreshed = self.stats_refreshed.lock().await;
        if refreshed.is_some_and(|at| at.elapsed() < STATS_REFRESH_INTERVAL) {
            return;
        }
        match self.store.stats().await {
            Ok(stats) => {
                metrics.set_outbox_stats(self.outbox.label(), &stats);
                *refreshed = Some(Instant::now());
            }
            Err(e) => tracing::debug!(error = %e, outbox = self.outbox.label(), "Could not refresh outbox stats"),
        }
    }
}
