// ============================================================================
// Outbox Core
// ============================================================================
//
// Generic transactional outbox shared by both outbox instances:
// - record/ - OutboxRecord, status machine, transitions
// - store/  - storage ports (claim, fetch, compare-and-swap, transactions)
// - writer/ - appends records inside the caller's transaction
// - relay/  - periodic claim -> deliver -> commit loop body
//
// Storage backends live in `crate::storage`, delivery targets in `crate::sink`.
//
// ============================================================================

mod error;
mod record;
mod relay;
mod store;
mod writer;

pub use error::OutboxError;
pub use record::{NewOutboxRecord, OutboxRecord, OutboxStatus, OutboxTable, Transition};
pub use relay::{CycleReport, OutboxRelay, RecordOutcome, RelayConfig};
pub use store::{with_transaction, Claim, OutboxStats, OutboxStore, OutboxTransaction, UnitOfWork};
pub use writer::OutboxWriter;
