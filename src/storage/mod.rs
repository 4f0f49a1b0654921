// Storage backends implementing the outbox and user ports.
//
// - memory   - in-process, used by tests
// - postgres - sqlx, skip-locked claims

pub mod memory;
pub mod postgres;

pub use memory::{MemoryDatabase, MemoryOutboxStore, MemoryTransaction};
pub use postgres::{PgDatabase, PgTransaction, PostgresOutboxStore};
