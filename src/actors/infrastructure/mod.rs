// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - relay_actor    - schedules cycles of one OutboxRelay
// - health_monitor - aggregates component health
// - supervisor     - starts and stops the actor tree
//
// ============================================================================

mod health_monitor;
mod relay_actor;
mod supervisor;

pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use relay_actor::{RelayActor, RunCycle};
pub use supervisor::RelaySupervisor;
