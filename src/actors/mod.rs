// ============================================================================
// Actors Module
// ============================================================================
//
// Actors run the relays; the outbox core itself knows nothing about them.
//
// Structure:
// - core/           - health types shared by all actors
// - infrastructure/ - relay actors, health monitor, supervisor
//
// ============================================================================

pub mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    GetSystemHealth, HealthMonitorActor, RelayActor, RelaySupervisor, RunCycle, SystemHealth,
    UpdateHealth,
};
