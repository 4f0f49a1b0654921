use kameo::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{GetSystemHealth, HealthMonitorActor, RelayActor};
use crate::actors::core::HealthStatus;
use crate::messaging::BrokerClient;
use crate::metrics::Metrics;
use crate::outbox::OutboxRelay;

// ============================================================================
// Relay Supervisor - owns the actor tree
// ============================================================================
//
//   RelaySupervisor
//   ├── HealthMonitorActor
//   ├── RelayActor (user_events)
//   └── RelayActor (email)
//
// Logs system health every 30s and stops everything on shutdown, relays
// first so that their last cycles can still report health.
//
// ============================================================================

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct RelaySupervisor {
    health_monitor: ActorRef<HealthMonitorActor>,
    relays: Vec<ActorRef<RelayActor>>,
    health_log: JoinHandle<()>,
}

impl RelaySupervisor {
    pub fn start(
        relays: Vec<OutboxRelay>,
        broker: Option<Arc<BrokerClient>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        tracing::info!("Starting supervised actors");

        let health_monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(broker, metrics));

        let relays = relays
            .into_iter()
            .map(|relay| RelayActor::spawn(RelayActor::new(relay, Some(health_monitor.clone()))))
            .collect::<Vec<_>>();

        let monitor = health_monitor.clone();
        let health_log = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                match monitor.ask(GetSystemHealth).await {
                    Ok(health) => match health.overall_status {
                        HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
                        HealthStatus::Degraded(ref msg) => {
                            tracing::warn!("System health check: Degraded - {}", msg)
                        }
                        HealthStatus::Unhealthy(ref msg) => {
                            tracing::error!("System health check: Unhealthy - {}", msg)
                        }
                    },
                    Err(_) => {
                        tracing::debug!("Health monitor gone, stopping health log");
                        break;
                    }
                }
            }
        });

        tracing::info!(relays = relays.len(), "✅ All supervised actors started");

        Self {
            health_monitor,
            relays,
            health_log,
        }
    }

    pub fn health_monitor(&self) -> ActorRef<HealthMonitorActor> {
        self.health_monitor.clone()
    }

    /// Stop scheduling cycles. Each relay finishes the cycle it is in.
    pub async fn shutdown(self) {
        tracing::info!("🛑 Stopping relays");
        self.health_log.abort();

        for relay in &self.relays {
            if relay.stop_gracefully().await.is_err() {
                tracing::debug!("Relay already stopped");
            }
        }
        for relay in &self.relays {
            wait_until_stopped(relay).await;
        }

        if self.health_monitor.stop_gracefully().await.is_err() {
            tracing::debug!("Health monitor already stopped");
        }
        wait_until_stopped(&self.health_monitor).await;

        tracing::info!("🛑 All actors stopped");
    }
}

async fn wait_until_stopped<A: Actor>(actor: &ActorRef<A>) {
    while actor.is_alive() {
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
}
