use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::sync::Arc;

use super::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::outbox::{CycleReport, OutboxError, OutboxRelay};

// ============================================================================
// Relay Actor - one per outbox table
// ============================================================================
//
// A ticker task started in `on_start` sleeps `poll_interval`, then asks the
// actor to `RunCycle` and waits for the reply before sleeping again. The
// actor handles one message at a time, so cycles of one instance never
// overlap.
//
// Graceful stop lets the in-flight cycle finish; the ticker notices the
// actor is gone and exits.
//
// ============================================================================

#[derive(Debug)]
pub struct RunCycle;

pub struct RelayActor {
    relay: Arc<OutboxRelay>,
    health_monitor: Option<ActorRef<HealthMonitorActor>>,
}

impl RelayActor {
    pub fn new(relay: OutboxRelay, health_monitor: Option<ActorRef<HealthMonitorActor>>) -> Self {
        Self {
            relay: Arc::new(relay),
            health_monitor,
        }
    }

    fn component(&self) -> String {
        format!("relay:{}", self.relay.outbox().label())
    }

    async fn report(&self, status: HealthStatus, details: Option<String>) {
        if let Some(monitor) = &self.health_monitor {
            let _ = monitor
                .tell(UpdateHealth {
                    component: self.component(),
                    status,
                    details,
                })
                .send()
                .await;
        }
    }
}

impl Actor for RelayActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let poll_interval = state.relay.config().poll_interval;

        tracing::info!(
            outbox = state.relay.outbox().label(),
            claimant = %state.relay.claimant(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            batch_size = state.relay.config().batch_size,
            "🚀 Relay actor started"
        );

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if !actor_ref.is_alive() {
                    break;
                }
                // The handler logs and reports its own errors.
                if actor_ref.ask(RunCycle).await.is_err() && !actor_ref.is_alive() {
                    break;
                }
            }
        });

        Ok(state)
    }
}

impl Message<RunCycle> for RelayActor {
    type Reply = Result<CycleReport, OutboxError>;

    async fn handle(&mut self, _msg: RunCycle, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.relay.run_cycle().await {
            Ok(report) => {
                self.report(
                    HealthStatus::Healthy,
                    Some(format!("last cycle claimed {}", report.claimed)),
                )
                .await;
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    outbox = self.relay.outbox().label(),
                    "Failed to claim outbox batch, cycle skipped"
                );
                self.report(HealthStatus::Degraded(format!("claim failed: {}", e)), None)
                    .await;
                Err(e)
            }
        }
    }
}
