mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub use server::start_metrics_server;

use crate::actors::core::HealthStatus;
use crate::outbox::{OutboxStats, RecordOutcome};
use crate::utils::CircuitState;

// ============================================================================
// Metrics Module - Prometheus metrics for the outbox relays
// ============================================================================
//
// Every outbox metric carries an `outbox` label (user_events | email), so the
// two relay instances share one set of series names.
//
// Scraped via /metrics on the metrics server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Relay Metrics
    pub records_claimed: IntCounterVec,
    pub deliveries: IntCounterVec,
    pub version_conflicts: IntCounterVec,
    pub skipped: IntCounterVec,
    pub store_errors: IntCounterVec,
    pub delivery_duration: HistogramVec,
    pub cycle_duration: HistogramVec,

    // Outbox State
    pub outbox_records: IntGaugeVec,

    // Health
    pub circuit_breaker_state: IntGauge,
    pub component_health: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let records_claimed = IntCounterVec::new(
            Opts::new("outbox_records_claimed_total", "Outbox records claimed by relays"),
            &["outbox"],
        )?;
        registry.register(Box::new(records_claimed.clone()))?;

        let deliveries = IntCounterVec::new(
            Opts::new("outbox_deliveries_total", "Committed delivery outcomes"),
            &["outbox", "outcome"],
        )?;
        registry.register(Box::new(deliveries.clone()))?;

        let version_conflicts = IntCounterVec::new(
            Opts::new(
                "outbox_version_conflicts_total",
                "Outcomes dropped because the record version moved",
            ),
            &["outbox"],
        )?;
        registry.register(Box::new(version_conflicts.clone()))?;

        let skipped = IntCounterVec::new(
            Opts::new("outbox_skipped_total", "Claimed records no longer PENDING on re-read"),
            &["outbox"],
        )?;
        registry.register(Box::new(skipped.clone()))?;

        let store_errors = IntCounterVec::new(
            Opts::new("outbox_store_errors_total", "Per-record store failures"),
            &["outbox"],
        )?;
        registry.register(Box::new(store_errors.clone()))?;

        let delivery_duration = HistogramVec::new(
            HistogramOpts::new("outbox_delivery_duration_seconds", "Sink delivery duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["outbox"],
        )?;
        registry.register(Box::new(delivery_duration.clone()))?;

        let cycle_duration = HistogramVec::new(
            HistogramOpts::new("outbox_cycle_duration_seconds", "Relay cycle duration")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["outbox"],
        )?;
        registry.register(Box::new(cycle_duration.clone()))?;

        let outbox_records = IntGaugeVec::new(
            Opts::new("outbox_records", "Outbox records by status"),
            &["outbox", "status"],
        )?;
        registry.register(Box::new(outbox_records.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "component_health_status",
                "Component health (0=Unhealthy, 1=Degraded, 2=Healthy)",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            registry,
            records_claimed,
            deliveries,
            version_conflicts,
            skipped,
            store_errors,
            delivery_duration,
            cycle_duration,
            outbox_records,
            circuit_breaker_state,
            component_health,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_claimed(&self, outbox: &str, count: usize) {
        self.records_claimed
            .with_label_values(&[outbox])
            .inc_by(count as u64);
    }

    pub fn record_outcome(&self, outbox: &str, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Sent | RecordOutcome::Requeued | RecordOutcome::Failed => self
                .deliveries
                .with_label_values(&[outbox, outcome.as_str()])
                .inc(),
            RecordOutcome::Skipped => self.skipped.with_label_values(&[outbox]).inc(),
            RecordOutcome::Conflict => self.version_conflicts.with_label_values(&[outbox]).inc(),
            RecordOutcome::Error => self.store_errors.with_label_values(&[outbox]).inc(),
        }
    }

    pub fn observe_delivery(&self, outbox: &str, duration_secs: f64) {
        self.delivery_duration
            .with_label_values(&[outbox])
            .observe(duration_secs);
    }

    pub fn observe_cycle(&self, outbox: &str, duration_secs: f64) {
        self.cycle_duration
            .with_label_values(&[outbox])
            .observe(duration_secs);
    }

    pub fn set_outbox_stats(&self, outbox: &str, stats: &OutboxStats) {
        for (status, count) in [
            ("PENDING", stats.pending),
            ("SENT", stats.sent),
            ("FAILED", stats.failed),
        ] {
            self.outbox_records
                .with_label_values(&[outbox, status])
                .set(count as i64);
        }
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.set(value);
    }

    pub fn update_component_health(&self, component: &str, status: &HealthStatus) {
        let value = match status {
            HealthStatus::Unhealthy(_) => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Healthy => 2,
        };
        self.component_health.with_label_values(&[component]).set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(
        gathered: &'a [prometheus::proto::MetricFamily],
        name: &str,
    ) -> &'a prometheus::proto::MetricFamily {
        gathered.iter().find(|m| m.name() == name).unwrap()
    }

    #[test]
    fn test_outcomes_land_in_their_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outcome("email", RecordOutcome::Sent);
        metrics.record_outcome("email", RecordOutcome::Sent);
        metrics.record_outcome("email", RecordOutcome::Conflict);

        let gathered = metrics.registry().gather();
        let deliveries = find(&gathered, "outbox_deliveries_total");
        assert_eq!(deliveries.metric.len(), 1);
        assert_eq!(deliveries.metric[0].counter.value, Some(2.0));

        let conflicts = find(&gathered, "outbox_version_conflicts_total");
        assert_eq!(conflicts.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_claimed_counts_whole_batch() {
        let metrics = Metrics::new().unwrap();
        metrics.record_claimed("user_events", 7);
        metrics.record_claimed("user_events", 0);

        let gathered = metrics.registry().gather();
        let claimed = find(&gathered, "outbox_records_claimed_total");
        assert_eq!(claimed.metric[0].counter.value, Some(7.0));
    }

    #[test]
    fn test_stats_gauge_has_one_series_per_status() {
        let metrics = Metrics::new().unwrap();
        metrics.set_outbox_stats(
            "email",
            &OutboxStats {
                pending: 3,
                sent: 10,
                failed: 1,
            },
        );

        let gathered = metrics.registry().gather();
        let records = find(&gathered, "outbox_records");
        assert_eq!(records.metric.len(), 3);
        let total: f64 = records
            .metric
            .iter()
            .filter_map(|m| m.gauge.value)
            .sum();
        assert_eq!(total, 14.0);
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(CircuitState::Open);

        let gathered = metrics.registry().gather();
        let state = find(&gathered, "circuit_breaker_state");
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
