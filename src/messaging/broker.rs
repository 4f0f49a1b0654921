use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::time::Duration;

use crate::sink::SinkError;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

/// Upper bound on waiting for the broker's acknowledgment.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka producer that waits for full acknowledgment, behind a circuit
/// breaker.
pub struct BrokerClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    ack_timeout: Duration,
}

impl BrokerClient {
    pub fn new(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", ACK_TIMEOUT.as_millis().to_string())
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 3,
        };

        tracing::info!(brokers = %brokers, "Kafka producer created");

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("kafka", cb_config),
            ack_timeout: ACK_TIMEOUT,
        })
    }

    /// Publish one message and wait until the broker acknowledged it.
    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), SinkError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);
                let send = self.producer.send(record, Timeout::After(self.ack_timeout));

                match tokio::time::timeout(self.ack_timeout, send).await {
                    Ok(Ok(_delivery)) => Ok(()),
                    Ok(Err((e, _message))) => Err(SinkError::Transport(e.to_string())),
                    Err(_) => Err(SinkError::Timeout(self.ack_timeout)),
                }
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %topic, key = %key, "Published to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen(name)) => {
                tracing::error!(topic = %topic, "Circuit breaker open, Kafka unavailable");
                Err(SinkError::CircuitOpen(name))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Kafka");
                Err(e)
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}
