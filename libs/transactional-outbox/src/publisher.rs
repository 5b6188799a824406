//! Delivery of claimed events to the broker.

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::warn;

use crate::error::{OutboxError, OutboxResult};
use crate::model::OutboxEvent;

#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()>;
}

/// Topic naming: `analysis.events.{aggregate_type}`. Partition key is the
/// aggregate id, so every event for a given analysis lands on the same
/// partition and is delivered in submission order.
pub struct KafkaOutboxPublisher {
    producer: FutureProducer,
    topic_prefix: String,
}

impl KafkaOutboxPublisher {
    pub fn new(brokers: &str, topic_prefix: impl Into<String>) -> OutboxResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| OutboxError::Broker(e.to_string()))?;

        Ok(Self {
            producer,
            topic_prefix: topic_prefix.into(),
        })
    }

    fn topic(&self, event: &OutboxEvent) -> String {
        format!("{}.{}", self.topic_prefix, event.aggregate_type)
    }
}

#[async_trait]
impl OutboxPublisher for KafkaOutboxPublisher {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()> {
        let topic = self.topic(event);
        let key = event.aggregate_id.to_string();
        let payload = serde_json::to_vec(&event.payload)?;

        let record = FutureRecord::to(&topic).key(&key).payload(&payload);

        match self.producer.send(record, Duration::from_secs(10)).await {
            Ok(_) => Ok(()),
            Err((kafka_err, _)) => {
                warn!(event_id = %event.id, %topic, error = %kafka_err, "kafka publish failed");
                Err(OutboxError::Broker(kafka_err.to_string()))
            }
        }
    }
}
