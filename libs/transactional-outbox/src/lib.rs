//! Transactional outbox for the analysis submission pipeline.
//!
//! A `StartAnalysis` call writes the new `Analysis` row and an
//! `analysis.requested` outbox row in the same database transaction, so the
//! two can never diverge. A background [`processor::OutboxProcessor`] then
//! drains due rows and hands them to an [`publisher::OutboxPublisher`],
//! claiming each one with an optimistic-concurrency update before it touches
//! the broker so two processor instances never publish the same event twice
//! in the happy path (delivery is still at-least-once on failure/restart —
//! consumers are expected to dedupe on `event.id`).

pub mod backoff;
pub mod error;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod publisher;
pub mod repository;

pub use backoff::{BackoffConfig, BackoffStrategy};
pub use error::{OutboxError, OutboxResult};
pub use metrics::OutboxMetrics;
pub use model::{event_type, NewOutboxEvent, OutboxEvent, OutboxStatus, Priority};
pub use processor::{OutboxProcessor, ProcessorConfig};
pub use publisher::{KafkaOutboxPublisher, OutboxPublisher};
pub use repository::{OutboxRepository, SqlxOutboxRepository};
