//! The publisher loop: periodically drains due events, claims each one,
//! hands it to the publisher, and records the outcome.

use chrono::Utc;
use futures::future::join_all;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::backoff::BackoffStrategy;
use crate::error::OutboxError;
use crate::metrics::OutboxMetrics;
use crate::model::OutboxEvent;
use crate::publisher::OutboxPublisher;
use crate::repository::OutboxRepository;

pub struct ProcessorConfig {
    pub tick_interval: Duration,
    pub batch_size: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            batch_size: 50,
        }
    }
}

pub struct OutboxProcessor<R: RngCore + Send> {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn OutboxPublisher>,
    backoff: Arc<BackoffStrategy<R>>,
    metrics: OutboxMetrics,
    config: ProcessorConfig,
}

impl<R: RngCore + Send + 'static> OutboxProcessor<R> {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn OutboxPublisher>,
        backoff: Arc<BackoffStrategy<R>>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            backoff,
            metrics: OutboxMetrics::new(),
            config,
        }
    }

    /// Runs until the returned handle is aborted or the process exits.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.drain_once().await {
                    error!(error = %e, "outbox drain tick failed");
                }
            }
        })
    }

    /// Fires the pending and retry drains concurrently, and within each
    /// drain publishes every event in the batch concurrently.
    pub async fn drain_once(&self) -> Result<(), OutboxError> {
        let (pending, retrying) = tokio::join!(
            self.repository.fetch_pending_due(self.config.batch_size),
            self.repository.fetch_retry_due(self.config.batch_size),
        );
        let pending = pending?;
        let retrying = retrying?;
        self.metrics
            .set_pending((pending.len() + retrying.len()) as i64);

        let (pending_results, retry_results) = tokio::join!(
            join_all(pending.into_iter().map(|event| self.process_one(event))),
            join_all(retrying.into_iter().map(|event| self.process_one(event))),
        );

        for result in pending_results.into_iter().chain(retry_results) {
            if let Err(e) = result {
                warn!(error = %e, "failed to process one outbox event");
            }
        }
        Ok(())
    }

    async fn process_one(&self, event: OutboxEvent) -> Result<(), OutboxError> {
        let claimed = match self.repository.claim(event.id, event.lock_version).await {
            Ok(claimed) => claimed,
            Err(OutboxError::LostClaim { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let priority = format!("{:?}", claimed.priority).to_lowercase();

        match self.publisher.publish(&claimed).await {
            Ok(()) => {
                self.repository
                    .mark_published(claimed.id, claimed.lock_version)
                    .await?;
                self.metrics.record_published(&priority);
                Ok(())
            }
            Err(publish_err) => {
                self.metrics.record_failed(&priority);

                if claimed.retries_exhausted() {
                    self.repository
                        .mark_permanently_failed(
                            claimed.id,
                            claimed.lock_version,
                            &publish_err.to_string(),
                        )
                        .await?;
                    self.metrics.record_permanently_failed(&priority);
                    info!(event_id = %claimed.id, "event permanently failed, retry budget exhausted");
                } else {
                    let delay = self.backoff.compute(claimed.retry_count as u32);
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    self.repository
                        .mark_failed(
                            claimed.id,
                            claimed.lock_version,
                            &publish_err.to_string(),
                            Some(next_retry_at),
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}
