use prometheus::{CounterVec, Gauge, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<OutboxMetricsInner> = OnceLock::new();

struct OutboxMetricsInner {
    pending: Gauge,
    published: CounterVec,
    failed: CounterVec,
    permanently_failed: CounterVec,
}

impl OutboxMetricsInner {
    fn new() -> Self {
        Self {
            pending: Gauge::new("outbox_pending_events", "Events awaiting publish")
                .expect("valid metric definition"),
            published: CounterVec::new(
                Opts::new("outbox_published_total", "Events published to the broker"),
                &["priority"],
            )
            .expect("valid metric definition"),
            failed: CounterVec::new(
                Opts::new("outbox_failed_total", "Publish attempts that failed"),
                &["priority"],
            )
            .expect("valid metric definition"),
            permanently_failed: CounterVec::new(
                Opts::new(
                    "outbox_permanently_failed_total",
                    "Events that exhausted their retry budget",
                ),
                &["priority"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.pending.clone()))?;
        registry.register(Box::new(self.published.clone()))?;
        registry.register(Box::new(self.failed.clone()))?;
        registry.register(Box::new(self.permanently_failed.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static OutboxMetricsInner {
    METRICS.get_or_init(OutboxMetricsInner::new)
}

#[derive(Clone, Default)]
pub struct OutboxMetrics;

impl OutboxMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn set_pending(&self, count: i64) {
        get_metrics().pending.set(count as f64);
    }

    pub fn record_published(&self, priority: &str) {
        get_metrics().published.with_label_values(&[priority]).inc();
    }

    pub fn record_failed(&self, priority: &str) {
        get_metrics().failed.with_label_values(&[priority]).inc();
    }

    pub fn record_permanently_failed(&self, priority: &str) {
        get_metrics()
            .permanently_failed
            .with_label_values(&[priority])
            .inc();
    }
}
