//! `FetchAnalysisEvents`: one cooperative task per connected client,
//! multiplexing a status-poll tick, a heartbeat tick, and cancellation
//! (the client dropping its end of the channel) via `tokio::select!`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{self, SharedAnalysisCache};
use crate::db::AnalysisRepository;
use crate::models::{Analysis, AnalysisStatus};

const TERMINAL_GRACE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisEventType {
    AnalysisStarted,
    AnalysisProgress,
    AnalysisCompleted,
    AnalysisFailed,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: AnalysisEventType,
    pub payload: serde_json::Value,
}

impl AnalysisEvent {
    fn heartbeat() -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: AnalysisEventType::Heartbeat,
            payload: serde_json::json!({}),
        }
    }

    fn for_status(analysis: &Analysis) -> Self {
        let event_type = match analysis.status {
            AnalysisStatus::Requested => AnalysisEventType::AnalysisStarted,
            AnalysisStatus::InProgress => AnalysisEventType::AnalysisProgress,
            AnalysisStatus::Completed => AnalysisEventType::AnalysisCompleted,
            AnalysisStatus::Failed => AnalysisEventType::AnalysisFailed,
        };
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload: serde_json::to_value(analysis).unwrap_or(serde_json::json!({})),
        }
    }

    /// Text/event-stream framing: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        let event_name = serde_json::to_value(self.event_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "message".to_string());
        let data = serde_json::to_string(&self.payload).unwrap_or_default();
        format!("event: {event_name}\nid: {}\ndata: {data}\n\n", self.id)
    }
}

fn is_terminal(status: AnalysisStatus) -> bool {
    matches!(status, AnalysisStatus::Completed | AnalysisStatus::Failed)
}

pub struct EventStreamService {
    analysis_repo: Arc<dyn AnalysisRepository>,
    cache: Arc<SharedAnalysisCache>,
    heartbeat_interval: Duration,
    events_interval: Duration,
}

impl EventStreamService {
    pub fn new(
        analysis_repo: Arc<dyn AnalysisRepository>,
        cache: Arc<SharedAnalysisCache>,
        heartbeat_interval: Duration,
        events_interval: Duration,
    ) -> Self {
        Self {
            analysis_repo,
            cache,
            heartbeat_interval,
            events_interval,
        }
    }

    async fn poll(&self, id: Uuid) -> Option<Analysis> {
        match self.cache.find(id).await {
            Ok(analysis) => Some(analysis),
            Err(_) => match self.analysis_repo.find_by_id(id).await {
                Ok(Some(analysis)) => {
                    cache::set_best_effort(&self.cache, &analysis).await;
                    Some(analysis)
                }
                Ok(None) => None,
                Err(e) => {
                    debug!(analysis_id = %id, error = %e, "status poll failed to read store");
                    None
                }
            },
        }
    }

    /// Spawns the per-client task and returns the receiving half of its
    /// event channel. Dropping the returned receiver is the cancellation
    /// signal the task observes.
    pub fn subscribe(self: Arc<Self>, analysis_id: Uuid) -> mpsc::Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move { self.run(analysis_id, tx).await });
        rx
    }

    async fn run(&self, analysis_id: Uuid, tx: mpsc::Sender<AnalysisEvent>) {
        let Some(initial) = self.poll(analysis_id).await else {
            return;
        };

        if tx.send(AnalysisEvent::for_status(&initial)).await.is_err() {
            return;
        }

        if is_terminal(initial.status) {
            tokio::time::sleep(TERMINAL_GRACE_PERIOD).await;
            return;
        }

        let mut heartbeat_ticker = tokio::time::interval(self.heartbeat_interval);
        let mut status_ticker = tokio::time::interval(self.events_interval);
        heartbeat_ticker.tick().await; // consume the immediate first tick
        status_ticker.tick().await;

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    return;
                }
                _ = heartbeat_ticker.tick() => {
                    if tx.send(AnalysisEvent::heartbeat()).await.is_err() {
                        return;
                    }
                }
                _ = status_ticker.tick() => {
                    let Some(analysis) = self.poll(analysis_id).await else {
                        continue;
                    };
                    let terminal = is_terminal(analysis.status);
                    if tx.send(AnalysisEvent::for_status(&analysis)).await.is_err() {
                        return;
                    }
                    if terminal {
                        tokio::time::sleep(TERMINAL_GRACE_PERIOD).await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_status_maps_to_started_event() {
        let analysis = Analysis {
            id: Uuid::new_v4(),
            url: "https://example.com".to_string(),
            status: AnalysisStatus::Requested,
            content_hash: None,
            content_size: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
            completion_duration_ms: None,
            results: None,
            error: None,
            lock_version: 0,
        };
        let event = AnalysisEvent::for_status(&analysis);
        assert_eq!(event.event_type, AnalysisEventType::AnalysisStarted);
    }

    #[test]
    fn terminal_statuses_are_completed_and_failed_only() {
        assert!(is_terminal(AnalysisStatus::Completed));
        assert!(is_terminal(AnalysisStatus::Failed));
        assert!(!is_terminal(AnalysisStatus::Requested));
        assert!(!is_terminal(AnalysisStatus::InProgress));
    }

    #[test]
    fn sse_frame_carries_event_name_and_id() {
        let event = AnalysisEvent::heartbeat();
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("event: heartbeat\n"));
        assert!(frame.contains(&event.id.to_string()));
    }
}
