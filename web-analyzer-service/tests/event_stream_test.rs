//! S6 / property 9: the event stream emits a status event before any
//! heartbeat, and exactly one terminal event before closing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use transactional_outbox::SqlxOutboxRepository;
use web_analyzer_service::db::{AnalysisRepository, SqlxAnalysisRepository};
use web_analyzer_service::models::AnalysisOptions;
use web_analyzer_service::services::event_stream::AnalysisEventType;
use web_analyzer_service::services::{EventStreamService, SubmissionService};

#[tokio::test]
async fn stream_closes_after_a_single_terminal_event() {
    let env = common::setup().await;
    let analysis_repo = Arc::new(SqlxAnalysisRepository::new(env.pool.clone()));
    let outbox_repo = Arc::new(SqlxOutboxRepository::new(env.pool.clone()));

    let submission = SubmissionService::new(
        env.pool.clone(),
        analysis_repo.clone(),
        outbox_repo,
        env.cache.clone(),
        Default::default(),
    );
    let analysis = submission
        .start_analysis("https://example.com".to_string(), AnalysisOptions::default())
        .await
        .unwrap();

    // Short intervals so the test doesn't wait through production-sized
    // timers; the analysis is already `completed` before subscription, so
    // the very first poll is the terminal event.
    let stream_service = Arc::new(EventStreamService::new(
        analysis_repo.clone(),
        env.cache.clone(),
        Duration::from_millis(50),
        Duration::from_millis(50),
    ));

    let in_progress = analysis_repo
        .mark_in_progress(analysis.id, analysis.lock_version)
        .await
        .unwrap();
    analysis_repo
        .mark_completed(
            analysis.id,
            in_progress.lock_version,
            "abc123",
            10,
            serde_json::json!({"heading_counts": {"h1":1,"h2":0,"h3":0,"h4":0,"h5":0,"h6":0}, "title": "", "html_version": "Unknown", "link_analysis": {"internal":0,"external":0,"total":0,"inaccessible_links":[]}, "form_analysis": {"total_forms":0,"login_form_count":0,"login_forms":[]}, "fetch_time_ms":1, "processing_time_ms":1}),
            5,
        )
        .await
        .unwrap();

    // The cache still holds the `requested` snapshot written at submission
    // time; invalidate it so the stream's first poll falls through to the
    // store and observes the terminal status, the way the worker's own
    // invalidation would in the real pipeline.
    env.cache.delete(analysis.id).await.unwrap();

    let mut rx = stream_service.subscribe(analysis.id);

    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("stream should close within the timeout")
    {
        events.push(event);
    }

    assert!(!events.is_empty(), "at least one event must be emitted");
    assert_eq!(events[0].event_type, AnalysisEventType::AnalysisCompleted);

    let terminal_count = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                AnalysisEventType::AnalysisCompleted | AnalysisEventType::AnalysisFailed
            )
        })
        .count();
    assert_eq!(terminal_count, 1, "exactly one terminal event before close");
}
