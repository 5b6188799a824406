//! Thin HTTP wiring. Request shaping, auth, and OpenAPI surface are out of
//! scope — these handlers exist to exercise the submission and event-stream
//! services, not to specify the public API.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use crate::error::Result;
use crate::models::AnalysisOptions;
use crate::services::{EventStreamService, SubmissionService};

pub struct AppState {
    pub submission: Arc<SubmissionService>,
    pub event_stream: Arc<EventStreamService>,
    pub db_pool: sqlx::PgPool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    #[serde(default)]
    pub options: AnalysisOptions,
}

pub async fn submit_analysis(
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let analysis = state
        .submission
        .start_analysis(request.url, request.options)
        .await?;

    Ok(HttpResponse::Accepted().json(analysis))
}

pub async fn stream_analysis_events(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let analysis_id = path.into_inner();
    let receiver = state.event_stream.clone().subscribe(analysis_id);
    let stream = tokio_stream::wrappers::ReceiverStream::new(receiver)
        .map(|event| Ok::<_, actix_web::Error>(web::Bytes::from(event.to_sse_frame())));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(stream)
}

pub async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "ok"})),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": e.to_string(),
        })),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(healthz))
        .route("/api/v1/analyses", web::post().to(submit_analysis))
        .route(
            "/api/v1/analyses/{id}/events",
            web::get().to(stream_analysis_events),
        );
}
