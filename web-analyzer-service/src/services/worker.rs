//! `ProcessAnalysisRequest`: the subscriber-side pipeline that fetches,
//! dedups, analyzes, and persists the result of one analysis request.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use error_types::{DomainError, ErrorCode};
use sha2::{Digest, Sha256};
use transactional_outbox::{OutboxError, OutboxRepository, OutboxStatus};

use crate::broker::ConsumeDecision;
use crate::cache::{self, SharedAnalysisCache};
use crate::db::{AnalysisRepoError, AnalysisRepository};
use crate::models::{AnalysisData, AnalysisRequestPayload, AnalysisStatus};

use crate::analysis::fetcher::Fetcher;
use crate::analysis::html_analyzer::HtmlAnalyzer;
use crate::analysis::link_checker::LinkChecker;

pub struct AnalysisWorker {
    analysis_repo: Arc<dyn AnalysisRepository>,
    outbox_repo: Arc<dyn OutboxRepository>,
    cache: Arc<SharedAnalysisCache>,
    fetcher: Arc<dyn Fetcher>,
    html_analyzer: Arc<dyn HtmlAnalyzer>,
    link_checker: Arc<dyn LinkChecker>,
}

impl AnalysisWorker {
    pub fn new(
        analysis_repo: Arc<dyn AnalysisRepository>,
        outbox_repo: Arc<dyn OutboxRepository>,
        cache: Arc<SharedAnalysisCache>,
        fetcher: Arc<dyn Fetcher>,
        html_analyzer: Arc<dyn HtmlAnalyzer>,
        link_checker: Arc<dyn LinkChecker>,
    ) -> Self {
        Self {
            analysis_repo,
            outbox_repo,
            cache,
            fetcher,
            html_analyzer,
            link_checker,
        }
    }

    /// Decodes `raw` and runs the pipeline, translating the outcome into
    /// the broker's ack/reject/requeue vocabulary.
    pub async fn handle_message(&self, raw: Vec<u8>) -> ConsumeDecision {
        let payload: AnalysisRequestPayload = match serde_json::from_slice(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "malformed analysis request payload, rejecting");
                return ConsumeDecision::Reject;
            }
        };

        match self.process_request(&payload).await {
            Ok(()) => ConsumeDecision::Ack,
            Err(Outcome::Logical) => ConsumeDecision::Ack,
            Err(Outcome::Infra(e)) => {
                error!(analysis_id = %payload.analysis_id, error = %e, "infrastructure error processing analysis, requeueing");
                ConsumeDecision::Requeue
            }
        }
    }

    async fn process_request(&self, payload: &AnalysisRequestPayload) -> Result<(), Outcome> {
        let analysis_id = payload.analysis_id;

        // a. locate the most recent outbox event for this analysis
        let event = self
            .outbox_repo
            .find_latest_for_aggregate(analysis_id)
            .await
            .map_err(|e| {
                Outcome::Infra(DomainError::new(ErrorCode::OutboxError, e.to_string()))
            })?
            .ok_or_else(|| {
                Outcome::Infra(DomainError::new(
                    ErrorCode::OutboxError,
                    format!("no outbox event found for analysis {analysis_id}"),
                ))
            })?;

        // b. mark it processed. A redelivery of this same message finds the
        // event already past `published` and loses the CAS — that's the
        // target state already reached, not a failure, so treat it as
        // benign and carry on rather than requeue forever.
        match self
            .outbox_repo
            .mark_processed(event.id, event.lock_version)
            .await
        {
            Ok(_) => {}
            Err(OutboxError::LostClaim { .. }) => {
                let current = self
                    .outbox_repo
                    .find_latest_for_aggregate(analysis_id)
                    .await
                    .map_err(|e| {
                        Outcome::Infra(DomainError::new(ErrorCode::OutboxError, e.to_string()))
                    })?
                    .ok_or_else(|| {
                        Outcome::Infra(DomainError::new(
                            ErrorCode::OutboxError,
                            format!("no outbox event found for analysis {analysis_id}"),
                        ))
                    })?;
                if !matches!(current.status, OutboxStatus::Processed | OutboxStatus::Completed) {
                    return Err(Outcome::Infra(DomainError::new(
                        ErrorCode::StatusUpdateError,
                        format!(
                            "event {} lost the processed claim but is in unexpected status {:?}",
                            current.id, current.status
                        ),
                    )));
                }
            }
            Err(e) => {
                return Err(Outcome::Infra(DomainError::new(
                    ErrorCode::StatusUpdateError,
                    e.to_string(),
                )))
            }
        }

        // c. move the analysis to in_progress, invalidate the cache
        let analysis = self
            .analysis_repo
            .find_by_id(analysis_id)
            .await
            .map_err(|e| {
                Outcome::Infra(DomainError::new(ErrorCode::StatusUpdateError, e.to_string()))
            })?
            .ok_or_else(|| {
                Outcome::Infra(DomainError::new(
                    ErrorCode::StatusUpdateError,
                    format!("analysis {analysis_id} not found"),
                ))
            })?;

        // Same redelivery story as step b: `requested -> in_progress` may
        // already have happened on a prior attempt at this message.
        let analysis = match self
            .analysis_repo
            .mark_in_progress(analysis.id, analysis.lock_version)
            .await
        {
            Ok(updated) => updated,
            Err(AnalysisRepoError::LockConflict { .. }) => {
                if !matches!(
                    analysis.status,
                    AnalysisStatus::InProgress | AnalysisStatus::Completed | AnalysisStatus::Failed
                ) {
                    return Err(Outcome::Infra(DomainError::new(
                        ErrorCode::StatusUpdateError,
                        format!(
                            "analysis {} lost the in_progress claim but is in unexpected status {:?}",
                            analysis.id, analysis.status
                        ),
                    )));
                }
                analysis
            }
            Err(e) => {
                return Err(Outcome::Infra(DomainError::new(
                    ErrorCode::StatusUpdateError,
                    e.to_string(),
                )))
            }
        };

        // A prior attempt already drove this analysis to `completed` (the
        // earlier steps above found their targets already reached); the
        // only thing that might still be outstanding is finalizing the
        // outbox event, so do that and stop rather than redo the fetch.
        if analysis.status == AnalysisStatus::Completed {
            self.finalize_outbox_completed(analysis_id).await?;
            return Ok(());
        }
        // A prior attempt already recorded a logical failure; that message
        // was acked then, so a redelivery here can only be a duplicate.
        if analysis.status == AnalysisStatus::Failed {
            return Ok(());
        }
        cache::invalidate_best_effort(&self.cache, analysis_id).await;

        // d. fetch
        let timeout = Duration::from_millis(payload.options.timeout_ms);
        let fetch_start = std::time::Instant::now();
        let html = match self.fetcher.fetch(&payload.url, timeout).await {
            Ok(html) => html,
            Err(fetch_err) => {
                let error = DomainError::new(ErrorCode::FetchError, fetch_err.0);
                self.fail_analysis(analysis.id, analysis.lock_version, &error)
                    .await;
                return Err(Outcome::Logical);
            }
        };
        let fetch_time_ms = fetch_start.elapsed().as_millis() as u64;

        // e. content hash
        let content_hash = hex::encode(Sha256::digest(html.as_bytes()));
        let content_size = html.len() as i64;

        // f. dedup
        let dedup = self
            .analysis_repo
            .find_completed_by_content_hash(&content_hash)
            .await
            .map_err(|e| {
                Outcome::Infra(DomainError::new(
                    ErrorCode::DuplicateCheckError,
                    e.to_string(),
                ))
            })?;

        let results = if let Some(prior) = dedup {
            prior.results.ok_or_else(|| {
                Outcome::Infra(DomainError::new(
                    ErrorCode::CopyResultsError,
                    "matched prior analysis had no results".to_string(),
                ))
            })?
        } else {
            // g. full analysis
            let processing_start = std::time::Instant::now();
            let mut analyzed = self.html_analyzer.analyze(&payload.url, &html);

            if payload.options.check_links && !analyzed.external_link_urls.is_empty() {
                let inaccessible = self.link_checker.check(&analyzed.external_link_urls).await;
                analyzed.link_analysis.inaccessible_links = inaccessible;
            }

            let processing_time_ms = processing_start.elapsed().as_millis() as u64;

            let data = AnalysisData {
                html_version: analyzed.html_version,
                title: analyzed.title,
                heading_counts: analyzed.heading_counts,
                link_analysis: analyzed.link_analysis,
                form_analysis: analyzed.form_analysis,
                fetch_time_ms,
                processing_time_ms,
            };

            serde_json::to_value(&data).map_err(|e| {
                Outcome::Infra(DomainError::new(ErrorCode::AnalysisError, e.to_string()))
            })?
        };

        // h. completion duration, measured from the outbox event's creation
        let completion_duration_ms = (Utc::now() - event.created_at).num_milliseconds().max(0);

        self.analysis_repo
            .mark_completed(
                analysis.id,
                analysis.lock_version,
                &content_hash,
                content_size,
                results,
                completion_duration_ms,
            )
            .await
            .map_err(|e| {
                Outcome::Infra(DomainError::new(
                    ErrorCode::DurationUpdateError,
                    e.to_string(),
                ))
            })?;

        // i. mark the outbox event completed.
        self.finalize_outbox_completed(analysis_id).await?;

        // j. final cache invalidation
        cache::invalidate_best_effort(&self.cache, analysis_id).await;

        Ok(())
    }

    /// Re-reads the latest outbox event for this analysis and marks it
    /// `completed`. Its `lock_version` may have advanced since step b, so it
    /// is always re-read rather than reusing a stale value; a `LostClaim`
    /// here means a prior delivery attempt already completed it, which is
    /// the target state, not a failure.
    async fn finalize_outbox_completed(&self, analysis_id: Uuid) -> Result<(), Outcome> {
        let Some(fresh) = self
            .outbox_repo
            .find_latest_for_aggregate(analysis_id)
            .await
            .map_err(|e| Outcome::Infra(DomainError::new(ErrorCode::OutboxError, e.to_string())))?
        else {
            return Ok(());
        };

        match self
            .outbox_repo
            .mark_completed(fresh.id, fresh.lock_version)
            .await
        {
            Ok(_) => Ok(()),
            Err(OutboxError::LostClaim { .. }) => Ok(()),
            Err(e) => Err(Outcome::Infra(DomainError::new(
                ErrorCode::OutboxError,
                e.to_string(),
            ))),
        }
    }

    async fn fail_analysis(&self, id: Uuid, lock_version: i32, error: &DomainError) {
        let error_json = serde_json::to_value(crate::models::AnalysisErrorDetail::from(error.clone()))
            .unwrap_or_else(|_| serde_json::json!({"code": "FETCH_ERROR", "message": "fetch failed"}));

        if let Err(e) = self
            .analysis_repo
            .mark_failed(id, lock_version, error_json)
            .await
        {
            error!(analysis_id = %id, error = %e, "failed to persist FETCH_ERROR on analysis");
        }
        cache::invalidate_best_effort(&self.cache, id).await;
    }
}

enum Outcome {
    /// A logical failure already durably recorded; the message should ack.
    Logical,
    /// An infrastructure failure; the message should requeue.
    Infra(DomainError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fetcher::fakes::FakeFetcher;
    use crate::analysis::html_analyzer::RegexHtmlAnalyzer;
    use crate::analysis::link_checker::fakes::FakeLinkChecker;

    #[test]
    fn content_hash_is_stable_for_identical_html() {
        let html = "<html><body><h1>Hi</h1></body></html>";
        let a = hex::encode(Sha256::digest(html.as_bytes()));
        let b = hex::encode(Sha256::digest(html.as_bytes()));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn analyzer_and_link_checker_fakes_compose() {
        let analyzer = RegexHtmlAnalyzer;
        let result = analyzer.analyze("https://example.com", "<html><h1>Hi</h1></html>");
        assert_eq!(result.heading_counts.h1, 1);

        let checker = FakeLinkChecker::new(vec![]);
        let out = checker.check(&[]).await;
        assert!(out.is_empty());

        let fetcher = FakeFetcher {
            html: Ok("<html></html>".to_string()),
        };
        let fetched = fetcher.fetch("https://example.com", Duration::from_secs(1)).await;
        assert!(fetched.is_ok());
    }
}
