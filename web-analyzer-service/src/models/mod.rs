//! Domain types: `Analysis` and its nested result shape, plus the payload
//! carried by the outbox for a submitted analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Requested,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<error_types::DomainError> for AnalysisErrorDetail {
    fn from(err: error_types::DomainError) -> Self {
        Self {
            code: err.code.to_string(),
            message: err.message,
            status_code: err.status_code,
            details: err.details,
        }
    }
}

/// Options supplied by the client at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub check_links: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            check_links: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

impl From<EventPriority> for transactional_outbox::Priority {
    fn from(priority: EventPriority) -> Self {
        match priority {
            EventPriority::Low => transactional_outbox::Priority::Low,
            EventPriority::Normal => transactional_outbox::Priority::Normal,
            EventPriority::High => transactional_outbox::Priority::High,
            EventPriority::Urgent => transactional_outbox::Priority::Urgent,
        }
    }
}

/// The authoritative record of one URL analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Analysis {
    pub id: Uuid,
    pub url: String,
    pub status: AnalysisStatus,
    pub content_hash: Option<String>,
    pub content_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_duration_ms: Option<i64>,
    pub results: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
    pub lock_version: i32,
}

impl Analysis {
    pub fn results_typed(&self) -> Option<AnalysisData> {
        self.results
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtmlVersion {
    #[serde(rename = "HTML5")]
    Html5,
    #[serde(rename = "HTML 4.01")]
    Html401,
    #[serde(rename = "XHTML 1.0")]
    Xhtml10,
    #[serde(rename = "XHTML 1.1")]
    Xhtml11,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadingCounts {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InaccessibleLink {
    pub url: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkAnalysis {
    pub internal: u32,
    pub external: u32,
    pub total: u32,
    #[serde(default)]
    pub inaccessible_links: Vec<InaccessibleLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginFormDetails {
    pub method: String,
    pub action: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormAnalysis {
    pub total_forms: u32,
    pub login_form_count: u32,
    #[serde(default)]
    pub login_forms: Vec<LoginFormDetails>,
}

/// `AnalysisData`: the structured output of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisData {
    pub html_version: HtmlVersion,
    pub title: String,
    pub heading_counts: HeadingCounts,
    pub link_analysis: LinkAnalysis,
    pub form_analysis: FormAnalysis,
    pub fetch_time_ms: u64,
    pub processing_time_ms: u64,
}

/// The payload carried by an `analysis.requested` outbox event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequestPayload {
    pub analysis_id: Uuid,
    pub url: String,
    pub options: AnalysisOptions,
    pub priority: EventPriority,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_timeout_is_ten_seconds() {
        assert_eq!(AnalysisOptions::default().timeout_ms, 10_000);
    }

    #[test]
    fn priority_maps_to_outbox_priority() {
        assert_eq!(
            transactional_outbox::Priority::from(EventPriority::Urgent),
            transactional_outbox::Priority::Urgent
        );
    }
}
