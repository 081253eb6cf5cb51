//! Wire types for the generation backend and realtime job documents.
//!
//! The backend wraps every response in `{ success, job_status?, message? }`.
//! Job documents written by the generation functions use slightly different
//! field names than the HTTP API (`error_message` vs `error`, `video_url`
//! vs `final_video_url`), so the status payload accepts both.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::job::{Job, JobErrorKind, JobId, JobKind, JobStatus, SubItem};

/// Response to `POST /jobs/{kind}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// FastAPI puts error text here on non-2xx responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SubmitEnvelope {
    /// Remote-provided explanation, if any.
    pub fn remote_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

/// Response to `GET /jobs/{kind}/status/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<RemoteJobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusEnvelope {
    /// Remote-provided explanation, if any.
    pub fn remote_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

/// Per-clip status as reported remotely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteClip {
    #[serde(default)]
    pub scene_number: u32,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, alias = "url")]
    pub video_url: Option<String>,
}

impl RemoteClip {
    fn into_sub_item(self) -> SubItem {
        SubItem {
            scene_number: self.scene_number,
            status: self.status,
            progress_percent: clamp_progress(self.progress_percent),
            error: self.error.or(self.error_message),
            url: self.video_url,
        }
    }
}

/// Job status as reported by the HTTP API or a realtime document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteJobStatus {
    #[serde(default, alias = "id")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default, alias = "sub_items")]
    pub clips: Vec<RemoteClip>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub final_video_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteJobStatus {
    /// Convert into a [`Job`] snapshot.
    ///
    /// The id the client asked for is authoritative; the payload's own id is
    /// ignored. A remote `failed` status is tagged [`JobErrorKind::JobFailed`].
    pub fn into_job(self, id: &JobId, kind: JobKind) -> Job {
        let now = Utc::now();
        let progress = clamp_progress(self.progress_percent.or(self.progress));
        let status = self.status;

        let (error, error_kind) = match status {
            JobStatus::Failed => (
                Some(
                    self.error
                        .or(self.error_message)
                        .unwrap_or_else(|| JobErrorKind::JobFailed.default_message().to_string()),
                ),
                Some(JobErrorKind::JobFailed),
            ),
            _ => (None, None),
        };

        let created_at = self.created_at.unwrap_or(now);
        Job {
            id: id.clone(),
            kind,
            status,
            progress_percent: progress,
            sub_items: self.clips.into_iter().map(RemoteClip::into_sub_item).collect(),
            error,
            error_kind,
            result_url: self
                .result_url
                .or(self.final_video_url)
                .or(self.video_url)
                .or(self.image_url),
            current_step: self.current_step,
            created_at,
            updated_at: self.updated_at.unwrap_or(now).max(created_at),
        }
    }
}

fn clamp_progress(raw: Option<f64>) -> u8 {
    match raw {
        Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> ModelResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ModelError::InvalidTimestamp(raw.to_string()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
        .transpose()
}
