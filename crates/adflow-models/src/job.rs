//! Job definitions for remote generation work.
//!
//! A [`Job`] is the client-side view of one long-running remote operation
//! (clip generation, composition, ...). Snapshots always replace the tracked
//! value wholesale; nothing here merges partial updates.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Opaque job identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How status snapshots reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Fixed-interval HTTP polling
    Poll,
    /// Realtime subscription
    Push,
}

/// Kind of remote job. Selects endpoint, delivery strategy and poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Multi-scene video clip generation
    VideoGeneration,
    /// Final video composition (clips + audio)
    Composition,
    /// Seed image generation for a scene
    ImageGeneration,
    /// Single-scene video generation
    SceneVideo,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::VideoGeneration,
        JobKind::Composition,
        JobKind::ImageGeneration,
        JobKind::SceneVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::VideoGeneration => "video-generation",
            JobKind::Composition => "composition",
            JobKind::ImageGeneration => "image-generation",
            JobKind::SceneVideo => "scene-video",
        }
    }

    /// Delivery used when nothing is configured for this kind.
    ///
    /// Image and single-scene jobs are driven by database triggers and are
    /// observed through their realtime documents; the backend-run jobs are
    /// polled.
    pub fn default_delivery(&self) -> Delivery {
        match self {
            JobKind::VideoGeneration | JobKind::Composition => Delivery::Poll,
            JobKind::ImageGeneration | JobKind::SceneVideo => Delivery::Push,
        }
    }

    /// Poll interval used when nothing is configured for this kind.
    pub fn default_poll_interval(&self) -> Duration {
        match self {
            JobKind::VideoGeneration | JobKind::SceneVideo => Duration::from_secs(3),
            JobKind::Composition | JobKind::ImageGeneration => Duration::from_secs(2),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ModelError::UnknownJobKind(s.to_string()))
    }
}

/// Remote job status.
///
/// The realtime job documents spell states differently from the HTTP API
/// (`queued`, `complete`, `error`); both spellings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not started
    #[default]
    #[serde(alias = "queued")]
    Pending,
    /// Running remotely
    Processing,
    /// Finished successfully
    #[serde(alias = "complete")]
    Completed,
    /// Finished with an error
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure class attached to a failed [`Job`].
///
/// Losing contact with a job and the job itself failing are different
/// failures and are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The start request failed or was rejected
    Submission,
    /// Too many consecutive status fetches failed
    PollingExhausted,
    /// The remote system reported the job as failed
    JobFailed,
    /// The remote system has no record of the job
    JobNotFound,
    /// The realtime transport failed
    SubscriptionFailed,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::Submission => "submission",
            JobErrorKind::PollingExhausted => "polling_exhausted",
            JobErrorKind::JobFailed => "job_failed",
            JobErrorKind::JobNotFound => "job_not_found",
            JobErrorKind::SubscriptionFailed => "subscription_failed",
        }
    }

    /// Whether the UI should offer a retry action (as opposed to dismiss only).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobErrorKind::PollingExhausted | JobErrorKind::JobFailed | JobErrorKind::SubscriptionFailed
        )
    }

    /// Default user-facing message for this failure class.
    pub fn default_message(&self) -> &'static str {
        match self {
            JobErrorKind::Submission => "The job could not be started",
            JobErrorKind::PollingExhausted => "We lost contact with the job",
            JobErrorKind::JobFailed => "The job failed",
            JobErrorKind::JobNotFound => "This job no longer exists",
            JobErrorKind::SubscriptionFailed => "Live updates for this job stopped",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work inside a job (e.g. the clip for one scene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubItem {
    /// Scene number (1-indexed)
    pub scene_number: u32,
    /// Status of this unit
    pub status: JobStatus,
    /// Progress (0-100)
    #[serde(default)]
    pub progress_percent: u8,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Output URL (if produced)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Snapshot of a remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Remote job ID
    pub id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), advisory only
    #[serde(default)]
    pub progress_percent: u8,

    /// Per-scene units of work, in order
    #[serde(default)]
    pub sub_items: Vec<SubItem>,

    /// Error message (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure class (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,

    /// Output URL (final video, composed video or image)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Remote step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly submitted job.
    pub fn pending(id: JobId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            progress_percent: 0,
            sub_items: Vec::new(),
            error: None,
            error_kind: None,
            result_url: None,
            current_step: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update progress.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress_percent = progress.min(100);
        self.updated_at = Utc::now();
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }

    /// Mark the job as failed with the given class and message.
    ///
    /// Progress and sub-items are kept so the UI can still show how far the
    /// job got.
    pub fn into_failed(mut self, kind: JobErrorKind, message: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error_kind = Some(kind);
        self.error = Some(message.into());
        self.updated_at = Utc::now();
        self
    }

    /// The same job being retried: back to `processing` with the failure
    /// cleared. Progress and sub-items are kept.
    pub fn into_retrying(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.error = None;
        self.error_kind = None;
        self.updated_at = Utc::now();
        self
    }

    /// Failure class, if this snapshot is a failure.
    pub fn failure(&self) -> Option<JobErrorKind> {
        match self.status {
            JobStatus::Failed => Some(self.error_kind.unwrap_or(JobErrorKind::JobFailed)),
            _ => None,
        }
    }

    /// Number of sub-items that completed.
    pub fn completed_sub_items(&self) -> usize {
        self.sub_items
            .iter()
            .filter(|item| item.status == JobStatus::Completed)
            .count()
    }

    /// A non-terminal job with no update within `threshold` is stale.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        if self.is_terminal() {
            return false;
        }
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => Utc::now() - self.updated_at > threshold,
            Err(_) => false,
        }
    }
}
