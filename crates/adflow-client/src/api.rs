//! Seams between the tracker and the backend.
//!
//! [`ApiClient`](crate::ApiClient) implements all three; tests and embedders
//! can substitute their own.

use async_trait::async_trait;
use serde_json::Value;

use adflow_models::{Job, JobId, JobKind, SceneUpdate};

use crate::error::ApiResult;

/// Starts remote jobs.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Forward `request` unchanged and return the new job in `pending` state.
    ///
    /// Never starts tracking; the caller attaches a status source.
    async fn submit(&self, kind: JobKind, request: &Value) -> ApiResult<Job>;
}

/// Reads the current status of a remote job.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Latest snapshot. An unknown job is [`ApiError::NotFound`](crate::ApiError::NotFound).
    async fn fetch_status(&self, kind: JobKind, job_id: &JobId) -> ApiResult<Job>;
}

/// Persists project edits.
#[async_trait]
pub trait ProjectWriter: Send + Sync {
    async fn update_scene(
        &self,
        project_id: &str,
        scene_id: &str,
        update: &SceneUpdate,
    ) -> ApiResult<()>;
}
