//! Project and scene models.
//!
//! A project holds the ordered scenes of one ad. Each scene tracks at most one
//! active generation job; history is not kept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::job::{Job, JobId, JobKind, JobStatus};

/// Active job tracking for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActiveJob {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ActiveJob {
    /// Build from a tracked job snapshot.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            status: job.status,
            progress: job.progress_percent.min(100),
            started_at: job.created_at,
            last_update: job.updated_at,
            error_message: job.error.clone(),
        }
    }

    /// A non-terminal job with no update within `threshold` is stale.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => Utc::now() - self.last_update > threshold,
            Err(_) => false,
        }
    }
}

/// One scene of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: String,
    pub scene_number: u32,
    pub title: String,
    pub description: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_job: Option<ActiveJob>,
}

impl Scene {
    pub fn new(scene_number: u32, title: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scene_number,
            title: title.into(),
            description: String::new(),
            duration_seconds,
            active_job: None,
        }
    }
}

/// Partial scene edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SceneUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0, max = 30.0))]
    pub duration_seconds: Option<f64>,
}

/// A project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            scenes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn scene(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    fn scene_mut(&mut self, scene_id: &str) -> ModelResult<&mut Scene> {
        self.scenes
            .iter_mut()
            .find(|s| s.id == scene_id)
            .ok_or_else(|| ModelError::SceneNotFound(scene_id.to_string()))
    }

    /// Apply a validated edit to one scene.
    pub fn apply_scene_update(&mut self, scene_id: &str, update: &SceneUpdate) -> ModelResult<()> {
        update.validate()?;
        let scene = self.scene_mut(scene_id)?;

        if let Some(title) = &update.title {
            scene.title = title.clone();
        }
        if let Some(description) = &update.description {
            scene.description = description.clone();
        }
        if let Some(duration) = update.duration_seconds {
            scene.duration_seconds = duration;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the latest snapshot of a scene's job.
    pub fn set_active_job(&mut self, scene_id: &str, job: &Job) -> ModelResult<()> {
        let scene = self.scene_mut(scene_id)?;
        scene.active_job = Some(ActiveJob::from_job(job));
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Scenes whose active job is still running, for resuming after reload.
    pub fn running_jobs(&self) -> Vec<(&Scene, &ActiveJob)> {
        self.scenes
            .iter()
            .filter_map(|scene| scene.active_job.as_ref().map(|job| (scene, job)))
            .filter(|(_, job)| !job.status.is_terminal())
            .collect()
    }
}
