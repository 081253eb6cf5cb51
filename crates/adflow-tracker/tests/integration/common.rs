//! Scripted backend shared by the tracker tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use adflow_client::{ApiError, ApiResult, JobSubmitter, StatusFetcher};
use adflow_models::{Job, JobId, JobKind, JobStatus, SubItem};
use adflow_tracker::{SourceFactory, TrackerConfig};

/// One scripted status response.
pub enum Step {
    Ok(Job),
    Fail,
    NotFound,
    /// Respond with `job` after `delay`.
    Slow(Duration, Job),
}

#[derive(Default)]
pub struct FakeBackend {
    scripts: Mutex<HashMap<JobId, VecDeque<Step>>>,
    calls: Mutex<HashMap<JobId, u32>>,
    submit_ids: Mutex<VecDeque<JobId>>,
    submitted: Mutex<Vec<(JobKind, Value)>>,
    submit_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(JobId::from(job_id))
            .or_default()
            .extend(steps);
    }

    /// Ids handed out by `submit`, in order.
    pub fn next_submission(&self, job_id: &str) {
        self.submit_ids.lock().unwrap().push_back(JobId::from(job_id));
    }

    /// Delay every later `submit` by `delay`.
    pub fn slow_submissions(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, job_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&JobId::from(job_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<(JobKind, Value)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusFetcher for FakeBackend {
    async fn fetch_status(&self, kind: JobKind, job_id: &JobId) -> ApiResult<Job> {
        *self.calls.lock().unwrap().entry(job_id.clone()).or_default() += 1;
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|steps| steps.pop_front());

        match step {
            Some(Step::Ok(job)) => Ok(job),
            Some(Step::Fail) => Err(ApiError::Http {
                status: 503,
                message: "upstream unavailable".into(),
            }),
            Some(Step::NotFound) => Err(ApiError::NotFound(job_id.to_string())),
            Some(Step::Slow(delay, job)) => {
                tokio::time::sleep(delay).await;
                Ok(job)
            }
            None => Ok(job(job_id.as_str(), kind, JobStatus::Processing, 1)),
        }
    }
}

#[async_trait]
impl JobSubmitter for FakeBackend {
    async fn submit(&self, kind: JobKind, request: &Value) -> ApiResult<Job> {
        self.submitted.lock().unwrap().push((kind, request.clone()));
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.submit_ids.lock().unwrap().pop_front() {
            Some(id) => Ok(Job::pending(id, kind)),
            None => Err(ApiError::SubmissionRejected(format!("Failed to start {} job", kind))),
        }
    }
}

pub fn job(id: &str, kind: JobKind, status: JobStatus, progress: u8) -> Job {
    Job::pending(JobId::from(id), kind)
        .with_status(status)
        .with_progress(progress)
}

pub fn completed_with_clips(id: &str, kind: JobKind, scenes: u32) -> Job {
    let mut job = job(id, kind, JobStatus::Completed, 100);
    job.sub_items = (1..=scenes)
        .map(|scene_number| SubItem {
            scene_number,
            status: JobStatus::Completed,
            progress_percent: 100,
            error: None,
            url: Some(format!("https://cdn.example.com/{}/scene-{}.mp4", id, scene_number)),
        })
        .collect();
    job
}

/// Polling-only factory over `backend` with the default intervals.
pub fn polling_factory(backend: &Arc<FakeBackend>) -> Arc<SourceFactory> {
    Arc::new(SourceFactory::new(
        backend.clone(),
        TrackerConfig::default().with_push_kinds(Vec::<JobKind>::new()),
    ))
}

/// Let spawned source tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
