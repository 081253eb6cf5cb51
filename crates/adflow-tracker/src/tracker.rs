//! Single-job tracker.
//!
//! A [`JobTracker`] owns at most one live [`JobStatusSource`] and publishes
//! the latest snapshot of its job through a `watch` channel. Every failure
//! class arrives on that same channel as a `failed` job carrying a
//! [`JobErrorKind`], so observers have one path to handle.
//!
//! Each attachment gets a new generation number. The sink handed to a source
//! is bound to the generation it was created for, so anything a replaced or
//! stopped source still delivers is discarded.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use adflow_client::JobSubmitter;
use adflow_models::{Job, JobErrorKind, JobId, JobKind, JobStatus};

use crate::error::{TrackerError, TrackerResult};
use crate::logging::JobLogger;
use crate::metrics::record_terminal;
use crate::source::{JobStatusSource, JobUpdate, SourceFactory, SourceState, UpdateSink, Verification};

/// Result of [`JobTracker::resume`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// The job is unknown remotely; nothing is tracked.
    Cleared,
    /// The job is live and a source is attached.
    Attached,
    /// The job had already finished; its final snapshot is published.
    Finished(Job),
}

#[derive(Default)]
struct TrackerState {
    job_id: Option<JobId>,
    kind: Option<JobKind>,
    generation: u64,
    /// A terminal update has been applied for the current generation.
    settled: bool,
    last_request: Option<(JobKind, Value)>,
}

struct Shared {
    state: Mutex<TrackerState>,
    tx: watch::Sender<Option<Job>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, generation: u64, update: JobUpdate, logger: &JobLogger) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(job_id = logger.job_id(), "Discarding update from a previous attachment");
            return;
        }
        if state.settled {
            debug!(job_id = logger.job_id(), "Discarding update after terminal status");
            return;
        }

        let job = match update {
            JobUpdate::Snapshot(job) => tag_remote_failure(job),
            JobUpdate::NotFound => {
                state.job_id = None;
                let base = self
                    .tx
                    .borrow()
                    .clone()
                    .filter(|job| job.id.as_str() == logger.job_id())
                    .unwrap_or_else(|| Job::pending(JobId::from(logger.job_id()), logger.kind()));
                base.into_failed(JobErrorKind::JobNotFound, JobErrorKind::JobNotFound.default_message())
            }
        };

        if let Some(previous) = self.tx.borrow().as_ref() {
            if moves_backwards(previous, &job) {
                logger.log_warning(&format!(
                    "status moved backwards from {} to {}",
                    previous.status, job.status
                ));
            }
        }

        match job.status {
            JobStatus::Completed => {
                logger.log_completion(job.result_url.as_deref().unwrap_or("no output url"));
            }
            JobStatus::Failed => {
                logger.log_error(job.error.as_deref().unwrap_or("unknown error"));
            }
            _ => logger.log_progress(job.progress_percent, job.current_step.as_deref().unwrap_or("")),
        }
        if job.is_terminal() {
            state.settled = true;
            let reason = job.failure().map(|kind| kind.as_str()).unwrap_or("none");
            record_terminal(job.kind.as_str(), job.status.as_str(), reason);
        }

        self.tx.send_replace(Some(job));
    }
}

/// Whether `next` regresses the status of the same job. Applied anyway;
/// the latest snapshot wins.
fn moves_backwards(previous: &Job, next: &Job) -> bool {
    previous.id == next.id
        && !previous.is_terminal()
        && !previous.status.can_transition_to(next.status)
}

/// Remote failures that arrive untagged are job failures.
fn tag_remote_failure(mut job: Job) -> Job {
    if job.status == JobStatus::Failed {
        let kind = *job.error_kind.get_or_insert(JobErrorKind::JobFailed);
        if job.error.is_none() {
            job.error = Some(kind.default_message().to_string());
        }
    }
    job
}

/// Read side of a tracker, usable while the tracker itself is borrowed.
#[derive(Clone)]
pub(crate) struct TrackerView {
    shared: Arc<Shared>,
}

impl TrackerView {
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.shared.tx.subscribe()
    }

    pub(crate) fn current(&self) -> Option<Job> {
        self.shared.tx.borrow().clone()
    }

    pub(crate) fn job_id(&self) -> Option<JobId> {
        self.shared.lock().job_id.clone()
    }
}

/// Tracks one remote job at a time.
pub struct JobTracker {
    shared: Arc<Shared>,
    factory: Arc<SourceFactory>,
    submitter: Option<Arc<dyn JobSubmitter>>,
    source: Option<Box<dyn JobStatusSource>>,
}

impl JobTracker {
    pub fn new(factory: Arc<SourceFactory>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState::default()),
                tx,
            }),
            factory,
            submitter: None,
            source: None,
        }
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn JobSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Observe the tracked job. `None` means nothing is tracked.
    pub fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.shared.tx.subscribe()
    }

    pub fn current(&self) -> Option<Job> {
        self.shared.tx.borrow().clone()
    }

    pub(crate) fn view(&self) -> TrackerView {
        TrackerView {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Id of the job being tracked, if any.
    pub fn job_id(&self) -> Option<JobId> {
        self.shared.lock().job_id.clone()
    }

    pub fn source_state(&self) -> SourceState {
        self.source
            .as_ref()
            .map(|source| source.state())
            .unwrap_or(SourceState::Idle)
    }

    /// Follow `job_id`, replacing whatever was tracked before.
    pub fn attach(&mut self, job_id: JobId, kind: JobKind) {
        let generation = self.stop_source();
        {
            let mut state = self.shared.lock();
            state.job_id = Some(job_id.clone());
            state.kind = Some(kind);
        }

        // A failed snapshot of the same job is being retried.
        let placeholder = match self.current() {
            Some(job) if job.id == job_id && job.status == JobStatus::Failed => Some(job.into_retrying()),
            Some(job) if job.id == job_id => None,
            _ => Some(Job::pending(job_id.clone(), kind)),
        };
        if let Some(job) = placeholder {
            self.shared.tx.send_replace(Some(job));
        }

        let logger = JobLogger::new(&job_id, kind);
        let shared = Arc::clone(&self.shared);
        let sink: UpdateSink = Arc::new(move |update| shared.apply(generation, update, &logger));

        let mut source = self.factory.create(kind);
        info!(job_id = %job_id, kind = %kind, delivery = ?source.delivery(), "Attaching status source");
        source.start(job_id, sink);
        self.source = Some(source);
    }

    /// Stop tracking and clear the tracked job. The remote job keeps running.
    pub fn detach(&mut self) {
        self.stop_source();
        {
            let mut state = self.shared.lock();
            state.job_id = None;
            state.kind = None;
        }
        self.shared.tx.send_replace(None);
    }

    /// Detach and forget the request remembered for resubmission.
    pub fn dismiss(&mut self) {
        self.detach();
        self.shared.lock().last_request = None;
    }

    /// Re-attach to a job id remembered from an earlier session.
    ///
    /// The job is checked once first. Unknown jobs are cleared instead of
    /// entering a retry loop; finished jobs publish their final snapshot
    /// without attaching. If the check itself fails the source is attached
    /// anyway and the retry policy bounds the attempt.
    pub async fn resume(&mut self, job_id: JobId, kind: JobKind) -> ResumeOutcome {
        self.detach();

        match self.factory.verify(kind, &job_id).await {
            Verification::Missing => {
                info!(job_id = %job_id, kind = %kind, "Resumed job no longer exists; clearing");
                ResumeOutcome::Cleared
            }
            Verification::Found(job) if job.is_terminal() => {
                let job = tag_remote_failure(job);
                {
                    let mut state = self.shared.lock();
                    state.job_id = Some(job_id);
                    state.kind = Some(kind);
                    state.settled = true;
                }
                self.shared.tx.send_replace(Some(job.clone()));
                ResumeOutcome::Finished(job)
            }
            Verification::Found(job) => {
                self.shared.tx.send_replace(Some(job));
                self.attach(job_id, kind);
                ResumeOutcome::Attached
            }
            Verification::Unreachable(reason) => {
                warn!(job_id = %job_id, kind = %kind, "Resuming without verification: {}", reason);
                self.attach(job_id, kind);
                ResumeOutcome::Attached
            }
        }
    }

    /// Start a job and track it. The request is kept for [`retry`](Self::retry).
    pub async fn submit(&mut self, kind: JobKind, request: Value) -> TrackerResult<JobId> {
        let submitter = self.submitter.clone().ok_or(TrackerError::NoSubmitter)?;
        let job = submitter
            .submit(kind, &request)
            .await
            .map_err(TrackerError::Submission)?;

        info!(job_id = %job.id, kind = %kind, "Job submitted");
        let job_id = job.id.clone();
        self.shared.lock().last_request = Some((kind, request));
        self.stop_source();
        self.shared.tx.send_replace(Some(job));
        self.attach(job_id.clone(), kind);
        Ok(job_id)
    }

    /// Recover from a retryable failure.
    ///
    /// Lost contact re-attaches to the same job; a failed job is submitted
    /// again with the remembered request. Returns the id now tracked.
    pub async fn retry(&mut self) -> TrackerResult<JobId> {
        let job = self.current().ok_or(TrackerError::NothingToRetry)?;
        let failure = job.failure().ok_or(TrackerError::NothingToRetry)?;
        if !failure.is_retryable() {
            return Err(TrackerError::NotRetryable(failure));
        }

        match failure {
            JobErrorKind::JobFailed => {
                let (kind, request) = self
                    .shared
                    .lock()
                    .last_request
                    .clone()
                    .ok_or(TrackerError::NothingToRetry)?;
                info!(job_id = %job.id, kind = %kind, "Resubmitting failed job");
                self.submit(kind, request).await
            }
            _ => {
                info!(job_id = %job.id, kind = %job.kind, "Re-attaching after {}", failure);
                self.attach(job.id.clone(), job.kind);
                Ok(job.id)
            }
        }
    }

    /// Stop the live source and open a new generation. Returns that generation.
    fn stop_source(&mut self) -> u64 {
        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.settled = false;
            state.generation
        };
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        generation
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}
