//! Registry of tracked jobs.
//!
//! The hub is the entry point embedders use: `submit` starts a job,
//! `track` follows an existing one, `stop` lets it go. It keeps one
//! [`JobTracker`] per job id, so a job is never followed by two sources.
//!
//! `resume` and `retry` await the backend. They claim the id's entry before
//! awaiting, so a concurrent `track` shares that entry instead of starting a
//! second source, and a concurrent `stop` is honoured when the call returns.

use std::collections::hash_map::Entry as Slot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info};

use adflow_client::{ApiClient, JobSubmitter, ResponseCache};
use adflow_models::{Job, JobId, JobKind};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::feed::{RedisSnapshotFeed, SnapshotFeed};
use crate::source::SourceFactory;
use crate::tracker::{JobTracker, ResumeOutcome, TrackerView};

/// One tracked job. `view` answers reads while the tracker is busy.
struct Entry {
    tracker: AsyncMutex<JobTracker>,
    view: TrackerView,
}

impl Entry {
    fn new(tracker: JobTracker) -> Arc<Self> {
        let view = tracker.view();
        Arc::new(Self {
            tracker: AsyncMutex::new(tracker),
            view,
        })
    }

    /// Stop the tracker now, or leave it to the call that has it borrowed.
    fn release(&self, forget_request: bool) {
        let Ok(mut tracker) = self.tracker.try_lock() else {
            debug!("Tracker busy; it detaches when the pending call returns");
            return;
        };
        if forget_request {
            tracker.dismiss();
        } else {
            tracker.detach();
        }
    }
}

type Registry = HashMap<JobId, Arc<Entry>>;

/// Whether `entry` is still the one registered under `job_id`.
fn holds(trackers: &Registry, job_id: &JobId, entry: &Arc<Entry>) -> bool {
    trackers
        .get(job_id)
        .map(|current| Arc::ptr_eq(current, entry))
        .unwrap_or(false)
}

pub struct JobHub {
    submitter: Arc<dyn JobSubmitter>,
    factory: Arc<SourceFactory>,
    trackers: Mutex<Registry>,
}

impl JobHub {
    pub fn new(submitter: Arc<dyn JobSubmitter>, factory: SourceFactory) -> Self {
        Self {
            submitter,
            factory: Arc::new(factory),
            trackers: Mutex::new(HashMap::new()),
        }
    }

    /// Hub backed by one API client for submission and polling, with an
    /// optional feed for push-delivered kinds.
    pub fn with_client(
        client: ApiClient,
        config: TrackerConfig,
        feed: Option<Arc<dyn SnapshotFeed>>,
    ) -> Self {
        let client = Arc::new(client);
        let mut factory = SourceFactory::new(client.clone(), config);
        if let Some(feed) = feed {
            factory = factory.with_feed(feed);
        }
        Self::new(client, factory)
    }

    /// Hub configured from the environment (`.env` included). Terminal
    /// status reads are cached for `ADFLOW_STATUS_CACHE_TTL_SECS`; push kinds
    /// use Redis when `ADFLOW_REDIS_URL` is set and fall back to polling
    /// otherwise.
    pub fn from_env() -> TrackerResult<Self> {
        let config = TrackerConfig::load();
        let client = ApiClient::from_env()?;
        let cache = Arc::new(ResponseCache::new(client.config().status_cache_ttl));
        let client = client.with_cache(cache);

        let feed: Option<Arc<dyn SnapshotFeed>> = match &config.redis_url {
            Some(url) => Some(Arc::new(RedisSnapshotFeed::new(url)?)),
            None => None,
        };
        info!(push_kinds = ?config.push_kinds, redis = feed.is_some(), "Job hub configured");
        Ok(Self::with_client(client, config, feed))
    }

    fn trackers(&self) -> MutexGuard<'_, Registry> {
        self.trackers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn new_tracker(&self) -> JobTracker {
        JobTracker::new(Arc::clone(&self.factory)).with_submitter(Arc::clone(&self.submitter))
    }

    /// Start a job and begin tracking it.
    pub async fn submit(&self, kind: JobKind, request: Value) -> TrackerResult<JobId> {
        let mut tracker = self.new_tracker();
        let job_id = tracker.submit(kind, request).await?;

        match self.trackers().entry(job_id.clone()) {
            Slot::Vacant(slot) => {
                slot.insert(Entry::new(tracker));
            }
            Slot::Occupied(_) => debug!(job_id = %job_id, "Submitted job already tracked"),
        }
        Ok(job_id)
    }

    /// Follow `job_id`. Tracking an id twice shares the existing tracker.
    pub fn track(&self, job_id: JobId, kind: JobKind) -> watch::Receiver<Option<Job>> {
        let mut trackers = self.trackers();
        if let Some(entry) = trackers.get(&job_id) {
            return entry.view.subscribe();
        }

        let mut tracker = self.new_tracker();
        tracker.attach(job_id.clone(), kind);
        let entry = Entry::new(tracker);
        let receiver = entry.view.subscribe();
        trackers.insert(job_id, entry);
        receiver
    }

    /// Resume a job id remembered from an earlier session.
    ///
    /// A job that is stopped before its check completes is reported as
    /// [`ResumeOutcome::Cleared`] and left untracked.
    pub async fn resume(&self, job_id: JobId, kind: JobKind) -> ResumeOutcome {
        let entry = {
            let mut trackers = self.trackers();
            match trackers.get(&job_id) {
                Some(entry) => Arc::clone(entry),
                None => {
                    let entry = Entry::new(self.new_tracker());
                    trackers.insert(job_id.clone(), Arc::clone(&entry));
                    entry
                }
            }
        };

        let mut tracker = entry.tracker.lock().await;
        let claimed = holds(&self.trackers(), &job_id, &entry);
        if !claimed {
            return ResumeOutcome::Cleared;
        }
        if let Some(job) = entry.view.job_id().and(entry.view.current()) {
            if job.is_terminal() {
                return ResumeOutcome::Finished(job);
            }
            return ResumeOutcome::Attached;
        }

        let outcome = tracker.resume(job_id.clone(), kind).await;

        let mut trackers = self.trackers();
        if !holds(&trackers, &job_id, &entry) {
            drop(trackers);
            tracker.detach();
            info!(job_id = %job_id, "Job stopped while resuming");
            return ResumeOutcome::Cleared;
        }
        if outcome == ResumeOutcome::Cleared {
            trackers.remove(&job_id);
        }
        outcome
    }

    /// Retry a failed job. A resubmitted job is tracked under its new id.
    ///
    /// If the job is stopped while the retry is in flight, the retried job
    /// is not tracked; its id is still returned.
    pub async fn retry(&self, job_id: &JobId) -> TrackerResult<JobId> {
        let entry = self
            .trackers()
            .get(job_id)
            .cloned()
            .ok_or(TrackerError::NothingToRetry)?;

        let mut tracker = entry.tracker.lock().await;
        let claimed = holds(&self.trackers(), job_id, &entry);
        if !claimed {
            return Err(TrackerError::NothingToRetry);
        }

        let new_id = tracker.retry().await?;

        let mut trackers = self.trackers();
        if !holds(&trackers, job_id, &entry) {
            drop(trackers);
            tracker.detach();
            info!(job_id = %new_id, "Job stopped while retrying; not tracking the retry");
            return Ok(new_id);
        }
        if new_id != *job_id {
            trackers.remove(job_id);
            match trackers.entry(new_id.clone()) {
                Slot::Vacant(slot) => {
                    slot.insert(Arc::clone(&entry));
                }
                Slot::Occupied(_) => {
                    tracker.detach();
                    debug!(job_id = %new_id, "Retried job already tracked");
                }
            }
        }
        Ok(new_id)
    }

    /// Latest snapshot of a tracked job.
    pub fn current(&self, job_id: &JobId) -> Option<Job> {
        self.trackers().get(job_id).and_then(|entry| entry.view.current())
    }

    /// Observe a job that is already tracked.
    pub fn subscribe(&self, job_id: &JobId) -> Option<watch::Receiver<Option<Job>>> {
        self.trackers().get(job_id).map(|entry| entry.view.subscribe())
    }

    /// Stop tracking `job_id`. Returns whether it was tracked.
    pub fn stop(&self, job_id: &JobId) -> bool {
        let removed = self.trackers().remove(job_id);
        match removed {
            Some(entry) => {
                entry.release(false);
                info!(job_id = %job_id, "Stopped tracking job");
                true
            }
            None => false,
        }
    }

    /// Clear a finished job from the hub and from its observers.
    pub fn dismiss(&self, job_id: &JobId) -> bool {
        let removed = self.trackers().remove(job_id);
        match removed {
            Some(entry) => {
                entry.release(true);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let entries: Vec<_> = self.trackers().drain().collect();
        for (_, entry) in entries {
            entry.release(false);
        }
    }

    /// Ids currently held by the hub.
    pub fn tracked(&self) -> Vec<JobId> {
        self.trackers().keys().cloned().collect()
    }
}
