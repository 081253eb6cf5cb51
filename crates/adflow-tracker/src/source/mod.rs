//! Status delivery strategies.
//!
//! A [`JobStatusSource`] turns one remote job into a stream of [`JobUpdate`]s
//! pushed into an [`UpdateSink`]. Two strategies exist: [`PollingSource`]
//! fetches over HTTP at a fixed interval, [`PushSource`] follows a
//! [`SnapshotFeed`]. Both run their loop in one spawned task and route every
//! emission through the same [`Emitter`] gate, so terminal self-stop and
//! stop-then-late-response behave identically.

mod polling;
mod push;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument, Span};

use adflow_client::StatusFetcher;
use adflow_models::{Delivery, Job, JobErrorKind, JobId, JobKind};

use crate::config::TrackerConfig;
use crate::feed::SnapshotFeed;

pub use self::polling::PollingSource;
pub use self::push::PushSource;

/// One delivery from a status source.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Full replacement snapshot.
    Snapshot(Job),
    /// The remote system has no record of the job.
    NotFound,
}

impl JobUpdate {
    pub fn is_terminal(&self) -> bool {
        match self {
            JobUpdate::Snapshot(job) => job.is_terminal(),
            JobUpdate::NotFound => true,
        }
    }
}

/// Receiver of source updates.
///
/// Called synchronously from the source task while its gate is held; it must
/// not call back into the source.
pub type UpdateSink = Arc<dyn Fn(JobUpdate) + Send + Sync>;

/// Lifecycle of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Polling,
    Subscribed,
    Stopped,
}

impl SourceState {
    pub fn is_active(&self) -> bool {
        matches!(self, SourceState::Polling | SourceState::Subscribed)
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceState::Idle => "idle",
            SourceState::Polling => "polling",
            SourceState::Subscribed => "subscribed",
            SourceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Delivers status updates for one job at a time.
pub trait JobStatusSource: Send + Sync {
    /// Begin delivering updates for `job_id` into `sink`. A source that is
    /// already running is stopped first.
    fn start(&mut self, job_id: JobId, sink: UpdateSink);

    /// Stop delivering. Safe to call repeatedly or before `start`.
    fn stop(&mut self);

    fn state(&self) -> SourceState;

    fn delivery(&self) -> Delivery;
}

/// Gate every emission passes through.
///
/// Once the source is stopped, or a terminal update has gone out, nothing
/// else reaches the sink.
#[derive(Clone)]
pub(crate) struct Emitter {
    state: Arc<Mutex<SourceState>>,
    cancel: CancellationToken,
    sink: UpdateSink,
}

impl Emitter {
    /// Deliver `update`. Returns `false` when the loop should end.
    pub(crate) fn emit(&self, update: JobUpdate) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_active() || self.cancel.is_cancelled() {
            return false;
        }
        let terminal = update.is_terminal();
        if terminal {
            *state = SourceState::Stopped;
            self.cancel.cancel();
        }
        (self.sink)(update);
        !terminal
    }

    pub(crate) fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Task and state bookkeeping shared by both strategies.
pub(crate) struct SourceCore {
    state: Arc<Mutex<SourceState>>,
    running: Option<Running>,
}

impl SourceCore {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState::Idle)),
            running: None,
        }
    }

    pub(crate) fn state(&self) -> SourceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop any previous loop, then spawn `run` inside `span` in `active` state.
    pub(crate) fn launch<F, Fut>(
        &mut self,
        active: SourceState,
        span: Span,
        sink: UpdateSink,
        run: F,
    ) where
        F: FnOnce(Emitter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();

        let cancel = CancellationToken::new();
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = active;
        let emitter = Emitter {
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
            sink,
        };

        let task = tokio::spawn(run(emitter).instrument(span));
        self.running = Some(Running { cancel, task });
    }

    pub(crate) fn stop(&mut self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SourceState::Idle {
                *state = SourceState::Stopped;
            }
        }
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.task.abort();
        }
    }
}

impl Drop for SourceCore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Last known snapshot turned into a transport failure.
pub(crate) fn lost_contact(
    last_known: Option<Job>,
    job_id: &JobId,
    kind: JobKind,
    error_kind: JobErrorKind,
    message: impl Into<String>,
) -> Job {
    last_known
        .unwrap_or_else(|| Job::pending(job_id.clone(), kind))
        .into_failed(error_kind, message)
}

/// Result of the one-shot check made before resuming a known job id.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Found(Job),
    Missing,
    /// The check itself failed; the job may or may not exist.
    Unreachable(String),
}

/// Builds the source for a job kind.
#[derive(Clone)]
pub struct SourceFactory {
    fetcher: Arc<dyn StatusFetcher>,
    feed: Option<Arc<dyn SnapshotFeed>>,
    config: TrackerConfig,
}

impl SourceFactory {
    pub fn new(fetcher: Arc<dyn StatusFetcher>, config: TrackerConfig) -> Self {
        Self {
            fetcher,
            feed: None,
            config,
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn SnapshotFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Delivery used for `kind`. Push kinds fall back to polling when no feed
    /// is configured.
    pub fn delivery_for(&self, kind: JobKind) -> Delivery {
        match (self.config.delivery(kind), &self.feed) {
            (Delivery::Push, Some(_)) => Delivery::Push,
            _ => Delivery::Poll,
        }
    }

    pub fn create(&self, kind: JobKind) -> Box<dyn JobStatusSource> {
        match (self.delivery_for(kind), &self.feed) {
            (Delivery::Push, Some(feed)) => Box::new(PushSource::new(Arc::clone(feed), kind)),
            _ => Box::new(PollingSource::new(
                Arc::clone(&self.fetcher),
                kind,
                self.config.poll_interval(kind),
                self.config.retry_policy(),
            )),
        }
    }

    /// One status read through the channel `kind` is delivered on.
    pub async fn verify(&self, kind: JobKind, job_id: &JobId) -> Verification {
        match (self.delivery_for(kind), &self.feed) {
            (Delivery::Push, Some(feed)) => match feed.latest(kind, job_id).await {
                Ok(Some(job)) => Verification::Found(job),
                Ok(None) => Verification::Missing,
                Err(e) => {
                    warn!(job_id = %job_id, kind = %kind, "Feed lookup failed: {}", e);
                    Verification::Unreachable(e.to_string())
                }
            },
            _ => match self.fetcher.fetch_status(kind, job_id).await {
                Ok(job) => Verification::Found(job),
                Err(e) if e.is_not_found() => Verification::Missing,
                Err(e) => {
                    warn!(job_id = %job_id, kind = %kind, "Status check failed: {}", e);
                    Verification::Unreachable(e.to_string())
                }
            },
        }
    }
}
