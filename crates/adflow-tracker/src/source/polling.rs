//! Fixed-interval HTTP polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use adflow_client::StatusFetcher;
use adflow_models::{Delivery, Job, JobErrorKind, JobId, JobKind};

use super::{lost_contact, Emitter, JobStatusSource, JobUpdate, SourceCore, SourceState, UpdateSink};
use crate::logging::JobLogger;
use crate::metrics::{outcome, record_poll, record_polling_exhausted};
use crate::retry::{FailureCounter, RetryDecision, RetryPolicy};

/// Polls `GET /jobs/{kind}/status/{id}` until the job is terminal.
///
/// The first fetch happens immediately; later ones follow at `interval`.
/// Fetches never overlap: the next tick waits for the previous response.
pub struct PollingSource {
    fetcher: Arc<dyn StatusFetcher>,
    kind: JobKind,
    interval: Duration,
    policy: RetryPolicy,
    core: SourceCore,
}

impl PollingSource {
    pub fn new(
        fetcher: Arc<dyn StatusFetcher>,
        kind: JobKind,
        interval: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            kind,
            interval,
            policy,
            core: SourceCore::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl JobStatusSource for PollingSource {
    fn start(&mut self, job_id: JobId, sink: UpdateSink) {
        let logger = JobLogger::new(&job_id, self.kind);
        logger.log_start(&format!("polling every {:?}", self.interval));

        let fetcher = Arc::clone(&self.fetcher);
        let (kind, interval, policy) = (self.kind, self.interval, self.policy);
        let span = logger.create_span();
        self.core.launch(SourceState::Polling, span, sink, move |emitter| {
            poll_loop(fetcher, kind, job_id, interval, policy, emitter, logger)
        });
    }

    fn stop(&mut self) {
        self.core.stop();
    }

    fn state(&self) -> SourceState {
        self.core.state()
    }

    fn delivery(&self) -> Delivery {
        Delivery::Poll
    }
}

async fn poll_loop(
    fetcher: Arc<dyn StatusFetcher>,
    kind: JobKind,
    job_id: JobId,
    interval: Duration,
    policy: RetryPolicy,
    emitter: Emitter,
    logger: JobLogger,
) {
    let cancel = emitter.cancelled().clone();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failures = FailureCounter::new(policy);
    let mut last_known: Option<Job> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fetcher.fetch_status(kind, &job_id) => result,
        };

        match result {
            Ok(job) => {
                record_poll(kind.as_str(), outcome::OK);
                failures.record_success();
                last_known = Some(job.clone());
                if !emitter.emit(JobUpdate::Snapshot(job)) {
                    break;
                }
            }
            Err(e) if e.is_not_found() => {
                record_poll(kind.as_str(), outcome::NOT_FOUND);
                debug!(job_id = %job_id, "Job no longer exists");
                emitter.emit(JobUpdate::NotFound);
                break;
            }
            Err(e) => {
                record_poll(kind.as_str(), outcome::TRANSIENT);
                match failures.record_failure() {
                    RetryDecision::Continue => {
                        warn!(
                            job_id = %job_id,
                            kind = %kind,
                            attempt = failures.consecutive(),
                            "Status poll failed: {}", e
                        );
                    }
                    RetryDecision::GiveUp => {
                        record_polling_exhausted(kind.as_str());
                        logger.log_error(&format!(
                            "giving up after {} consecutive failures: {}",
                            failures.consecutive(),
                            e
                        ));
                        let failed = lost_contact(
                            last_known.take(),
                            &job_id,
                            kind,
                            JobErrorKind::PollingExhausted,
                            JobErrorKind::PollingExhausted.default_message(),
                        );
                        emitter.emit(JobUpdate::Snapshot(failed));
                        break;
                    }
                }
            }
        }
    }
}
