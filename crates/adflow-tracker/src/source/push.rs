//! Realtime delivery over a snapshot feed.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::debug;

use adflow_models::{Delivery, Job, JobErrorKind, JobId, JobKind};

use super::{lost_contact, Emitter, JobStatusSource, JobUpdate, SourceCore, SourceState, UpdateSink};
use crate::feed::{FeedEvent, SnapshotFeed};
use crate::logging::JobLogger;
use crate::metrics::record_push_event;

/// Follows a job's document on a [`SnapshotFeed`], emitting each write as it
/// arrives.
pub struct PushSource {
    feed: Arc<dyn SnapshotFeed>,
    kind: JobKind,
    core: SourceCore,
}

impl PushSource {
    pub fn new(feed: Arc<dyn SnapshotFeed>, kind: JobKind) -> Self {
        Self {
            feed,
            kind,
            core: SourceCore::new(),
        }
    }
}

impl JobStatusSource for PushSource {
    fn start(&mut self, job_id: JobId, sink: UpdateSink) {
        let logger = JobLogger::new(&job_id, self.kind);
        logger.log_start("subscribing to snapshot feed");

        let feed = Arc::clone(&self.feed);
        let kind = self.kind;
        let span = logger.create_span();
        self.core.launch(SourceState::Subscribed, span, sink, move |emitter| {
            push_loop(feed, kind, job_id, emitter, logger)
        });
    }

    fn stop(&mut self) {
        self.core.stop();
    }

    fn state(&self) -> SourceState {
        self.core.state()
    }

    fn delivery(&self) -> Delivery {
        Delivery::Push
    }
}

async fn push_loop(
    feed: Arc<dyn SnapshotFeed>,
    kind: JobKind,
    job_id: JobId,
    emitter: Emitter,
    logger: JobLogger,
) {
    let cancel = emitter.cancelled().clone();
    let subscription_failed = |last_known: Option<Job>, message: String| {
        logger.log_error(&format!("subscription failed: {}", message));
        JobUpdate::Snapshot(lost_contact(
            last_known,
            &job_id,
            kind,
            JobErrorKind::SubscriptionFailed,
            message,
        ))
    };

    let subscribed = tokio::select! {
        _ = cancel.cancelled() => return,
        subscribed = feed.subscribe(kind, &job_id) => subscribed,
    };
    let mut stream = match subscribed {
        Ok(stream) => stream,
        Err(e) => {
            record_push_event(kind.as_str(), "error");
            emitter.emit(subscription_failed(None, e.to_string()));
            return;
        }
    };

    let mut last_known: Option<Job> = None;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => event,
        };

        match event {
            Some(Ok(FeedEvent::Snapshot(job))) => {
                record_push_event(kind.as_str(), "snapshot");
                last_known = Some(job.clone());
                if !emitter.emit(JobUpdate::Snapshot(job)) {
                    break;
                }
            }
            Some(Ok(FeedEvent::Deleted)) => {
                record_push_event(kind.as_str(), "deleted");
                debug!(job_id = %job_id, "Job document deleted");
                emitter.emit(JobUpdate::NotFound);
                break;
            }
            Some(Err(e)) => {
                record_push_event(kind.as_str(), "error");
                emitter.emit(subscription_failed(last_known.take(), e.to_string()));
                break;
            }
            None => {
                record_push_event(kind.as_str(), "closed");
                emitter.emit(subscription_failed(last_known.take(), "subscription closed".to_string()));
                break;
            }
        }
    }
}
