//! Realtime snapshot feeds.
//!
//! A feed delivers whole-document job snapshots as they are written. The push
//! source subscribes to one topic per job; resume reads the latest snapshot.

mod broadcast;
mod redis_feed;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use adflow_models::{Job, JobId, JobKind};

use crate::error::FeedResult;

pub use self::broadcast::BroadcastFeed;
pub use self::redis_feed::RedisSnapshotFeed;

/// One change to a job document.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The document was written; carries the full snapshot.
    Snapshot(Job),
    /// The document was removed.
    Deleted,
}

/// Stream of feed events for one job.
pub type FeedStream = Pin<Box<dyn Stream<Item = FeedResult<FeedEvent>> + Send>>;

#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    /// Subscribe to `(kind, job_id)`. The latest stored snapshot, if any, is
    /// yielded first.
    async fn subscribe(&self, kind: JobKind, job_id: &JobId) -> FeedResult<FeedStream>;

    /// Latest stored snapshot; `None` if the job is unknown.
    async fn latest(&self, kind: JobKind, job_id: &JobId) -> FeedResult<Option<Job>>;
}

/// Topic name for a job.
pub fn topic(kind: JobKind, job_id: &JobId) -> String {
    format!("adflow:jobs:{}:{}", kind.as_str(), job_id)
}
