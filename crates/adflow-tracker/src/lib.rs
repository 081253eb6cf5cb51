//! Remote job tracking.
//!
//! This crate provides:
//! - Status sources: fixed-interval HTTP polling and realtime snapshot feeds
//! - Snapshot feeds over Redis Pub/Sub or in-process broadcast channels
//! - A per-job tracker with retry, resume and dismiss
//! - A hub that keeps one tracker per job id
//! - Optimistic project edits with revert on failure

pub mod config;
pub mod error;
pub mod feed;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod optimistic;
pub mod retry;
pub mod source;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{FeedError, FeedResult, TrackerError, TrackerResult};
pub use feed::{BroadcastFeed, FeedEvent, FeedStream, RedisSnapshotFeed, SnapshotFeed};
pub use hub::JobHub;
pub use logging::{init_tracing, JobLogger};
pub use optimistic::{Optimistic, SceneEditor, Tentative};
pub use retry::{FailureCounter, RetryDecision, RetryPolicy};
pub use source::{
    JobStatusSource, JobUpdate, PollingSource, PushSource, SourceFactory, SourceState, UpdateSink,
    Verification,
};
pub use tracker::{JobTracker, ResumeOutcome};
