//! Tracker error types.

use thiserror::Error;

use adflow_client::ApiError;
use adflow_models::{JobErrorKind, ModelError};

pub type TrackerResult<T> = Result<T, TrackerError>;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The start request failed; never retried automatically.
    #[error("Job submission failed: {0}")]
    Submission(#[source] ApiError),

    #[error("No job submitter configured")]
    NoSubmitter,

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error("Job failure is not retryable: {0}")]
    NotRetryable(JobErrorKind),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid edit: {0}")]
    Model(#[from] ModelError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
}

/// Errors raised by a snapshot feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl FeedError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
