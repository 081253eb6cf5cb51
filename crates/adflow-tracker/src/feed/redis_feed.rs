//! Job snapshots via Redis Pub/Sub.
//!
//! Producers write each job document to `adflow:jobs:{kind}:{id}:latest` and
//! publish the same JSON on `adflow:jobs:{kind}:{id}`. A `null` payload marks
//! the document as deleted.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use adflow_models::{Job, JobId, JobKind, RemoteJobStatus};

use super::{topic, FeedEvent, FeedStream, SnapshotFeed};
use crate::error::FeedResult;

/// How long the latest snapshot is kept when no TTL is configured.
const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Snapshot feed backed by Redis.
pub struct RedisSnapshotFeed {
    client: redis::Client,
    snapshot_ttl: Duration,
}

impl RedisSnapshotFeed {
    pub fn new(redis_url: &str) -> FeedResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
        })
    }

    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    fn latest_key(kind: JobKind, job_id: &JobId) -> String {
        format!("{}:latest", topic(kind, job_id))
    }

    /// Store `job` as the latest snapshot and notify subscribers.
    pub async fn publish(&self, job: &Job) -> FeedResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = topic(job.kind, &job.id);
        let payload = serde_json::to_string(job)?;

        debug!("Publishing job snapshot to {}", channel);
        conn.set_ex::<_, _, ()>(
            Self::latest_key(job.kind, &job.id),
            &payload,
            self.snapshot_ttl.as_secs().max(1),
        )
        .await?;
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Remove the stored snapshot and tell subscribers the job is gone.
    pub async fn delete(&self, kind: JobKind, job_id: &JobId) -> FeedResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::latest_key(kind, job_id)).await?;
        conn.publish::<_, _, ()>(topic(kind, job_id), "null").await?;
        Ok(())
    }
}

/// Snapshots written by [`RedisSnapshotFeed::publish`] are full `Job`s and
/// keep their failure class; anything else is read as a realtime document.
fn decode(payload: &str, kind: JobKind, job_id: &JobId) -> FeedResult<FeedEvent> {
    let document: Value = serde_json::from_str(payload)?;
    if document.is_null() {
        return Ok(FeedEvent::Deleted);
    }

    if let Ok(mut job) = serde_json::from_value::<Job>(document.clone()) {
        job.id = job_id.clone();
        job.kind = kind;
        return Ok(FeedEvent::Snapshot(job));
    }
    let remote: RemoteJobStatus = serde_json::from_value(document)?;
    Ok(FeedEvent::Snapshot(remote.into_job(job_id, kind)))
}

#[async_trait]
impl SnapshotFeed for RedisSnapshotFeed {
    async fn subscribe(&self, kind: JobKind, job_id: &JobId) -> FeedResult<FeedStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = topic(kind, job_id);
        pubsub.subscribe(&channel).await?;
        debug!("Subscribed to {}", channel);

        // Read after subscribing so a write landing in between is not lost.
        let initial: Option<FeedResult<FeedEvent>> =
            self.latest(kind, job_id).await?.map(|job| Ok(FeedEvent::Snapshot(job)));

        let id = job_id.clone();
        let updates = pubsub.into_on_message().map(move |msg| {
            let payload: String = msg.get_payload()?;
            decode(&payload, kind, &id)
        });

        Ok(Box::pin(stream::iter(initial).chain(updates)))
    }

    async fn latest(&self, kind: JobKind, job_id: &JobId) -> FeedResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::latest_key(kind, job_id)).await?;
        match payload {
            Some(payload) => match decode(&payload, kind, job_id)? {
                FeedEvent::Snapshot(job) => Ok(Some(job)),
                FeedEvent::Deleted => Ok(None),
            },
            None => Ok(None),
        }
    }
}
