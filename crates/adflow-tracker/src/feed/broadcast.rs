//! In-process snapshot feed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use adflow_models::{Job, JobId, JobKind};

use super::{topic, FeedEvent, FeedStream, SnapshotFeed};
use crate::error::FeedResult;

const DEFAULT_CAPACITY: usize = 64;

struct Topic {
    sender: broadcast::Sender<FeedEvent>,
    latest: Option<Job>,
}

/// Snapshot feed backed by `tokio::sync::broadcast`, one channel per job.
///
/// Snapshots replace each other wholesale, so a lagging subscriber simply
/// skips to the newest one.
pub struct BroadcastFeed {
    capacity: usize,
    topics: Mutex<HashMap<String, Topic>>,
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn with_topic<R>(&self, name: String, f: impl FnOnce(&mut Topic) -> R) -> R {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = self.capacity;
        let topic = topics.entry(name).or_insert_with(|| Topic {
            sender: broadcast::channel(capacity).0,
            latest: None,
        });
        f(topic)
    }

    /// Store `job` as the latest snapshot and send it to subscribers.
    /// Returns the number of subscribers reached.
    pub fn publish(&self, job: &Job) -> usize {
        self.with_topic(topic(job.kind, &job.id), |topic| {
            topic.latest = Some(job.clone());
            topic.sender.send(FeedEvent::Snapshot(job.clone())).unwrap_or(0)
        })
    }

    /// Forget the stored snapshot and tell subscribers the job is gone.
    pub fn delete(&self, kind: JobKind, job_id: &JobId) -> usize {
        self.with_topic(topic(kind, job_id), |topic| {
            topic.latest = None;
            topic.sender.send(FeedEvent::Deleted).unwrap_or(0)
        })
    }

    /// Drop the topic; open subscriptions end.
    pub fn close(&self, kind: JobKind, job_id: &JobId) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.remove(&topic(kind, job_id));
    }

    pub fn subscriber_count(&self, kind: JobKind, job_id: &JobId) -> usize {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .get(&topic(kind, job_id))
            .map(|topic| topic.sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SnapshotFeed for BroadcastFeed {
    async fn subscribe(&self, kind: JobKind, job_id: &JobId) -> FeedResult<FeedStream> {
        let (receiver, latest) = self.with_topic(topic(kind, job_id), |topic| {
            (topic.sender.subscribe(), topic.latest.clone())
        });

        let initial: Option<FeedResult<FeedEvent>> = latest.map(|job| Ok(FeedEvent::Snapshot(job)));
        let updates = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Feed subscriber lagged; skipping to newest snapshot");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream::iter(initial).chain(updates)))
    }

    async fn latest(&self, kind: JobKind, job_id: &JobId) -> FeedResult<Option<Job>> {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        Ok(topics
            .get(&topic(kind, job_id))
            .and_then(|topic| topic.latest.clone()))
    }
}
