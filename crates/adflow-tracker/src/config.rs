//! Tracker configuration.

use std::time::Duration;

use tracing::warn;

use adflow_models::{Delivery, JobKind};

use crate::retry::RetryPolicy;

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Poll interval for video generation jobs
    pub video_poll_interval: Duration,
    /// Poll interval for composition jobs
    pub composition_poll_interval: Duration,
    /// Poll interval for image generation jobs (when polled)
    pub image_poll_interval: Duration,
    /// Poll interval for single-scene video jobs (when polled)
    pub scene_poll_interval: Duration,
    /// Consecutive failed polls tolerated before giving up
    pub max_consecutive_failures: u32,
    /// Kinds observed through the snapshot feed instead of polling
    pub push_kinds: Vec<JobKind>,
    /// Redis URL for the snapshot feed
    pub redis_url: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            video_poll_interval: JobKind::VideoGeneration.default_poll_interval(),
            composition_poll_interval: JobKind::Composition.default_poll_interval(),
            image_poll_interval: JobKind::ImageGeneration.default_poll_interval(),
            scene_poll_interval: JobKind::SceneVideo.default_poll_interval(),
            max_consecutive_failures: RetryPolicy::default().max_consecutive_failures,
            push_kinds: JobKind::ALL
                .into_iter()
                .filter(|kind| kind.default_delivery() == Delivery::Push)
                .collect(),
            redis_url: None,
        }
    }
}

impl TrackerConfig {
    /// Load `.env` (if present), then read the environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            video_poll_interval: env_millis("ADFLOW_POLL_INTERVAL_VIDEO_MS")
                .unwrap_or(defaults.video_poll_interval),
            composition_poll_interval: env_millis("ADFLOW_POLL_INTERVAL_COMPOSITION_MS")
                .unwrap_or(defaults.composition_poll_interval),
            image_poll_interval: env_millis("ADFLOW_POLL_INTERVAL_IMAGE_MS")
                .unwrap_or(defaults.image_poll_interval),
            scene_poll_interval: env_millis("ADFLOW_POLL_INTERVAL_SCENE_MS")
                .unwrap_or(defaults.scene_poll_interval),
            max_consecutive_failures: std::env::var("ADFLOW_POLL_MAX_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_consecutive_failures),
            push_kinds: std::env::var("ADFLOW_PUSH_KINDS")
                .map(|raw| parse_kinds(&raw))
                .unwrap_or(defaults.push_kinds),
            redis_url: std::env::var("ADFLOW_REDIS_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn poll_interval(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::VideoGeneration => self.video_poll_interval,
            JobKind::Composition => self.composition_poll_interval,
            JobKind::ImageGeneration => self.image_poll_interval,
            JobKind::SceneVideo => self.scene_poll_interval,
        }
    }

    /// Configured delivery for `kind`.
    pub fn delivery(&self, kind: JobKind) -> Delivery {
        if self.push_kinds.contains(&kind) {
            Delivery::Push
        } else {
            Delivery::Poll
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_consecutive_failures)
    }

    pub fn with_poll_interval(mut self, kind: JobKind, interval: Duration) -> Self {
        match kind {
            JobKind::VideoGeneration => self.video_poll_interval = interval,
            JobKind::Composition => self.composition_poll_interval = interval,
            JobKind::ImageGeneration => self.image_poll_interval = interval,
            JobKind::SceneVideo => self.scene_poll_interval = interval,
        }
        self
    }

    pub fn with_push_kinds(mut self, kinds: impl IntoIterator<Item = JobKind>) -> Self {
        self.push_kinds = kinds.into_iter().collect();
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|ms: &u64| *ms > 0)
        .map(Duration::from_millis)
}

fn parse_kinds(raw: &str) -> Vec<JobKind> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<JobKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!("Ignoring ADFLOW_PUSH_KINDS entry: {}", e);
                None
            }
        })
        .collect()
}
