//! Structured logging for tracked jobs.
//!
//! [`init_tracing`] installs a subscriber for binaries embedding the tracker;
//! [`JobLogger`] keeps job lifecycle logs consistent across sources.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adflow_models::{JobId, JobKind};

/// Install a global subscriber: colored text by default, JSON when
/// `LOG_FORMAT=json`. Filtering follows `RUST_LOG` with `adflow=info` added.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing() -> bool {
    let use_json = wants_json(std::env::var("LOG_FORMAT").ok().as_deref());
    let env_filter = env_filter(EnvFilter::from_default_env());

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .try_init()
    };
    result.is_ok()
}

fn wants_json(log_format: Option<&str>) -> bool {
    log_format
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn env_filter(base: EnvFilter) -> EnvFilter {
    match "adflow=info".parse() {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: JobKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
        }
    }

    /// Log the start of tracking.
    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job tracking started: {}", message);
    }

    pub fn log_progress(&self, progress: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = %self.kind,
            progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, kind = %self.kind, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, kind = %self.kind, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span carrying the job's identity, for instrumenting source tasks.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, kind = %self.kind)
    }
}
