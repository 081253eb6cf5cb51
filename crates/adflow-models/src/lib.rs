//! Shared models for the adflow job tracker.
//!
//! This crate provides Serde-serializable types for:
//! - Remote jobs, their status and failure classes
//! - Backend and realtime wire envelopes
//! - Projects and scenes

pub mod error;
pub mod job;
pub mod project;
pub mod wire;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{Delivery, Job, JobErrorKind, JobId, JobKind, JobStatus, SubItem};
pub use project::{ActiveJob, Project, Scene, SceneUpdate};
pub use wire::{RemoteJobStatus, StatusEnvelope, SubmitEnvelope};
