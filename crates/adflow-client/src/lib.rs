//! Client for the generation backend job endpoints.
//!
//! This crate provides:
//! - Job submission (`POST /jobs/{kind}`)
//! - Job status reads (`GET /jobs/{kind}/status/{id}`)
//! - Scene edits for project documents
//! - An owned TTL cache for terminal status snapshots

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;

pub use api::{JobSubmitter, ProjectWriter, StatusFetcher};
pub use cache::ResponseCache;
pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
