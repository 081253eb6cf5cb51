//! Generation backend HTTP client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use adflow_models::{Job, JobId, JobKind, SceneUpdate, StatusEnvelope, SubmitEnvelope};

use crate::api::{JobSubmitter, ProjectWriter, StatusFetcher};
use crate::cache::ResponseCache;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_cache_hit, record_request};

/// Client for the generation backend.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
    status_cache: Option<Arc<ResponseCache<Job>>>,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("adflow-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            config,
            status_cache: None,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ApiConfig::from_env())
    }

    /// Serve terminal snapshots from `cache`.
    ///
    /// Completed and failed jobs never change, so once one has been seen its
    /// status can be answered locally until the entry expires.
    pub fn with_cache(mut self, cache: Arc<ResponseCache<Job>>) -> Self {
        self.status_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn jobs_url(&self, kind: JobKind) -> String {
        format!("{}/jobs/{}", self.config.base_url, kind.as_str())
    }

    fn status_url(&self, kind: JobKind, job_id: &JobId) -> String {
        format!(
            "{}/jobs/{}/status/{}",
            self.config.base_url,
            kind.as_str(),
            urlencoding::encode(job_id.as_str())
        )
    }

    fn cache_key(kind: JobKind, job_id: &JobId) -> String {
        format!("{}:{}", kind.as_str(), job_id)
    }

    async fn submit_job(&self, kind: JobKind, request: &Value) -> ApiResult<Job> {
        let url = self.jobs_url(kind);
        debug!(kind = %kind, "Submitting job to {}", url);

        self.execute_request("submit_job", kind, async {
            let response = self.http.post(&url).json(request).send().await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            let envelope = match serde_json::from_str::<SubmitEnvelope>(&body) {
                Ok(envelope) => envelope,
                Err(e) if status.is_success() => return Err(ApiError::Json(e)),
                Err(_) => SubmitEnvelope::default(),
            };

            if !status.is_success() || !envelope.success {
                let message = envelope
                    .remote_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Failed to start {} job", kind));
                warn!(kind = %kind, status = status.as_u16(), "Job submission rejected: {}", message);
                return Err(ApiError::SubmissionRejected(message));
            }

            let job_id = envelope
                .job_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| ApiError::invalid_response("submit response is missing job_id"))?;

            Ok(Job::pending(JobId::from(job_id), kind))
        })
        .await
    }

    async fn get_status(&self, kind: JobKind, job_id: &JobId) -> ApiResult<Job> {
        let key = Self::cache_key(kind, job_id);
        if let Some(cache) = &self.status_cache {
            if let Some(job) = cache.get(&key).await {
                record_cache_hit(kind.as_str());
                return Ok(job);
            }
        }

        let url = self.status_url(kind, job_id);
        let job = self
            .execute_request("get_status", kind, async {
                let response = self.http.get(&url).send().await?;
                let status = response.status();

                match status {
                    StatusCode::OK => {
                        let envelope: StatusEnvelope = response.json().await?;
                        if !envelope.success {
                            return Err(ApiError::invalid_response(
                                envelope
                                    .remote_message()
                                    .unwrap_or("status request was not successful")
                                    .to_string(),
                            ));
                        }
                        let remote = envelope.job_status.ok_or_else(|| {
                            ApiError::invalid_response("status response is missing job_status")
                        })?;
                        Ok(remote.into_job(job_id, kind))
                    }
                    StatusCode::NOT_FOUND => {
                        Err(ApiError::NotFound(format!("{} job {}", kind, job_id)))
                    }
                    _ => Err(Self::handle_error_response(status, &url, response).await),
                }
            })
            .await?;

        if job.is_terminal() {
            if let Some(cache) = &self.status_cache {
                cache.insert(key, job.clone()).await;
            }
        }

        Ok(job)
    }

    async fn patch_scene(
        &self,
        project_id: &str,
        scene_id: &str,
        update: &SceneUpdate,
    ) -> ApiResult<()> {
        let url = format!(
            "{}/projects/{}/scenes/{}",
            self.config.base_url,
            urlencoding::encode(project_id),
            urlencoding::encode(scene_id)
        );

        let span = info_span!("backend_request", operation = "update_scene", project_id = %project_id);
        let start = Instant::now();
        let result = async {
            let response = self.http.patch(&url).json(update).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(Self::handle_error_response(status, &url, response).await)
            }
        }
        .instrument(span)
        .await;

        record_request("update_scene", Self::metric_status(&result), start.elapsed().as_millis() as f64);
        result
    }

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(&self, operation: &str, kind: JobKind, fut: F) -> ApiResult<T>
    where
        F: std::future::Future<Output = ApiResult<T>>,
    {
        let span = info_span!("backend_request", operation = %operation, kind = %kind);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        record_request(operation, Self::metric_status(&result), latency_ms);
        result
    }

    fn metric_status<T>(result: &ApiResult<T>) -> u16 {
        match result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        }
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: reqwest::Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        ApiError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[async_trait]
impl JobSubmitter for ApiClient {
    async fn submit(&self, kind: JobKind, request: &Value) -> ApiResult<Job> {
        self.submit_job(kind, request).await
    }
}

#[async_trait]
impl StatusFetcher for ApiClient {
    async fn fetch_status(&self, kind: JobKind, job_id: &JobId) -> ApiResult<Job> {
        self.get_status(kind, job_id).await
    }
}

#[async_trait]
impl ProjectWriter for ApiClient {
    async fn update_scene(
        &self,
        project_id: &str,
        scene_id: &str,
        update: &SceneUpdate,
    ) -> ApiResult<()> {
        self.patch_scene(project_id, scene_id, update).await
    }
}
