//! REST video generation provider.
//!
//! Speaks the common async job protocol: `POST {base}/video/generations`
//! creates a task, `GET {base}/video/generations/{id}` reports its status and
//! `DELETE` on the same path cancels it. Finished assets are fetched from the
//! URL the status response carries.

use async_trait::async_trait;
use base64::Engine;
use lumiere_core::{PollStatus, ProviderTaskId, SubmitRequest};
use lumiere_error::{ProviderError, ProviderErrorKind, ProviderResult, RetryableError};
use lumiere_interface::ExternalProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, info, warn};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

/// Refuse downloads larger than this.
const MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    quality: String,
    duration_sec: f64,
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default, alias = "video_url", alias = "asset_url")]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Video generation provider over a REST API.
///
/// Transient HTTP failures (408, 429, 5xx, network errors) are retried inside
/// each call with jittered exponential backoff, paced by the first error's
/// [`RetryableError::retry_strategy_params`]. "Not found" is returned to the
/// caller untouched: whether it is indexing lag or a lost task is the
/// orchestrator's decision.
pub struct HttpVideoProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry_backoff_ms: Option<u64>,
    max_retries: Option<usize>,
}

impl std::fmt::Debug for HttpVideoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVideoProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpVideoProvider {
    /// Create a provider.
    ///
    /// # Errors
    ///
    /// Returns `ClientCreation` if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::new(ProviderErrorKind::ClientCreation(e.to_string())))?;

        Ok(Self {
            name: name.into(),
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            retry_backoff_ms: None,
            max_retries: None,
        })
    }

    /// Override the per-error retry count and first delay.
    ///
    /// The delay cap still comes from the error kind.
    pub fn with_retry(mut self, max_retries: usize, initial_backoff_ms: u64) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_backoff_ms = Some(initial_backoff_ms.max(2));
        self
    }

    /// `(initial_backoff_ms, max_retries, max_delay_secs)` for retrying after `error`.
    fn retry_plan(&self, error: &ProviderError) -> (u64, usize, u64) {
        let (backoff_ms, retries, max_delay_secs) = error.retry_strategy_params();
        (
            self.retry_backoff_ms.unwrap_or(backoff_ms),
            self.max_retries.unwrap_or(retries),
            max_delay_secs,
        )
    }

    /// Whether an API key is present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn tasks_url(&self) -> String {
        format!("{}/video/generations", self.base_url)
    }

    fn task_url(&self, task_id: &ProviderTaskId) -> String {
        format!("{}/video/generations/{}", self.base_url, task_id)
    }

    /// Errors worth repeating within a single call.
    ///
    /// Not-found and task failures are left to the caller.
    fn retry_in_call(error: &ProviderError) -> bool {
        error.is_retryable()
            && !matches!(
                error.kind,
                ProviderErrorKind::NotFound(_) | ProviderErrorKind::TaskFailed(_)
            )
    }

    fn map_transport_error(error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::new(ProviderErrorKind::Timeout(error.to_string()))
        } else {
            ProviderError::new(ProviderErrorKind::Network(error.to_string()))
        }
    }

    fn parse_api_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if let Ok(ApiErrorResponse {
            error: Some(detail),
        }) = serde_json::from_str::<ApiErrorResponse>(body)
        {
            return ProviderError::from_status(
                status.as_u16(),
                format!(
                    "{} (code: {})",
                    detail.message.unwrap_or_default(),
                    detail.code.unwrap_or_default()
                ),
            );
        }
        let truncated: String = body.chars().take(500).collect();
        ProviderError::from_status(status.as_u16(), truncated)
    }

    fn map_status(response: PollResponse) -> ProviderResult<PollStatus> {
        match response.status.as_str() {
            "queued" | "pending" | "submitted" => Ok(PollStatus::Waiting),
            "processing" | "running" | "in_progress" => Ok(PollStatus::Processing {
                progress: response.progress.map(|p| p as f32),
            }),
            "completed" | "succeeded" => {
                let asset_url = response.download_url.ok_or_else(|| {
                    ProviderError::new(ProviderErrorKind::InvalidResponse(
                        "completed status missing download_url".to_string(),
                    ))
                })?;
                Ok(PollStatus::Succeeded { asset_url })
            }
            "failed" | "error" => Ok(PollStatus::Failed {
                reason: response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            "cancelled" | "canceled" => Err(ProviderError::new(ProviderErrorKind::Cancelled(
                response
                    .error
                    .unwrap_or_else(|| "cancelled by provider".to_string()),
            ))),
            other => {
                warn!(status = other, "Unknown provider task status");
                Ok(PollStatus::Processing {
                    progress: response.progress.map(|p| p as f32),
                })
            }
        }
    }

    /// Run `call` with jittered exponential backoff on transient failures.
    ///
    /// The first failure picks the retry plan for the rest of the call.
    async fn with_backoff<F, Fut, T>(&self, operation: &'static str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let provider = self.name.as_str();
        let first = match call().await {
            Ok(value) => return Ok(value),
            Err(e) if Self::retry_in_call(&e) => e,
            Err(e) => return Err(e),
        };

        let (backoff_ms, retries, max_delay_secs) = self.retry_plan(&first);
        info!(
            provider,
            operation,
            error = %first,
            backoff_ms,
            retries,
            max_delay_secs,
            "Transient provider error, retrying"
        );

        // Delays are 2^n * (backoff / 2): backoff, 2x backoff, 4x backoff...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((backoff_ms / 2).max(1))
            .max_delay(Duration::from_secs(max_delay_secs))
            .map(jitter)
            .take(retries);

        Retry::spawn(strategy, || {
            let attempt = call();
            async move {
                match attempt.await {
                    Ok(value) => Ok(value),
                    Err(e) if Self::retry_in_call(&e) => {
                        warn!(provider, operation, error = %e, "Transient provider error, will retry");
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => Err(RetryError::Permanent(e)),
                }
            }
        })
        .await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(Self::map_transport_error)?;
        if !status.is_success() {
            return Err(Self::parse_api_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::new(ProviderErrorKind::InvalidResponse(format!(
                "failed to parse response: {}",
                e
            )))
        })
    }
}

#[async_trait]
impl ExternalProvider for HttpVideoProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.name, seeded = request.seed_image().is_some()))]
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<ProviderTaskId> {
        let params = request.params();
        let reference_images = request
            .seed_image()
            .iter()
            .map(|bytes| {
                format!(
                    "data:image/png;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(bytes)
                )
            })
            .collect();
        let body = SubmitBody {
            model: &self.model,
            prompt: request.prompt(),
            negative_prompt: params.negative_prompt().as_deref(),
            quality: params.quality().to_string(),
            duration_sec: *params.duration_secs(),
            aspect_ratio: params.aspect_ratio(),
            seed: *params.seed(),
            reference_images,
        };
        let payload = serde_json::to_vec(&body).map_err(|e| {
            ProviderError::new(ProviderErrorKind::MalformedRequest(format!(
                "failed to serialize request: {}",
                e
            )))
        })?;

        let url = self.tasks_url();
        let response: SubmitResponse = self
            .with_backoff("submit", || {
                let request = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .header("Content-Type", "application/json")
                    .body(payload.clone());
                async move {
                    let response = request.send().await.map_err(Self::map_transport_error)?;
                    Self::read_json(response).await
                }
            })
            .await?;

        info!(task_id = %response.id, "Video generation submitted");
        Ok(ProviderTaskId::from(response.id))
    }

    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    async fn poll(&self, task_id: &ProviderTaskId) -> ProviderResult<PollStatus> {
        let url = self.task_url(task_id);
        let response: PollResponse = self
            .with_backoff("poll", || {
                let request = self.client.get(&url).bearer_auth(&self.api_key);
                async move {
                    let response = request.send().await.map_err(Self::map_transport_error)?;
                    Self::read_json(response).await
                }
            })
            .await?;

        debug!(status = %response.status, "Polled task");
        Self::map_status(response)
    }

    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    async fn download(&self, asset_url: &str) -> ProviderResult<Vec<u8>> {
        let url = reqwest::Url::parse(asset_url).map_err(|e| {
            ProviderError::new(ProviderErrorKind::InvalidResponse(format!(
                "invalid download URL '{}': {}",
                asset_url, e
            )))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::new(ProviderErrorKind::InvalidResponse(format!(
                "unsupported download scheme '{}'",
                url.scheme()
            ))));
        }

        let mut response = self
            .with_backoff("download", || {
                let request = self.client.get(url.clone());
                async move {
                    let response = request.send().await.map_err(Self::map_transport_error)?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Self::parse_api_error(status, &body));
                    }
                    Ok(response)
                }
            })
            .await?;

        if let Some(length) = response
            .content_length()
            .filter(|length| *length > MAX_DOWNLOAD_BYTES)
        {
            return Err(ProviderError::new(ProviderErrorKind::InvalidResponse(format!(
                "asset too large ({} bytes > {} bytes)",
                length, MAX_DOWNLOAD_BYTES
            ))));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(Self::map_transport_error)? {
            if bytes.len() as u64 + chunk.len() as u64 > MAX_DOWNLOAD_BYTES {
                return Err(ProviderError::new(ProviderErrorKind::InvalidResponse(format!(
                    "asset exceeded {} bytes",
                    MAX_DOWNLOAD_BYTES
                ))));
            }
            bytes.extend_from_slice(&chunk);
        }

        info!(bytes = bytes.len(), "Downloaded asset");
        Ok(bytes)
    }

    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    async fn cancel(&self, task_id: &ProviderTaskId) -> ProviderResult<()> {
        let url = self.task_url(task_id);
        let result = self
            .with_backoff("cancel", || {
                let request = self.client.delete(&url).bearer_auth(&self.api_key);
                async move {
                    let response = request.send().await.map_err(Self::map_transport_error)?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Self::parse_api_error(status, &body));
                    }
                    Ok(())
                }
            })
            .await;

        match result {
            Ok(()) => {
                info!(task_id = %task_id, "Task cancelled");
                Ok(())
            }
            // Already gone.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
