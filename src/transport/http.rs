//! HTTP Transport
//!
//! Implements the transport contract over the backend's REST endpoints:
//! multipart upload with transfer progress, render request, status poll, and
//! URL references for preview frames and the final video (dereferenced
//! lazily by the UI, with a cache-busting query on the artifact).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::progress::UploadProgressReporter;
use crate::transport::{
    has_supported_extension, is_supported_image, ImageFile, MediaRef, SubmitInput, Transport,
};
use crate::types::{JobStatusKind, JobStatusSnapshot, RenderReceipt, RenderSettings, UploadReceipt};

/// Default backend address for local development
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Time allowed to establish a connection. There is deliberately no overall
/// request timeout: large uploads take as long as they take.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Multipart field name the backend reads files from
const UPLOAD_FIELD: &str = "files";

/// Upload body chunk size; each yielded chunk produces a progress event.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRenderRequest {
    job_id: String,
    rotation: u32,
    fps: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// HttpTransport
// =============================================================================

/// REST transport against a remote rendering backend.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport against `base_url` (no trailing slash required).
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a transport against the default local backend address.
    pub fn local() -> ClientResult<Self> {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upload_url(&self) -> String {
        format!("{}/api/upload", self.base_url)
    }

    fn render_url(&self) -> String {
        format!("{}/api/create-timelapse", self.base_url)
    }

    fn status_url(&self, job_id: &str) -> String {
        format!("{}/api/job-status/{}", self.base_url, job_id)
    }

    fn preview_url(&self, job_id: &str, frame_index: usize) -> String {
        format!("{}/api/preview/{}/{}", self.base_url, job_id, frame_index)
    }

    /// Artifact URL with a cache-busting query so a re-rendered job is never
    /// served from a stale browser cache.
    fn download_url(&self, job_id: &str, cache_buster: i64) -> String {
        format!("{}/api/download/{}?t={}", self.base_url, job_id, cache_buster)
    }

    /// Maps a reqwest failure, distinguishing an unreachable backend from a
    /// request that reached it and failed.
    fn request_error(&self, operation: &str, err: reqwest::Error) -> ClientError {
        if err.is_connect() || err.is_timeout() {
            ClientError::Transport(format!(
                "Cannot connect to backend at {} ({operation}): {err}",
                self.base_url
            ))
        } else {
            ClientError::Transport(format!("{operation} request failed: {err}"))
        }
    }

    /// Parses an HTTP error body, preferring the backend's structured
    /// `error`/`message` field over raw text.
    fn parse_api_error(status: StatusCode, body: &str) -> ClientError {
        if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
            if let Some(detail) = parsed.error.or(parsed.message) {
                return ClientError::Transport(format!(
                    "Backend returned an error ({status}): {detail}"
                ));
            }
        }
        let truncated: String = body.chars().take(500).collect();
        ClientError::Transport(format!("Backend returned an error ({status}): {truncated}"))
    }

    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> ClientResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read {operation} response: {e}")))?;

        if !status.is_success() {
            return Err(Self::parse_api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            let truncated: String = body.chars().take(500).collect();
            ClientError::Transport(format!(
                "Invalid {operation} response from backend: {e} (body: {truncated})"
            ))
        })
    }

    /// Normalizes submit input into filtered in-memory files, reading paths
    /// from disk. Unreadable paths are skipped, matching the backend's
    /// per-file tolerance.
    async fn collect_files(input: SubmitInput) -> ClientResult<Vec<ImageFile>> {
        let files = match input {
            SubmitInput::Files(files) => files
                .into_iter()
                .filter(|f| is_supported_image(&f.name, f.content_type.as_deref()))
                .collect(),
            SubmitInput::Paths(paths) => {
                let mut files = Vec::with_capacity(paths.len());
                for path in paths {
                    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string())
                    else {
                        continue;
                    };
                    if !has_supported_extension(&name) {
                        continue;
                    }
                    match tokio::fs::read(&path).await {
                        Ok(bytes) => files.push(ImageFile::new(name, bytes)),
                        Err(e) => {
                            warn!("Skipping unreadable file {}: {e}", path.display());
                        }
                    }
                }
                files
            }
        };

        if files.is_empty() {
            return Err(ClientError::Validation(
                "No valid image files selected".to_string(),
            ));
        }
        Ok(files)
    }
}

/// Chunks one file body into a stream that records cumulative bytes sent and
/// forwards the resulting percentage to the reporter as each chunk is
/// handed to the connection.
fn progress_chunks(
    bytes: Vec<u8>,
    sent: Arc<AtomicU64>,
    total: u64,
    reporter: UploadProgressReporter,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let data = Bytes::from(bytes);
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_BYTES).min(data.len())))
        .collect();

    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        let cumulative = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        reporter.transfer(cumulative, total);
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

fn progress_body(
    bytes: Vec<u8>,
    sent: Arc<AtomicU64>,
    total: u64,
    reporter: UploadProgressReporter,
) -> Body {
    Body::wrap_stream(progress_chunks(bytes, sent, total, reporter))
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(
        &self,
        input: SubmitInput,
        progress: &UploadProgressReporter,
    ) -> ClientResult<UploadReceipt> {
        let files = Self::collect_files(input).await?;
        let total_bytes: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
        let sent = Arc::new(AtomicU64::new(0));

        let mut form = Form::new();
        for file in files {
            let mime = file.mime_type();
            let length = file.bytes.len() as u64;
            let body = progress_body(file.bytes, sent.clone(), total_bytes, progress.clone());
            let part = Part::stream_with_length(body, length)
                .file_name(file.name)
                .mime_str(mime)
                .map_err(|e| ClientError::Transport(format!("Invalid upload part: {e}")))?;
            form = form.part(UPLOAD_FIELD, part);
        }

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error("upload", e))?;

        let receipt: UploadReceipt = Self::parse_json_response("upload", response).await?;
        progress.finish();

        info!(
            job_id = %receipt.job_id,
            file_count = receipt.file_count,
            "Upload accepted by backend"
        );
        Ok(receipt)
    }

    async fn request_render(
        &self,
        job_id: &str,
        settings: RenderSettings,
    ) -> ClientResult<RenderReceipt> {
        let request = CreateRenderRequest {
            job_id: job_id.to_string(),
            rotation: settings.rotation.degrees(),
            fps: settings.fps,
        };

        let response = self
            .client
            .post(self.render_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error("render", e))?;

        let receipt: RenderReceipt = Self::parse_json_response("render", response).await?;
        info!(job_id = %receipt.job_id, status = ?receipt.status, "Render requested");
        Ok(receipt)
    }

    async fn poll_status(&self, job_id: &str) -> ClientResult<JobStatusSnapshot> {
        let response = self
            .client
            .get(self.status_url(job_id))
            .send()
            .await
            .map_err(|e| self.request_error("status", e))?;

        let snapshot: JobStatusSnapshot = Self::parse_json_response("status", response).await?;
        debug!(job_id, status = ?snapshot.status, progress = ?snapshot.progress, "Polled job status");
        Ok(snapshot)
    }

    async fn fetch_preview(&self, job_id: &str, frame_index: usize) -> ClientResult<MediaRef> {
        // Reference form: the UI dereferences the URL lazily via an image
        // element, so no request is issued here.
        Ok(MediaRef::Url(self.preview_url(job_id, frame_index)))
    }

    async fn fetch_artifact(&self, job_id: &str) -> ClientResult<MediaRef> {
        let snapshot = self.poll_status(job_id).await?;
        if snapshot.status != JobStatusKind::Completed {
            return Err(ClientError::Validation(format!(
                "Video for job {job_id} is not yet completed"
            )));
        }

        let cache_buster = chrono::Utc::now().timestamp_millis();
        Ok(MediaRef::Url(self.download_url(job_id, cache_buster)))
    }

    async fn cleanup(&self, job_id: &str) -> ClientResult<bool> {
        // The network backend owns its storage lifecycle and exposes no
        // cleanup endpoint; nothing to clean client-side.
        debug!(job_id, "Cleanup is a no-op over HTTP");
        Ok(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
