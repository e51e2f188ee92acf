//! Transport Contract
//!
//! The abstract operation set every backend transport implements: submit,
//! render request, status poll, preview, artifact, cleanup. The network
//! variant ([`http::HttpTransport`]) returns URL references the UI
//! dereferences lazily; the local variant ([`native::NativeTransport`])
//! returns inline binary payloads. The orchestrator is written against this
//! trait only.

pub mod http;
pub mod native;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{ClientError, ClientResult};
use crate::progress::UploadProgressReporter;
use crate::types::{
    JobId, JobStatusKind, JobStatusSnapshot, RenderReceipt, RenderSettings, UploadReceipt,
};

// =============================================================================
// Submission Input
// =============================================================================

/// One in-memory image resource (bytes + name), the network-native input.
#[derive(Clone, Debug)]
pub struct ImageFile {
    /// Filename, used for extension-based kind detection and ordering
    pub name: String,
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// Declared content type, when the picker provides one
    pub content_type: Option<String>,
}

impl ImageFile {
    /// Creates an in-memory image without a declared content type.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            content_type: None,
        }
    }

    /// Sets the declared content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Effective MIME type: declared content type first, then extension.
    pub fn mime_type(&self) -> &'static str {
        if let Some(ct) = self.content_type.as_deref() {
            match ct {
                "image/png" => return "image/png",
                "image/webp" => return "image/webp",
                "image/jpeg" | "image/jpg" => return "image/jpeg",
                _ => {}
            }
        }
        mime_for_extension(&self.name)
    }
}

/// Input to [`Transport::submit`]. Each transport supports its natural kind;
/// the HTTP transport also reads paths from disk.
#[derive(Clone, Debug)]
pub enum SubmitInput {
    /// Raw bytes + names (browser-style selection)
    Files(Vec<ImageFile>),
    /// Local filesystem paths (native picker selection)
    Paths(Vec<PathBuf>),
}

impl SubmitInput {
    /// True when the input contains no resources at all.
    pub fn is_empty(&self) -> bool {
        match self {
            SubmitInput::Files(files) => files.is_empty(),
            SubmitInput::Paths(paths) => paths.is_empty(),
        }
    }
}

/// Supported image kinds, filtered by declared content type falling back to
/// extension. Anything else is dropped before submission.
pub fn is_supported_image(name: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        if matches!(ct, "image/png" | "image/jpeg" | "image/jpg" | "image/webp") {
            return true;
        }
    }
    has_supported_extension(name)
}

/// True for `.png`, `.jpg`, `.jpeg`, `.webp` (case-insensitive).
pub fn has_supported_extension(name: &str) -> bool {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "webp")
}

fn mime_for_extension(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

// =============================================================================
// Media References
// =============================================================================

/// A retrieved preview frame or final video: either an address the UI
/// dereferences lazily, or an inline payload for hosts without a shared
/// HTTP server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaRef {
    /// Address of the resource (network transport)
    Url(String),
    /// Inline binary payload (native transport)
    Inline {
        /// MIME type, e.g. `image/png` or `video/mp4`
        media_type: String,
        /// Raw payload bytes
        data: Vec<u8>,
    },
}

impl MediaRef {
    /// Parses a `data:<mime>;base64,<payload>` URI into an inline reference.
    pub fn from_data_uri(uri: &str) -> ClientResult<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| ClientError::Transport(format!("Not a data URI: {uri:.32}")))?;
        let (media_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| ClientError::Transport("Data URI is not base64-encoded".to_string()))?;
        let data = BASE64
            .decode(payload)
            .map_err(|e| ClientError::Transport(format!("Invalid base64 payload: {e}")))?;
        Ok(MediaRef::Inline {
            media_type: media_type.to_string(),
            data,
        })
    }

    /// Renders the reference as something an `<img>`/`<video>` element can
    /// consume: the URL itself, or a data URI for inline payloads.
    pub fn to_display_uri(&self) -> String {
        match self {
            MediaRef::Url(url) => url.clone(),
            MediaRef::Inline { media_type, data } => {
                format!("data:{};base64,{}", media_type, BASE64.encode(data))
            }
        }
    }

    /// The URL, when this is a reference form.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            MediaRef::Url(url) => Some(url),
            MediaRef::Inline { .. } => None,
        }
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Uniform operation set over the rendering backend.
///
/// All operations are asynchronous and side-effect free unless documented;
/// implementations convert their wire failures into
/// [`ClientError::Transport`] with enough context to distinguish an
/// unreachable backend from a backend-returned error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Submits image resources, creating a job backend-side.
    ///
    /// Filters the input to supported image kinds first; fails with
    /// [`ClientError::Validation`] when nothing survives (no job is created).
    /// Transfer progress is reported through `progress`.
    async fn submit(
        &self,
        input: SubmitInput,
        progress: &UploadProgressReporter,
    ) -> ClientResult<UploadReceipt>;

    /// Requests a render for a previously submitted job. Returns immediately
    /// with `pending` or `processing`; never blocks for completion.
    ///
    /// Settings are passed through as-is; the backend is authoritative on
    /// range validation.
    async fn request_render(
        &self,
        job_id: &str,
        settings: RenderSettings,
    ) -> ClientResult<RenderReceipt>;

    /// Idempotent status read. A job unknown to the backend fails with
    /// [`ClientError::Transport`] (callers treat that as terminal).
    async fn poll_status(&self, job_id: &str) -> ClientResult<JobStatusSnapshot>;

    /// Fetches one source frame. `frame_index` must be within
    /// `0..file_count`; the contract accepts any in-range index.
    async fn fetch_preview(&self, job_id: &str, frame_index: usize) -> ClientResult<MediaRef>;

    /// Fetches the final video. Valid only once the job has completed;
    /// rejected otherwise.
    async fn fetch_artifact(&self, job_id: &str) -> ClientResult<MediaRef>;

    /// Best-effort backend-side cleanup. `Ok(false)` means "nothing to
    /// clean", not an error.
    async fn cleanup(&self, job_id: &str) -> ClientResult<bool>;
}

// =============================================================================
// Mock Transport for Testing
// =============================================================================

/// Scriptable in-memory transport for orchestrator tests and UI development.
pub struct MockTransport {
    /// Scripted poll results, served front to back; the last one repeats.
    statuses: Mutex<VecDeque<JobStatusSnapshot>>,
    /// Active job created by the last submit
    job: Mutex<Option<UploadReceipt>>,
    /// Jobs passed to cleanup
    cleaned: Mutex<Vec<JobId>>,
    /// Forced submit failure message
    submit_error: Option<String>,
    /// Forced render-request failure message
    render_error: Option<String>,
    /// Artificial latency before each poll answers
    poll_delay: Duration,
    /// Set once a `completed` snapshot has been served
    artifact_ready: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a mock with no scripted statuses (polls report `completed`).
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            job: Mutex::new(None),
            cleaned: Mutex::new(Vec::new()),
            submit_error: None,
            render_error: None,
            poll_delay: Duration::ZERO,
            artifact_ready: AtomicBool::new(false),
        }
    }

    /// Scripts the poll results, served in order.
    pub fn with_statuses(self, statuses: Vec<JobStatusSnapshot>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Makes every submit fail with a transport error.
    pub fn with_submit_error(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    /// Makes every render request fail with a transport error.
    pub fn with_render_error(mut self, message: impl Into<String>) -> Self {
        self.render_error = Some(message.into());
        self
    }

    /// Adds latency before each poll answers (stale-result scenarios).
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Job IDs cleanup was invoked for.
    pub fn cleaned_jobs(&self) -> Vec<JobId> {
        self.cleaned.lock().unwrap().clone()
    }

    fn known_job(&self, job_id: &str) -> ClientResult<UploadReceipt> {
        self.job
            .lock()
            .unwrap()
            .as_ref()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .ok_or_else(|| ClientError::Transport(format!("Job not found: {job_id}")))
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(
        &self,
        input: SubmitInput,
        progress: &UploadProgressReporter,
    ) -> ClientResult<UploadReceipt> {
        if let Some(message) = &self.submit_error {
            return Err(ClientError::Transport(message.clone()));
        }

        let filenames: Vec<String> = match input {
            SubmitInput::Files(files) => files
                .iter()
                .filter(|f| is_supported_image(&f.name, f.content_type.as_deref()))
                .map(|f| f.name.clone())
                .collect(),
            SubmitInput::Paths(paths) => paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .filter(|name| has_supported_extension(name))
                .collect(),
        };

        if filenames.is_empty() {
            return Err(ClientError::Validation(
                "No valid image files selected".to_string(),
            ));
        }

        progress.begin();
        let receipt = UploadReceipt {
            job_id: uuid::Uuid::new_v4().to_string(),
            file_count: filenames.len(),
            filenames,
        };
        *self.job.lock().unwrap() = Some(receipt.clone());
        progress.finish();
        Ok(receipt)
    }

    async fn request_render(
        &self,
        job_id: &str,
        _settings: RenderSettings,
    ) -> ClientResult<RenderReceipt> {
        if let Some(message) = &self.render_error {
            return Err(ClientError::Transport(message.clone()));
        }
        let receipt = self.known_job(job_id)?;
        Ok(RenderReceipt {
            job_id: receipt.job_id,
            status: JobStatusKind::Processing,
        })
    }

    async fn poll_status(&self, job_id: &str) -> ClientResult<JobStatusSnapshot> {
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        self.known_job(job_id)?;

        let snapshot = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses
                    .front()
                    .cloned()
                    .unwrap_or_else(|| JobStatusSnapshot::bare(JobStatusKind::Completed))
            }
        };

        if snapshot.status == JobStatusKind::Completed {
            self.artifact_ready.store(true, Ordering::Relaxed);
        }
        Ok(snapshot)
    }

    async fn fetch_preview(&self, job_id: &str, frame_index: usize) -> ClientResult<MediaRef> {
        let receipt = self.known_job(job_id)?;
        let filename = receipt.filenames.get(frame_index).ok_or_else(|| {
            ClientError::Validation(format!(
                "Frame index {frame_index} out of range (0..{})",
                receipt.file_count
            ))
        })?;
        Ok(MediaRef::Inline {
            media_type: mime_for_extension(filename).to_string(),
            data: filename.as_bytes().to_vec(),
        })
    }

    async fn fetch_artifact(&self, job_id: &str) -> ClientResult<MediaRef> {
        self.known_job(job_id)?;
        if !self.artifact_ready.load(Ordering::Relaxed) {
            return Err(ClientError::Validation(
                "Video not yet completed".to_string(),
            ));
        }
        Ok(MediaRef::Inline {
            media_type: "video/mp4".to_string(),
            data: vec![0u8; 16],
        })
    }

    async fn cleanup(&self, job_id: &str) -> ClientResult<bool> {
        self.cleaned.lock().unwrap().push(job_id.to_string());
        let mut job = self.job.lock().unwrap();
        let had_job = job.as_ref().is_some_and(|r| r.job_id == job_id);
        if had_job {
            *job = None;
        }
        Ok(had_job)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_image_filtering() {
        assert!(is_supported_image("frame.png", None));
        assert!(is_supported_image("frame.JPG", None));
        assert!(is_supported_image("frame.jpeg", None));
        assert!(is_supported_image("frame.webp", None));
        assert!(!is_supported_image("notes.txt", None));
        assert!(!is_supported_image("clip.mp4", Some("video/mp4")));
        // Declared content type wins over a missing extension.
        assert!(is_supported_image("frame", Some("image/png")));
    }

    #[test]
    fn test_image_file_mime_type() {
        let png = ImageFile::new("a.png", vec![]);
        assert_eq!(png.mime_type(), "image/png");

        let declared = ImageFile::new("blob", vec![]).with_content_type("image/webp");
        assert_eq!(declared.mime_type(), "image/webp");

        // Unknown extensions default to JPEG, matching the backend.
        let unknown = ImageFile::new("frame.bin", vec![]);
        assert_eq!(unknown.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_media_ref_data_uri_round_trip() {
        let inline = MediaRef::Inline {
            media_type: "image/png".to_string(),
            data: vec![1, 2, 3, 4],
        };
        let uri = inline.to_display_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(MediaRef::from_data_uri(&uri).unwrap(), inline);
    }

    #[test]
    fn test_media_ref_rejects_non_data_uri() {
        assert!(MediaRef::from_data_uri("http://example.com/a.png").is_err());
        assert!(MediaRef::from_data_uri("data:image/png;base64,!!!").is_err());
    }

    #[tokio::test]
    async fn test_mock_submit_filters_and_counts() {
        let transport = MockTransport::new();
        let progress = UploadProgressReporter::discard();

        let receipt = transport
            .submit(
                SubmitInput::Files(vec![
                    ImageFile::new("a.png", vec![0]),
                    ImageFile::new("b.txt", vec![0]),
                    ImageFile::new("c.jpg", vec![0]),
                ]),
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(receipt.file_count, 2);
        assert_eq!(receipt.filenames, vec!["a.png", "c.jpg"]);
        assert_eq!(progress.percent(), 100);
    }

    #[tokio::test]
    async fn test_mock_submit_rejects_empty_selection() {
        let transport = MockTransport::new();
        let progress = UploadProgressReporter::discard();

        let result = transport
            .submit(
                SubmitInput::Files(vec![ImageFile::new("doc.pdf", vec![0])]),
                &progress,
            )
            .await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mock_render_unknown_job() {
        let transport = MockTransport::new();
        let result = transport
            .request_render("no-such-job", RenderSettings::default())
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_mock_artifact_gated_on_completion() {
        let transport = MockTransport::new().with_statuses(vec![
            JobStatusSnapshot::processing(50),
            JobStatusSnapshot::bare(JobStatusKind::Completed),
        ]);
        let progress = UploadProgressReporter::discard();
        let receipt = transport
            .submit(
                SubmitInput::Files(vec![ImageFile::new("a.png", vec![0])]),
                &progress,
            )
            .await
            .unwrap();

        assert!(transport.fetch_artifact(&receipt.job_id).await.is_err());

        transport.poll_status(&receipt.job_id).await.unwrap(); // processing
        transport.poll_status(&receipt.job_id).await.unwrap(); // completed

        assert!(transport.fetch_artifact(&receipt.job_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_preview_returns_indexed_frame() {
        let transport = MockTransport::new();
        let progress = UploadProgressReporter::discard();
        let files: Vec<ImageFile> = (1..=5)
            .map(|i| ImageFile::new(format!("frame_{i}.png"), vec![0]))
            .collect();
        let receipt = transport
            .submit(SubmitInput::Files(files), &progress)
            .await
            .unwrap();

        let preview = transport.fetch_preview(&receipt.job_id, 2).await.unwrap();
        match preview {
            MediaRef::Inline { data, .. } => assert_eq!(data, b"frame_3.png"),
            MediaRef::Url(_) => panic!("mock returns inline payloads"),
        }

        assert!(transport.fetch_preview(&receipt.job_id, 5).await.is_err());
    }
}
