//! Native Transport
//!
//! Implements the transport contract over a local command bridge to a
//! co-located engine process. With no HTTP server between the two, binary
//! artifacts travel inline as base64 data URIs, and OS dialog interaction
//! (file picker, save dialog) is mediated here rather than by the browser.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::progress::UploadProgressReporter;
use crate::transport::{has_supported_extension, MediaRef, SubmitInput, Transport};
use crate::types::{
    JobStatusKind, JobStatusSnapshot, RenderReceipt, RenderSettings, RenderStage, UploadReceipt,
};

// =============================================================================
// Host Traits
// =============================================================================

/// Named-command invocation against the co-located engine process.
///
/// The host application (whatever owns the engine process) implements this;
/// payloads and results are JSON values with snake_case keys.
#[async_trait]
pub trait EngineBridge: Send + Sync {
    /// Invokes `command` with `args`, returning the engine's JSON result.
    ///
    /// Implementations map process/bridge failures to
    /// [`ClientError::Transport`] and engine-rejected calls to whatever the
    /// engine reported.
    async fn invoke(&self, command: &str, args: serde_json::Value)
        -> ClientResult<serde_json::Value>;
}

/// OS dialog mediation for the native deployment.
#[async_trait]
pub trait DialogHost: Send + Sync {
    /// Opens a multi-select file picker filtered to supported image kinds.
    /// `None` means the user cancelled.
    async fn pick_images(&self) -> ClientResult<Option<Vec<PathBuf>>>;

    /// Opens a save dialog with a suggested filename. `None` means the user
    /// cancelled.
    async fn pick_save_path(&self, default_filename: &str) -> ClientResult<Option<PathBuf>>;
}

// =============================================================================
// Engine Commands
// =============================================================================

const CMD_UPLOAD_IMAGES: &str = "upload_images";
const CMD_CREATE_TIMELAPSE: &str = "create_timelapse";
const CMD_GET_JOB_STATUS: &str = "get_job_status";
const CMD_GET_PREVIEW: &str = "get_preview";
const CMD_GET_VIDEO_DATA: &str = "get_video_data";
const CMD_SAVE_VIDEO: &str = "save_video";
const CMD_CLEANUP_JOB: &str = "cleanup_job";

// =============================================================================
// Wire Types (engine side is snake_case)
// =============================================================================

#[derive(Debug, Deserialize)]
struct NativeUploadDto {
    job_id: String,
    file_count: usize,
    filenames: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NativeRenderDto {
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct NativeStatusDto {
    status: String,
    #[serde(default)]
    progress: Option<u8>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    current_frame: Option<u64>,
    #[serde(default)]
    total_frames: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_status_kind(status: &str) -> JobStatusKind {
    match status {
        "pending" => JobStatusKind::Pending,
        "processing" => JobStatusKind::Processing,
        "completed" => JobStatusKind::Completed,
        "failed" => JobStatusKind::Failed,
        other => {
            warn!("Unknown engine job status: {other}");
            JobStatusKind::Processing
        }
    }
}

fn parse_stage(stage: &str) -> Option<RenderStage> {
    match stage {
        "preparing" => Some(RenderStage::Preparing),
        "encoding" => Some(RenderStage::Encoding),
        "finalizing" => Some(RenderStage::Finalizing),
        "complete" => Some(RenderStage::Complete),
        _ => None,
    }
}

impl From<NativeStatusDto> for JobStatusSnapshot {
    fn from(dto: NativeStatusDto) -> Self {
        Self {
            status: parse_status_kind(&dto.status),
            progress: dto.progress,
            stage: dto.stage.as_deref().and_then(parse_stage),
            current_frame: dto.current_frame,
            total_frames: dto.total_frames,
            error: dto.error,
        }
    }
}

// =============================================================================
// NativeTransport
// =============================================================================

/// Local-bridge transport against a co-located engine process.
pub struct NativeTransport {
    bridge: Arc<dyn EngineBridge>,
    dialogs: Arc<dyn DialogHost>,
}

impl std::fmt::Debug for NativeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTransport").finish_non_exhaustive()
    }
}

impl NativeTransport {
    /// Creates a transport over the given bridge and dialog host.
    pub fn new(bridge: Arc<dyn EngineBridge>, dialogs: Arc<dyn DialogHost>) -> Self {
        Self { bridge, dialogs }
    }

    async fn invoke_parsed<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> ClientResult<T> {
        let value = self.bridge.invoke(command, args).await?;
        serde_json::from_value(value).map_err(|e| {
            ClientError::Transport(format!("Invalid {command} result from engine: {e}"))
        })
    }

    /// Opens the image picker. Returns `None` when the user cancels.
    pub async fn pick_images(&self) -> ClientResult<Option<Vec<PathBuf>>> {
        self.dialogs.pick_images().await
    }

    /// Saves the finished video wherever the user chooses.
    ///
    /// Returns `Ok(false)` when the user cancels the save dialog.
    pub async fn save_artifact(&self, job_id: &str) -> ClientResult<bool> {
        let default_filename = format!("timelapse_{job_id}.mp4");
        let Some(save_path) = self.dialogs.pick_save_path(&default_filename).await? else {
            debug!(job_id, "Save dialog cancelled");
            return Ok(false);
        };

        let saved: bool = self
            .invoke_parsed(
                CMD_SAVE_VIDEO,
                json!({
                    "job_id": job_id,
                    "save_path": save_path.to_string_lossy(),
                }),
            )
            .await?;

        if saved {
            info!(job_id, path = %save_path.display(), "Saved video");
        }
        Ok(saved)
    }
}

#[async_trait]
impl Transport for NativeTransport {
    fn name(&self) -> &str {
        "native"
    }

    async fn submit(
        &self,
        input: SubmitInput,
        progress: &UploadProgressReporter,
    ) -> ClientResult<UploadReceipt> {
        let paths = match input {
            SubmitInput::Paths(paths) => paths,
            SubmitInput::Files(_) => {
                return Err(ClientError::Validation(
                    "Native transport submits file paths; use pick_images() to select them"
                        .to_string(),
                ));
            }
        };

        let paths: Vec<String> = paths
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| has_supported_extension(&n.to_string_lossy()))
                    .unwrap_or(false)
            })
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        if paths.is_empty() {
            return Err(ClientError::Validation(
                "No valid image files selected".to_string(),
            ));
        }

        // The bridge call is atomic; emit the synthetic two-point sequence
        // so the UI shows "busy" instead of a stall.
        progress.begin();
        let dto: NativeUploadDto = self
            .invoke_parsed(CMD_UPLOAD_IMAGES, json!({ "paths": paths }))
            .await?;
        progress.finish();

        info!(job_id = %dto.job_id, file_count = dto.file_count, "Images registered with engine");
        Ok(UploadReceipt {
            job_id: dto.job_id,
            file_count: dto.file_count,
            filenames: dto.filenames,
        })
    }

    async fn request_render(
        &self,
        job_id: &str,
        settings: RenderSettings,
    ) -> ClientResult<RenderReceipt> {
        let dto: NativeRenderDto = self
            .invoke_parsed(
                CMD_CREATE_TIMELAPSE,
                json!({
                    "job_id": job_id,
                    "rotation": settings.rotation.degrees(),
                    "fps": settings.fps,
                }),
            )
            .await?;

        info!(job_id = %dto.job_id, status = %dto.status, "Render requested");
        Ok(RenderReceipt {
            job_id: dto.job_id,
            status: parse_status_kind(&dto.status),
        })
    }

    async fn poll_status(&self, job_id: &str) -> ClientResult<JobStatusSnapshot> {
        let dto: NativeStatusDto = self
            .invoke_parsed(CMD_GET_JOB_STATUS, json!({ "job_id": job_id }))
            .await?;
        let snapshot = JobStatusSnapshot::from(dto);
        debug!(job_id, status = ?snapshot.status, progress = ?snapshot.progress, "Polled job status");
        Ok(snapshot)
    }

    async fn fetch_preview(&self, job_id: &str, frame_index: usize) -> ClientResult<MediaRef> {
        let data_uri: String = self
            .invoke_parsed(
                CMD_GET_PREVIEW,
                json!({ "job_id": job_id, "index": frame_index }),
            )
            .await?;
        MediaRef::from_data_uri(&data_uri)
    }

    async fn fetch_artifact(&self, job_id: &str) -> ClientResult<MediaRef> {
        // The engine rejects this until the render has completed.
        let data_uri: String = self
            .invoke_parsed(CMD_GET_VIDEO_DATA, json!({ "job_id": job_id }))
            .await?;
        MediaRef::from_data_uri(&data_uri)
    }

    async fn cleanup(&self, job_id: &str) -> ClientResult<bool> {
        self.invoke_parsed(CMD_CLEANUP_JOB, json!({ "job_id": job_id }))
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================
