//! Timelapse Client Type Definitions
//!
//! Job data model shared by the transports and the orchestrator.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Job unique identifier (opaque, backend-assigned)
pub type JobId = String;

// =============================================================================
// Render Settings
// =============================================================================

/// Default frame rate applied when the user input is invalid
pub const DEFAULT_FPS: u32 = 30;

/// Inclusive frame rate bounds accepted by the backend
pub const MIN_FPS: u32 = 1;
/// Inclusive frame rate bounds accepted by the backend
pub const MAX_FPS: u32 = 60;

/// Frame rotation applied during encoding.
///
/// Only the four right angles exist; any other value is a caller bug,
/// not a runtime input to validate against the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Half,
    CounterClockwise90,
}

impl Rotation {
    /// Rotation angle in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Half => 180,
            Rotation::CounterClockwise90 => 270,
        }
    }

    /// Parses a right-angle degree value. Returns `None` for anything else.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Half),
            270 => Some(Rotation::CounterClockwise90),
            _ => None,
        }
    }

    /// Next rotation step clockwise (UI rotate button).
    pub fn rotated_clockwise(self) -> Self {
        match self {
            Rotation::None => Rotation::Clockwise90,
            Rotation::Clockwise90 => Rotation::Half,
            Rotation::Half => Rotation::CounterClockwise90,
            Rotation::CounterClockwise90 => Rotation::None,
        }
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> u32 {
        rotation.degrees()
    }
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        Rotation::from_degrees(degrees)
            .ok_or_else(|| format!("Invalid rotation: {degrees}. Must be 0, 90, 180, or 270"))
    }
}

/// Clamps a raw frame rate into the accepted range.
///
/// Out-of-range input (including 0) falls back to [`DEFAULT_FPS`]; this is a
/// best-effort UI-side guard, the backend remains authoritative.
pub fn sanitize_fps(fps: u32) -> u32 {
    if (MIN_FPS..=MAX_FPS).contains(&fps) {
        fps
    } else {
        DEFAULT_FPS
    }
}

/// Per-job encoding settings chosen by the user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    /// Frame rotation
    pub rotation: Rotation,
    /// Output frame rate (1-60)
    pub fps: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            rotation: Rotation::None,
            fps: DEFAULT_FPS,
        }
    }
}

impl RenderSettings {
    /// Creates settings with a sanitized frame rate.
    pub fn new(rotation: Rotation, fps: u32) -> Self {
        Self {
            rotation,
            fps: sanitize_fps(fps),
        }
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Backend-reported job status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatusKind {
    /// Waiting to start processing
    #[default]
    Pending,
    /// Render in progress
    Processing,
    /// Artifact is ready for retrieval
    Completed,
    /// Render failed server-side
    Failed,
}

impl JobStatusKind {
    /// Terminal statuses end polling.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatusKind::Completed | JobStatusKind::Failed)
    }
}

/// Optional substep reported while processing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStage {
    Preparing,
    Encoding,
    Finalizing,
    Complete,
}

/// One status poll result.
///
/// The schema is explicitly partial: everything except `status` may be
/// absent and defaults instead of failing deserialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    /// Current status
    pub status: JobStatusKind,
    /// Render progress 0-100, monotonically non-decreasing while processing
    #[serde(default)]
    pub progress: Option<u8>,
    /// Current substage
    #[serde(default)]
    pub stage: Option<RenderStage>,
    /// Frame currently being encoded (<= total_frames)
    #[serde(default)]
    pub current_frame: Option<u64>,
    /// Total frame count
    #[serde(default)]
    pub total_frames: Option<u64>,
    /// Failure description, present only when status is `failed`
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusSnapshot {
    /// Snapshot carrying only a status.
    pub fn bare(status: JobStatusKind) -> Self {
        Self {
            status,
            progress: None,
            stage: None,
            current_frame: None,
            total_frames: None,
            error: None,
        }
    }

    /// Processing snapshot with a progress percentage.
    pub fn processing(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            stage: Some(RenderStage::Encoding),
            ..Self::bare(JobStatusKind::Processing)
        }
    }

    /// Failed snapshot carrying an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::bare(JobStatusKind::Failed)
        }
    }
}

// =============================================================================
// Operation Receipts
// =============================================================================

/// Successful submission receipt. A job exists client-side only after one
/// of these is returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Backend-assigned job ID
    pub job_id: JobId,
    /// Number of accepted frames, fixed at submission
    pub file_count: usize,
    /// Accepted filenames, ordered; length == file_count
    pub filenames: Vec<String>,
}

/// Render request acknowledgement. Returned immediately; never blocks for
/// completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReceipt {
    /// Job the render was requested for
    pub job_id: JobId,
    /// `pending` or `processing`
    pub status: JobStatusKind,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_degrees_round_trip() {
        for degrees in [0, 90, 180, 270] {
            let rotation = Rotation::from_degrees(degrees).unwrap();
            assert_eq!(rotation.degrees(), degrees);
        }
        assert!(Rotation::from_degrees(45).is_none());
        assert!(Rotation::from_degrees(360).is_none());
    }

    #[test]
    fn test_rotation_serde_as_integer() {
        let json = serde_json::to_string(&Rotation::Clockwise90).unwrap();
        assert_eq!(json, "90");

        let parsed: Rotation = serde_json::from_str("270").unwrap();
        assert_eq!(parsed, Rotation::CounterClockwise90);

        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }

    #[test]
    fn test_rotation_clockwise_cycle() {
        let mut rotation = Rotation::None;
        for _ in 0..4 {
            rotation = rotation.rotated_clockwise();
        }
        assert_eq!(rotation, Rotation::None);
    }

    #[test]
    fn test_sanitize_fps() {
        assert_eq!(sanitize_fps(24), 24);
        assert_eq!(sanitize_fps(1), 1);
        assert_eq!(sanitize_fps(60), 60);
        assert_eq!(sanitize_fps(0), DEFAULT_FPS);
        assert_eq!(sanitize_fps(61), DEFAULT_FPS);
    }

    #[test]
    fn test_render_settings_default() {
        let settings = RenderSettings::default();
        assert_eq!(settings.rotation, Rotation::None);
        assert_eq!(settings.fps, 30);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatusKind::Pending.is_terminal());
        assert!(!JobStatusKind::Processing.is_terminal());
        assert!(JobStatusKind::Completed.is_terminal());
        assert!(JobStatusKind::Failed.is_terminal());
    }

    #[test]
    fn test_snapshot_partial_deserialization() {
        // Only the status field is guaranteed; everything else defaults.
        let snap: JobStatusSnapshot = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert_eq!(snap.status, JobStatusKind::Processing);
        assert!(snap.progress.is_none());
        assert!(snap.stage.is_none());

        let full = r#"{"status":"processing","progress":45,"stage":"encoding","currentFrame":45,"totalFrames":100}"#;
        let snap: JobStatusSnapshot = serde_json::from_str(full).unwrap();
        assert_eq!(snap.progress, Some(45));
        assert_eq!(snap.stage, Some(RenderStage::Encoding));
        assert_eq!(snap.current_frame, Some(45));
        assert_eq!(snap.total_frames, Some(100));
    }

    #[test]
    fn test_upload_receipt_wire_format() {
        let json = r#"{"jobId":"job-1","fileCount":2,"filenames":["a.png","b.png"]}"#;
        let receipt: UploadReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.job_id, "job-1");
        assert_eq!(receipt.file_count, receipt.filenames.len());
    }
}
