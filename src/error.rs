//! Timelapse Client Error Definitions
//!
//! Defines error types used throughout the crate.

use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    // =========================================================================
    // Caller-correctable Errors
    // =========================================================================
    /// Input was rejected before any request was issued (e.g. no supported
    /// images in a selection). No job exists after this error.
    #[error("Validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Connectivity/process failure or a malformed response. The message
    /// distinguishes "backend unreachable" from "backend returned an error".
    #[error("Transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// The backend reported a server-side render failure. Carried in the
    /// terminal `Failed` state's error field.
    #[error("Render failed: {0}")]
    Backend(String),

    /// A response arrived after its job scope was cancelled or superseded.
    /// Never surfaced to the UI; the orchestrator drops these silently.
    #[error("Stale result for superseded job: {0}")]
    Stale(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Returns true when the error must not be applied to user-visible state.
    pub fn is_stale(&self) -> bool {
        matches!(self, ClientError::Stale(_))
    }
}
