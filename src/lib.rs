//! # Timelapse Client
//!
//! Client-side orchestration for a timelapse rendering backend: submit a
//! sequence of still frames, choose rotation and frame rate, request a
//! render, follow its progress, and retrieve the finished video.
//!
//! The backend is reachable over two interchangeable transports with one
//! contract: [`transport::http::HttpTransport`] speaks multipart/REST
//! against a network server, [`transport::native::NativeTransport`] drives a
//! co-located engine process over a command bridge. The
//! [`orchestrator::JobOrchestrator`] is written against the
//! [`transport::Transport`] trait only and carries the full lifecycle state
//! machine, including the poll loop and stale-result suppression.
//!
//! ```no_run
//! use std::sync::Arc;
//! use timelapse_client::orchestrator::{JobOrchestrator, OrchestratorConfig};
//! use timelapse_client::transport::http::HttpTransport;
//! use timelapse_client::transport::SubmitInput;
//!
//! # async fn run(frames: SubmitInput) -> timelapse_client::ClientResult<()> {
//! let transport = Arc::new(HttpTransport::local()?);
//! let orchestrator = JobOrchestrator::new(transport, OrchestratorConfig::default());
//!
//! orchestrator.submit(frames).await?;
//! orchestrator.set_fps(24);
//! orchestrator.start_render().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod transport;
pub mod types;

pub use error::{ClientError, ClientResult};
pub use orchestrator::{JobOrchestrator, JobPhase, JobState, OrchestratorConfig, OrchestratorEvent};
pub use transport::{MediaRef, SubmitInput, Transport};
pub use types::{JobStatusKind, JobStatusSnapshot, RenderSettings, Rotation};
