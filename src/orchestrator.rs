//! Job Lifecycle Orchestration
//!
//! Drives one timelapse job through its phases (upload, settings, render,
//! completion) against an injected [`Transport`]. Owns the 2-second status
//! poll loop and guarantees that results belonging to a superseded job can
//! never leak into current state: every backend response is checked against
//! an epoch counter that advances on reset or resubmission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::progress::UploadProgressReporter;
use crate::transport::{MediaRef, SubmitInput, Transport};
use crate::types::{
    sanitize_fps, JobId, JobStatusKind, JobStatusSnapshot, RenderSettings, RenderStage,
    Rotation, UploadReceipt,
};

// =============================================================================
// Configuration
// =============================================================================

/// Interval between status polls while a render is in flight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Orchestrator tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    /// Status poll cadence. Polling continues until the backend reports a
    /// terminal status or the job is cancelled; there is no client-side
    /// give-up cutoff.
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl OrchestratorConfig {
    /// Sets the poll cadence (tests use a few milliseconds).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// =============================================================================
// State Model
// =============================================================================

/// Client-side lifecycle phase of the single live job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    /// No job; awaiting a selection
    #[default]
    Idle,
    /// Submission in flight
    Uploading,
    /// Frames accepted; settings adjustable, render can start
    Uploaded,
    /// Render requested; poll loop active
    Rendering,
    /// Artifact ready for retrieval
    Completed,
    /// Upload or render failed; settings retained for retry
    Failed,
}

/// Identity of the live job, fixed at submission.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: JobId,
    pub file_count: usize,
    pub filenames: Vec<String>,
}

/// Observable orchestrator state, cloned out as a consistent snapshot.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub phase: JobPhase,
    /// Present in every phase except `Idle` and `Uploading`
    pub job: Option<JobInfo>,
    pub settings: RenderSettings,
    /// Upload transfer percent, 0-100
    pub upload_percent: u8,
    /// Render percent, 0-100, monotonically non-decreasing within a render
    pub progress: u8,
    pub stage: Option<RenderStage>,
    pub current_frame: Option<u64>,
    pub total_frames: Option<u64>,
    /// Last failure description, cleared when a new attempt starts
    pub error: Option<String>,
}

// =============================================================================
// Events
// =============================================================================

/// Push notifications emitted as state changes; the UI can subscribe instead
/// of polling [`JobOrchestrator::state`].
#[derive(Clone, Debug)]
pub enum OrchestratorEvent {
    /// The lifecycle phase changed
    PhaseChanged(JobPhase),
    /// Upload transfer percent advanced
    UploadProgress(u8),
    /// A render status poll produced fresh progress
    RenderProgress {
        progress: u8,
        stage: Option<RenderStage>,
        current_frame: Option<u64>,
        total_frames: Option<u64>,
    },
    /// The render finished and the artifact is retrievable
    Completed,
    /// The upload or render failed
    Failed(String),
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Single-job lifecycle orchestrator.
///
/// Concurrency model: at most one poll loop exists at a time. `reset` and
/// resubmission advance the epoch counter and abort the loop; any response
/// that resolves afterwards observes the mismatch and is dropped without
/// touching state.
pub struct JobOrchestrator {
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    state: Arc<Mutex<JobState>>,
    /// Advances whenever the current job scope is cancelled or superseded
    epoch: Arc<AtomicU64>,
    poller: Mutex<Option<JoinHandle<()>>>,
    event_tx: mpsc::UnboundedSender<OrchestratorEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<OrchestratorEvent>>>,
}

impl JobOrchestrator {
    /// Creates an orchestrator over the given transport.
    pub fn new(transport: Arc<dyn Transport>, config: OrchestratorConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(JobState::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            poller: Mutex::new(None),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Takes the event receiver (can only be called once).
    pub fn take_event_receiver(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<OrchestratorEvent>> {
        self.event_rx.lock().unwrap().take()
    }

    /// Consistent snapshot of the current state.
    pub fn state(&self) -> JobState {
        self.state.lock().unwrap().clone()
    }

    fn emit(&self, event: OrchestratorEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    fn abort_poller(&self) {
        if let Some(handle) = self.poller.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn epoch_now(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Invalidates the current job scope. Late responses carrying the old
    /// epoch are dropped on arrival.
    fn advance_epoch(&self) -> u64 {
        self.abort_poller();
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn cleanup_best_effort(&self, job_id: &str) {
        if let Err(e) = self.transport.cleanup(job_id).await {
            warn!(job_id, "Backend cleanup failed (ignored): {e}");
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submits an image selection, creating a fresh job.
    ///
    /// Rejected while an upload or render is in flight. When a previous job
    /// exists in a settled phase, it is superseded: its poll scope is
    /// invalidated and its backend resources are cleaned up best-effort
    /// before the new submission starts.
    pub async fn submit(&self, input: SubmitInput) -> ClientResult<UploadReceipt> {
        if input.is_empty() {
            return Err(ClientError::Validation(
                "No valid image files selected".to_string(),
            ));
        }

        let superseded = {
            let mut state = self.state.lock().unwrap();
            match state.phase {
                JobPhase::Uploading => {
                    return Err(ClientError::Validation(
                        "An upload is already in progress".to_string(),
                    ));
                }
                JobPhase::Rendering => {
                    return Err(ClientError::Validation(
                        "A render is already in progress".to_string(),
                    ));
                }
                _ => {}
            }
            let superseded = state.job.take().map(|j| j.job_id);
            let settings = state.settings;
            *state = JobState {
                phase: JobPhase::Uploading,
                settings,
                ..JobState::default()
            };
            superseded
        };
        let epoch = self.advance_epoch();
        self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Uploading));

        if let Some(old_job) = superseded {
            info!(job_id = %old_job, "Superseding previous job");
            self.cleanup_best_effort(&old_job).await;
        }

        let progress = {
            let state = self.state.clone();
            let event_tx = self.event_tx.clone();
            let epoch_counter = self.epoch.clone();
            UploadProgressReporter::new(move |percent| {
                if epoch_counter.load(Ordering::SeqCst) != epoch {
                    return;
                }
                state.lock().unwrap().upload_percent = percent;
                let _ = event_tx.send(OrchestratorEvent::UploadProgress(percent));
            })
        };

        let result = self.transport.submit(input, &progress).await;

        if self.epoch_now() != epoch {
            // Reset raced the upload. State is already Idle; if the backend
            // did create a job, remove the orphan.
            if let Ok(receipt) = &result {
                self.cleanup_best_effort(&receipt.job_id).await;
            }
            return Err(ClientError::Stale(
                result.map(|r| r.job_id).unwrap_or_default(),
            ));
        }

        match result {
            Ok(receipt) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.phase = JobPhase::Uploaded;
                    state.upload_percent = 100;
                    state.job = Some(JobInfo {
                        job_id: receipt.job_id.clone(),
                        file_count: receipt.file_count,
                        filenames: receipt.filenames.clone(),
                    });
                }
                info!(job_id = %receipt.job_id, file_count = receipt.file_count, "Upload complete");
                self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Uploaded));
                Ok(receipt)
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut state = self.state.lock().unwrap();
                    state.phase = JobPhase::Idle;
                    state.upload_percent = 0;
                    state.error = Some(message.clone());
                }
                self.emit(OrchestratorEvent::Failed(message));
                self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Idle));
                Err(e)
            }
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Sets the frame rotation.
    pub fn set_rotation(&self, rotation: Rotation) {
        self.state.lock().unwrap().settings.rotation = rotation;
    }

    /// Advances the rotation one step clockwise (UI rotate button).
    pub fn rotate_clockwise(&self) -> Rotation {
        let mut state = self.state.lock().unwrap();
        let next = state.settings.rotation.rotated_clockwise();
        state.settings.rotation = next;
        next
    }

    /// Sets the frame rate; out-of-range values fall back to the default.
    pub fn set_fps(&self, fps: u32) {
        self.state.lock().unwrap().settings.fps = sanitize_fps(fps);
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Requests a render with the current settings and starts the poll loop.
    ///
    /// Accepted from `Uploaded` and, as a retry, from `Failed` when the job
    /// survives. The request failing leaves the job in `Uploaded` with the
    /// error recorded, so the user can retry.
    pub async fn start_render(&self) -> ClientResult<()> {
        let (job_id, settings) = {
            let mut state = self.state.lock().unwrap();
            let job_id = match (state.phase, &state.job) {
                (JobPhase::Uploaded | JobPhase::Failed, Some(job)) => job.job_id.clone(),
                _ => {
                    return Err(ClientError::Validation(
                        "No uploaded job to render".to_string(),
                    ));
                }
            };
            state.phase = JobPhase::Rendering;
            state.progress = 0;
            state.stage = None;
            state.current_frame = None;
            state.total_frames = None;
            state.error = None;
            (job_id, state.settings)
        };
        let epoch = self.epoch_now();
        self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Rendering));
        info!(%job_id, fps = settings.fps, rotation = settings.rotation.degrees(), "Starting render");

        match self.transport.request_render(&job_id, settings).await {
            Ok(_) if self.epoch_now() == epoch => {}
            Ok(_) => return Err(ClientError::Stale(job_id)),
            Err(e) => {
                if self.epoch_now() != epoch {
                    return Err(ClientError::Stale(job_id));
                }
                let message = e.to_string();
                {
                    let mut state = self.state.lock().unwrap();
                    state.phase = JobPhase::Uploaded;
                    state.error = Some(message.clone());
                }
                self.emit(OrchestratorEvent::Failed(message));
                self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Uploaded));
                return Err(e);
            }
        }

        self.spawn_poller(job_id, epoch);
        Ok(())
    }

    fn spawn_poller(&self, job_id: JobId, epoch: u64) {
        let transport = self.transport.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        let epoch_counter = self.epoch.clone();
        let poll_interval = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            // First tick fires immediately; ticks never overlap because the
            // loop awaits each poll before the next tick.
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if epoch_counter.load(Ordering::SeqCst) != epoch {
                    return;
                }

                let result = transport.poll_status(&job_id).await;

                // The job may have been cancelled while the poll was in
                // flight; a stale answer must not touch state.
                if epoch_counter.load(Ordering::SeqCst) != epoch {
                    debug!(%job_id, "Dropping stale poll result");
                    return;
                }

                match result {
                    Ok(snapshot) => {
                        if apply_snapshot(&state, &event_tx, snapshot) {
                            return;
                        }
                    }
                    Err(e) => {
                        let message = e.to_string();
                        warn!(%job_id, "Status poll failed: {message}");
                        {
                            let mut state = state.lock().unwrap();
                            state.phase = JobPhase::Failed;
                            state.error = Some(message.clone());
                        }
                        let _ = event_tx.send(OrchestratorEvent::Failed(message));
                        let _ = event_tx.send(OrchestratorEvent::PhaseChanged(JobPhase::Failed));
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self.poller.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Returns from `Completed` to `Uploaded` so settings can change and the
    /// render can run again on the same frames.
    pub fn adjust(&self) -> ClientResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.phase != JobPhase::Completed {
                return Err(ClientError::Validation(
                    "No completed render to adjust".to_string(),
                ));
            }
            state.phase = JobPhase::Uploaded;
            state.progress = 0;
            state.stage = None;
            state.current_frame = None;
            state.total_frames = None;
            state.error = None;
        }
        self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Uploaded));
        Ok(())
    }

    /// Discards the current job from any phase and returns to `Idle`.
    ///
    /// The poll scope is invalidated first, so in-flight responses are
    /// dropped; backend cleanup is best-effort and a failure leaves the
    /// client reset regardless.
    pub async fn reset(&self) {
        // Invalidate the scope before touching state so an in-flight poll
        // cannot land in between.
        self.advance_epoch();
        let old_job = {
            let mut state = self.state.lock().unwrap();
            let old_job = state.job.take().map(|j| j.job_id);
            *state = JobState::default();
            old_job
        };
        self.emit(OrchestratorEvent::PhaseChanged(JobPhase::Idle));

        if let Some(job_id) = old_job {
            info!(job_id = %job_id, "Job discarded");
            self.cleanup_best_effort(&job_id).await;
        }
    }

    // =========================================================================
    // Media
    // =========================================================================

    /// Fetches the representative middle frame of the uploaded sequence.
    pub async fn fetch_preview(&self) -> ClientResult<MediaRef> {
        let middle = {
            let state = self.state.lock().unwrap();
            let job = state
                .job
                .as_ref()
                .ok_or_else(|| ClientError::Validation("No uploaded job".to_string()))?;
            job.file_count / 2
        };
        self.fetch_preview_at(middle).await
    }

    /// Fetches the frame at `index`, bounds-checked against the file count.
    pub async fn fetch_preview_at(&self, index: usize) -> ClientResult<MediaRef> {
        let job_id = {
            let state = self.state.lock().unwrap();
            let job = state
                .job
                .as_ref()
                .ok_or_else(|| ClientError::Validation("No uploaded job".to_string()))?;
            if index >= job.file_count {
                return Err(ClientError::Validation(format!(
                    "Frame index {index} out of range (0..{})",
                    job.file_count
                )));
            }
            job.job_id.clone()
        };
        self.transport.fetch_preview(&job_id, index).await
    }

    /// Fetches the finished video. Valid only in `Completed`.
    pub async fn fetch_artifact(&self) -> ClientResult<MediaRef> {
        let job_id = {
            let state = self.state.lock().unwrap();
            if state.phase != JobPhase::Completed {
                return Err(ClientError::Validation(
                    "Video is not ready yet".to_string(),
                ));
            }
            match &state.job {
                Some(job) => job.job_id.clone(),
                None => {
                    return Err(ClientError::Validation("No uploaded job".to_string()));
                }
            }
        };
        self.transport.fetch_artifact(&job_id).await
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }
}

/// Applies one poll snapshot to state, returning true on a terminal status.
fn apply_snapshot(
    state: &Arc<Mutex<JobState>>,
    event_tx: &mpsc::UnboundedSender<OrchestratorEvent>,
    snapshot: JobStatusSnapshot,
) -> bool {
    match snapshot.status {
        JobStatusKind::Pending | JobStatusKind::Processing => {
            let event = {
                let mut state = state.lock().unwrap();
                // Absent fields keep their last value; progress can only grow.
                if let Some(progress) = snapshot.progress {
                    state.progress = state.progress.max(progress.min(100));
                }
                if snapshot.stage.is_some() {
                    state.stage = snapshot.stage;
                }
                if snapshot.current_frame.is_some() {
                    state.current_frame = snapshot.current_frame;
                }
                if snapshot.total_frames.is_some() {
                    state.total_frames = snapshot.total_frames;
                }
                OrchestratorEvent::RenderProgress {
                    progress: state.progress,
                    stage: state.stage,
                    current_frame: state.current_frame,
                    total_frames: state.total_frames,
                }
            };
            let _ = event_tx.send(event);
            false
        }
        JobStatusKind::Completed => {
            {
                let mut state = state.lock().unwrap();
                state.phase = JobPhase::Completed;
                state.progress = 100;
                state.stage = Some(RenderStage::Complete);
                state.error = None;
            }
            info!("Render completed");
            let _ = event_tx.send(OrchestratorEvent::Completed);
            let _ = event_tx.send(OrchestratorEvent::PhaseChanged(JobPhase::Completed));
            true
        }
        JobStatusKind::Failed => {
            let message = snapshot
                .error
                .unwrap_or_else(|| "Video creation failed".to_string());
            {
                let mut state = state.lock().unwrap();
                state.phase = JobPhase::Failed;
                state.error = Some(message.clone());
            }
            let _ = event_tx.send(OrchestratorEvent::Failed(message));
            let _ = event_tx.send(OrchestratorEvent::PhaseChanged(JobPhase::Failed));
            true
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ImageFile, MockTransport};
    use crate::types::JobStatusKind;

    fn orchestrator(mock: MockTransport) -> (JobOrchestrator, Arc<MockTransport>) {
        let transport = Arc::new(mock);
        let orchestrator = JobOrchestrator::new(
            transport.clone(),
            OrchestratorConfig::default().with_poll_interval(Duration::from_millis(10)),
        );
        (orchestrator, transport)
    }

    fn five_frames() -> SubmitInput {
        SubmitInput::Files(
            (1..=5)
                .map(|i| ImageFile::new(format!("frame_{i}.png"), vec![0]))
                .collect(),
        )
    }

    async fn wait_for_phase(orchestrator: &JobOrchestrator, phase: JobPhase) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while orchestrator.state().phase != phase {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "Timed out waiting for {phase:?}, still in {:?}",
                    orchestrator.state().phase
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_submit_records_job_and_preview_targets_middle_frame() {
        let (orchestrator, _) = orchestrator(MockTransport::new());

        let receipt = orchestrator.submit(five_frames()).await.unwrap();
        assert_eq!(receipt.file_count, 5);

        let state = orchestrator.state();
        assert_eq!(state.phase, JobPhase::Uploaded);
        assert_eq!(state.upload_percent, 100);

        // 5 frames: the middle frame is index 2.
        let preview = orchestrator.fetch_preview().await.unwrap();
        match preview {
            MediaRef::Inline { data, .. } => assert_eq!(data, b"frame_3.png"),
            MediaRef::Url(_) => panic!("mock returns inline payloads"),
        }

        assert!(orchestrator.fetch_preview_at(5).await.is_err());
    }

    #[tokio::test]
    async fn test_full_render_lifecycle() {
        let (orchestrator, _) = orchestrator(MockTransport::new().with_statuses(vec![
            JobStatusSnapshot::processing(10),
            JobStatusSnapshot::processing(45),
            JobStatusSnapshot::processing(80),
            JobStatusSnapshot::bare(JobStatusKind::Completed),
        ]));
        let mut events = orchestrator.take_event_receiver().unwrap();

        orchestrator.submit(five_frames()).await.unwrap();
        orchestrator.set_rotation(Rotation::Clockwise90);
        orchestrator.set_fps(24);
        orchestrator.start_render().await.unwrap();

        wait_for_phase(&orchestrator, JobPhase::Completed).await;

        let state = orchestrator.state();
        assert_eq!(state.progress, 100);
        assert_eq!(state.stage, Some(RenderStage::Complete));
        assert!(state.error.is_none());
        assert_eq!(state.settings.rotation, Rotation::Clockwise90);
        assert_eq!(state.settings.fps, 24);

        // The event stream saw monotonically increasing progress and a
        // terminal Completed.
        let mut progress_seen = Vec::new();
        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                OrchestratorEvent::RenderProgress { progress, .. } => progress_seen.push(progress),
                OrchestratorEvent::Completed => completed = true,
                _ => {}
            }
        }
        assert!(completed);
        assert!(progress_seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(progress_seen.contains(&45));

        orchestrator.fetch_artifact().await.unwrap();
    }

    #[tokio::test]
    async fn test_render_failure_preserves_job_and_settings() {
        let (orchestrator, _) = orchestrator(
            MockTransport::new()
                .with_statuses(vec![JobStatusSnapshot::failed("encoder crashed")]),
        );

        orchestrator.submit(five_frames()).await.unwrap();
        orchestrator.set_fps(15);
        orchestrator.start_render().await.unwrap();

        wait_for_phase(&orchestrator, JobPhase::Failed).await;

        let state = orchestrator.state();
        assert_eq!(state.error.as_deref(), Some("encoder crashed"));
        assert!(state.job.is_some());
        assert_eq!(state.settings.fps, 15);

        // Failed is retryable without a new upload.
        assert!(orchestrator.start_render().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_status_without_message_gets_default() {
        let (orchestrator, _) = orchestrator(
            MockTransport::new().with_statuses(vec![JobStatusSnapshot::bare(JobStatusKind::Failed)]),
        );

        orchestrator.submit(five_frames()).await.unwrap();
        orchestrator.start_render().await.unwrap();
        wait_for_phase(&orchestrator, JobPhase::Failed).await;

        assert_eq!(
            orchestrator.state().error.as_deref(),
            Some("Video creation failed")
        );
    }

    #[tokio::test]
    async fn test_reset_during_render_drops_stale_result() {
        let (orchestrator, transport) = orchestrator(
            MockTransport::new()
                .with_statuses(vec![JobStatusSnapshot::processing(50)])
                .with_poll_delay(Duration::from_millis(50)),
        );

        let receipt = orchestrator.submit(five_frames()).await.unwrap();
        orchestrator.start_render().await.unwrap();

        // Reset while the first poll is still sleeping inside the transport.
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.reset().await;

        let state = orchestrator.state();
        assert_eq!(state.phase, JobPhase::Idle);
        assert!(state.job.is_none());
        assert_eq!(state.settings, RenderSettings::default());
        assert!(transport.cleaned_jobs().contains(&receipt.job_id));

        // Give the in-flight poll time to resolve; it must not resurrect
        // the cancelled job.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orchestrator.state().phase, JobPhase::Idle);
        assert_eq!(orchestrator.state().progress, 0);
    }

    #[tokio::test]
    async fn test_artifact_rejected_before_completion() {
        let (orchestrator, _) =
            orchestrator(MockTransport::new().with_statuses(vec![JobStatusSnapshot::processing(5)]));

        orchestrator.submit(five_frames()).await.unwrap();
        assert!(matches!(
            orchestrator.fetch_artifact().await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_render_rejected_without_upload() {
        let (orchestrator, _) = orchestrator(MockTransport::new());
        assert!(matches!(
            orchestrator.start_render().await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_render_request_failure_returns_to_uploaded() {
        let (orchestrator, _) =
            orchestrator(MockTransport::new().with_render_error("backend unavailable"));

        orchestrator.submit(five_frames()).await.unwrap();
        assert!(orchestrator.start_render().await.is_err());

        let state = orchestrator.state();
        assert_eq!(state.phase, JobPhase::Uploaded);
        assert!(state.error.is_some());
        assert!(state.job.is_some());
    }

    #[tokio::test]
    async fn test_submit_failure_returns_to_idle() {
        let (orchestrator, _) =
            orchestrator(MockTransport::new().with_submit_error("connection refused"));

        assert!(orchestrator.submit(five_frames()).await.is_err());

        let state = orchestrator.state();
        assert_eq!(state.phase, JobPhase::Idle);
        assert!(state.error.is_some());
        assert!(state.job.is_none());
    }

    #[tokio::test]
    async fn test_fresh_submit_supersedes_previous_job() {
        let (orchestrator, transport) = orchestrator(MockTransport::new());

        let first = orchestrator.submit(five_frames()).await.unwrap();
        let second = orchestrator.submit(five_frames()).await.unwrap();

        assert_ne!(first.job_id, second.job_id);
        assert!(transport.cleaned_jobs().contains(&first.job_id));
        assert_eq!(
            orchestrator.state().job.map(|j| j.job_id),
            Some(second.job_id)
        );
    }

    #[tokio::test]
    async fn test_adjust_returns_to_uploaded_keeping_settings() {
        let (orchestrator, _) = orchestrator(MockTransport::new());
        let mut events = orchestrator.take_event_receiver().unwrap();

        orchestrator.submit(five_frames()).await.unwrap();
        orchestrator.set_fps(12);
        orchestrator.start_render().await.unwrap();
        wait_for_phase(&orchestrator, JobPhase::Completed).await;

        orchestrator.adjust().unwrap();

        let state = orchestrator.state();
        assert_eq!(state.phase, JobPhase::Uploaded);
        assert_eq!(state.progress, 0);
        assert!(state.stage.is_none());
        assert_eq!(state.settings.fps, 12);
        assert!(state.job.is_some());

        // Adjust twice is an error; there is nothing completed anymore.
        assert!(orchestrator.adjust().is_err());

        // Drain events so the channel assertion below is about phases only.
        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let OrchestratorEvent::PhaseChanged(phase) = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                JobPhase::Uploading,
                JobPhase::Uploaded,
                JobPhase::Rendering,
                JobPhase::Completed,
                JobPhase::Uploaded,
            ]
        );
    }

    #[tokio::test]
    async fn test_rotate_clockwise_steps() {
        let (orchestrator, _) = orchestrator(MockTransport::new());
        assert_eq!(orchestrator.rotate_clockwise(), Rotation::Clockwise90);
        assert_eq!(orchestrator.rotate_clockwise(), Rotation::Half);
        assert_eq!(orchestrator.state().settings.rotation, Rotation::Half);
    }

    #[tokio::test]
    async fn test_empty_submit_rejected_without_state_change() {
        let (orchestrator, _) = orchestrator(MockTransport::new());
        let result = orchestrator.submit(SubmitInput::Files(vec![])).await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert_eq!(orchestrator.state().phase, JobPhase::Idle);
    }
}
