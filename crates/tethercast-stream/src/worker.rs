//! The capture worker: owns the camera session and the encoder process for
//! one capture attempt, streams preview frames, and services operator
//! commands between frames.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tethercast_device::{CameraSession, CaptureBackend, SettingInfo};
use tethercast_foundation::{SessionCell, SessionState, StreamError, Termination};

use crate::encoder::{EncodeParams, EncoderLauncher};
use crate::geometry::{select_correction, CaptureGeometry};
use crate::protocol::{Command, Facet, Outcome, SettingFacet, WorkerEndpoint};
use crate::stats::StreamStats;

/// Autofocus and manual-focus live under these config names on the camera.
pub const AUTOFOCUS_DRIVE: &str = "autofocusdrive";
pub const CANCEL_AUTOFOCUS: &str = "cancelautofocus";
pub const MANUAL_FOCUS_DRIVE: &str = "manualfocusdrive";
/// Manual focus is an edge-triggered pulse; this value releases the edge.
pub const FOCUS_NEUTRAL: &str = "None";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub sink: PathBuf,
    pub width: u32,
    pub height: u32,
    pub preserve_aspect: bool,
}

impl WorkerConfig {
    pub fn target_aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Handle to a running worker thread.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
    session: SessionCell,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }

    pub fn session(&self) -> &SessionCell {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn test_only(handle: JoinHandle<()>, session: SessionCell) -> Self {
        Self { handle, session }
    }
}

pub struct CaptureWorker {
    backend: Arc<dyn CaptureBackend>,
    launcher: EncoderLauncher,
    cfg: WorkerConfig,
    endpoint: WorkerEndpoint,
    stats: Arc<StreamStats>,
}

impl CaptureWorker {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        launcher: EncoderLauncher,
        cfg: WorkerConfig,
        endpoint: WorkerEndpoint,
    ) -> Self {
        Self {
            backend,
            launcher,
            cfg,
            endpoint,
            stats: Arc::new(StreamStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<StreamStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn spawn(self) -> Result<WorkerHandle, StreamError> {
        let session = SessionCell::new();
        let cell = session.clone();
        let handle = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || self.run(cell))
            .map_err(|e| StreamError::WorkerSpawn(e.to_string()))?;
        Ok(WorkerHandle { handle, session })
    }

    fn run(mut self, cell: SessionCell) {
        let termination = self.execute(&cell);
        // Camera session and encoder are already torn down here: both live as
        // locals inside `execute` and drop on every return path.
        let outcome = match &termination {
            Termination::CleanShutdown => Outcome::Done,
            Termination::PipeBroken => Outcome::Restart,
            Termination::DeviceLost(msg) => Outcome::Abort(msg.clone()),
        };
        cell.transition(SessionState::Terminated(termination.clone()));
        tracing::info!(?termination, "capture worker exited");
        self.endpoint.push(outcome);
    }

    fn execute(&mut self, cell: &SessionCell) -> Termination {
        let device = match self.backend.list_devices() {
            Ok(devices) => match devices.into_iter().next() {
                Some(d) => d,
                None => return Termination::DeviceLost("no camera detected".into()),
            },
            Err(e) => return Termination::DeviceLost(e.to_string()),
        };
        let mut camera = match self.backend.open(&device) {
            Ok(c) => c,
            Err(e) => return Termination::DeviceLost(e.to_string()),
        };

        // Starting: one frame to learn the capture geometry, then bring up
        // the encoder with the matching filter chain.
        let first = match camera.fetch_preview_frame() {
            Ok(f) => f,
            Err(e) => return Termination::DeviceLost(e.to_string()),
        };
        let geometry = match CaptureGeometry::probe(&first) {
            Ok(g) => g,
            Err(e) => return Termination::DeviceLost(e.to_string()),
        };
        let correction = select_correction(
            self.cfg.target_aspect(),
            geometry.aspect(),
            self.cfg.preserve_aspect,
        );
        let params = EncodeParams {
            width: self.cfg.width,
            height: self.cfg.height,
            target_aspect: self.cfg.target_aspect(),
            correction,
            sink: self.cfg.sink.clone(),
        };
        let mut encoder = match self.launcher.spawn(&params) {
            Ok(enc) => enc,
            Err(e) => {
                tracing::error!(error = %e, "encoder failed to start");
                return Termination::PipeBroken;
            }
        };

        cell.transition(SessionState::Running);
        tracing::info!(
            capture_width = geometry.width,
            capture_height = geometry.height,
            ?correction,
            "streaming started"
        );

        if let Err(e) = encoder.write_frame(&first) {
            return classify_write_failure(e);
        }
        self.stats.record_frame();

        // Streaming: one frame, one write, at most one command per
        // iteration. An empty command queue continues immediately; the frame
        // fetch and the blocking encoder write pace the loop.
        loop {
            let frame = match camera.fetch_preview_frame() {
                Ok(f) => f,
                Err(e) => return Termination::DeviceLost(e.to_string()),
            };
            if let Err(e) = encoder.write_frame(&frame) {
                return classify_write_failure(e);
            }
            self.stats.record_frame();

            let Some(command) = self.endpoint.next_command() else {
                continue;
            };
            if let Some(termination) = self.dispatch(command, camera.as_mut()) {
                return termination;
            }
        }
    }

    /// Service one operator command. Returns a termination only for fatal
    /// device faults or an explicit shutdown.
    fn dispatch(
        &mut self,
        command: Command,
        camera: &mut dyn CameraSession,
    ) -> Option<Termination> {
        match command {
            Command::AutofocusStart => {
                // One shot; most bodies silently ignore repeats within a session.
                self.apply_setting(camera, AUTOFOCUS_DRIVE, "1")
            }
            Command::AutofocusCancel => {
                // Not guaranteed effective; some bodies ignore the request.
                if let Some(termination) = self.apply_setting(camera, CANCEL_AUTOFOCUS, "1") {
                    return Some(termination);
                }
                self.apply_setting(camera, CANCEL_AUTOFOCUS, "0")
            }
            Command::FocusStep(value) => {
                if let Some(termination) = self.apply_setting(camera, MANUAL_FOCUS_DRIVE, &value)
                {
                    return Some(termination);
                }
                self.apply_setting(camera, MANUAL_FOCUS_DRIVE, FOCUS_NEUTRAL)
            }
            Command::GetSetting { name, facet } => self.query_setting(camera, &name, facet),
            Command::UpdateSetting(raw) => {
                let (name, value) = match raw.split_once(':') {
                    Some((n, v)) => (n.trim(), v.trim()),
                    None => (raw.trim(), ""),
                };
                self.apply_setting(camera, name, value)
            }
            Command::Shutdown => Some(Termination::CleanShutdown),
        }
    }

    /// Best-effort setting write: rejections are expected (mode-dependent
    /// settings) and swallowed; only a lost tether terminates the session.
    fn apply_setting(
        &self,
        camera: &mut dyn CameraSession,
        name: &str,
        value: &str,
    ) -> Option<Termination> {
        match camera.write_setting(name, value) {
            Ok(()) => None,
            Err(e) if e.is_fatal() => Some(Termination::DeviceLost(e.to_string())),
            Err(e) => {
                tracing::warn!(setting = name, error = %e, "setting write ignored");
                None
            }
        }
    }

    fn query_setting(
        &self,
        camera: &mut dyn CameraSession,
        name: &str,
        facet: Option<Facet>,
    ) -> Option<Termination> {
        match camera.read_setting(name) {
            Ok(info) => {
                let value = match facet {
                    Some(Facet::Current) => SettingFacet::Current(info.current),
                    Some(Facet::Choices) => SettingFacet::Choices(info.choices),
                    None => SettingFacet::Full(info),
                };
                self.endpoint.push(Outcome::Value(value));
                None
            }
            Err(e) if e.is_fatal() => Some(Termination::DeviceLost(e.to_string())),
            Err(e) => {
                // The requester is blocked on a reply; answer with the empty
                // form of what it asked for.
                tracing::warn!(setting = name, error = %e, "setting read failed");
                let value = match facet {
                    Some(Facet::Current) => SettingFacet::Current(String::new()),
                    Some(Facet::Choices) => SettingFacet::Choices(Vec::new()),
                    None => SettingFacet::Full(SettingInfo {
                        name: name.to_string(),
                        current: String::new(),
                        choices: Vec::new(),
                    }),
                };
                self.endpoint.push(Outcome::Value(value));
                None
            }
        }
    }
}

fn classify_write_failure(error: StreamError) -> Termination {
    match error {
        StreamError::EncoderPipeBroken => Termination::PipeBroken,
        other => {
            // Anything else on the frame path is pipe trouble too; let the
            // supervisor respawn rather than abort the process.
            tracing::warn!(error = %other, "frame write failed");
            Termination::PipeBroken
        }
    }
}
