//! Lifecycle of the external encoder process. The worker feeds it raw JPEG
//! preview frames on stdin; ffmpeg scales them and writes into the V4L2
//! loopback sink.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tethercast_foundation::StreamError;

use crate::geometry::AspectCorrection;

/// How long a SIGTERM gets before the process is killed outright.
const TERM_GRACE: Duration = Duration::from_secs(2);
const REAP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub target_aspect: f64,
    pub correction: Option<AspectCorrection>,
    pub sink: PathBuf,
}

/// Builds and spawns the encoder command line.
#[derive(Debug, Clone)]
pub struct EncoderLauncher {
    program: String,
    args_override: Option<Vec<String>>,
}

impl Default for EncoderLauncher {
    fn default() -> Self {
        Self::ffmpeg()
    }
}

impl EncoderLauncher {
    pub fn ffmpeg() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args_override: None,
        }
    }

    /// Replace the whole command line; used by tests to stand in a stdin sink.
    pub fn custom(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args_override: Some(args),
        }
    }

    pub fn build_args(&self, params: &EncodeParams) -> Vec<String> {
        let mut filters = Vec::new();
        if let Some(correction) = params.correction {
            filters.push(correction.filter(params.target_aspect));
        }
        filters.push(format!("scale={}:{}", params.width, params.height));

        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "image2pipe".into(),
            "-vcodec".into(),
            "mjpeg".into(),
            "-i".into(),
            "-".into(),
            "-vf".into(),
            filters.join(","),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-f".into(),
            "v4l2".into(),
            params.sink.to_string_lossy().into_owned(),
        ]
    }

    pub fn spawn(&self, params: &EncodeParams) -> Result<EncoderProcess, StreamError> {
        let args = match &self.args_override {
            Some(args) => args.clone(),
            None => self.build_args(params),
        };
        tracing::info!(program = %self.program, ?args, "spawning encoder");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| StreamError::EncoderSpawn(e.to_string()))?;
        Ok(EncoderProcess { child })
    }
}

/// Owned handle to one running encoder. Dropping it tears the process down,
/// gracefully first, forcibly if it lingers.
pub struct EncoderProcess {
    child: Child,
}

impl EncoderProcess {
    /// Write one frame to the encoder's stdin. This blocks when the encoder
    /// falls behind, which is the stream's backpressure valve.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), StreamError> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or(StreamError::EncoderPipeBroken)?;
        stdin.write_all(frame).map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                StreamError::EncoderPipeBroken
            } else {
                StreamError::Io(e)
            }
        })
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }
        // Close stdin first so a well-behaved encoder drains and exits.
        drop(self.child.stdin.take());
        signal_term(&self.child);

        let deadline = Instant::now() + TERM_GRACE;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return;
            }
            std::thread::sleep(REAP_POLL);
        }

        tracing::warn!("encoder ignored SIGTERM, killing");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(target_os = "linux")]
fn signal_term(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
}

#[cfg(not(target_os = "linux"))]
fn signal_term(_child: &Child) {}
