//! Camera driver speaking to the `gphoto2` command-line tool. Each session
//! pins the USB port it was opened on so a second camera appearing mid-run
//! cannot be addressed by accident.

use std::process::{Command, Output};

use tethercast_foundation::DeviceError;

use crate::port::{CameraSession, CaptureBackend, DeviceRef, SettingInfo};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

pub struct Gphoto2Cli {
    program: String,
}

impl Default for Gphoto2Cli {
    fn default() -> Self {
        Self::new()
    }
}

impl Gphoto2Cli {
    pub fn new() -> Self {
        Self {
            program: "gphoto2".to_string(),
        }
    }

    /// Override the driver binary, e.g. a stub script in tests.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, DeviceError> {
        tracing::trace!(program = %self.program, ?args, "running camera command");
        Ok(Command::new(&self.program).args(args).output()?)
    }
}

impl CaptureBackend for Gphoto2Cli {
    fn list_devices(&self) -> Result<Vec<DeviceRef>, DeviceError> {
        let out = self.run(&["--auto-detect"])?;
        if !out.status.success() {
            return Err(DeviceError::CommandFailed(stderr_of(&out)));
        }
        Ok(parse_auto_detect(&String::from_utf8_lossy(&out.stdout)))
    }

    fn open(&self, device: &DeviceRef) -> Result<Box<dyn CameraSession>, DeviceError> {
        // A summary round-trip both claims the camera once and proves it is
        // still on the port we detected it on.
        let out = self.run(&["--port", &device.port, "--summary"])?;
        if !out.status.success() {
            return Err(DeviceError::Lost(stderr_of(&out)));
        }
        tracing::info!(model = %device.model, port = %device.port, "camera session opened");
        Ok(Box::new(Gphoto2Session {
            program: self.program.clone(),
            port: device.port.clone(),
            model: device.model.clone(),
        }))
    }
}

struct Gphoto2Session {
    program: String,
    port: String,
    model: String,
}

impl Gphoto2Session {
    fn run(&self, args: &[&str]) -> Result<Output, DeviceError> {
        let mut full = vec!["--port", self.port.as_str(), "--quiet"];
        full.extend_from_slice(args);
        Ok(Command::new(&self.program).args(&full).output()?)
    }
}

impl CameraSession for Gphoto2Session {
    fn fetch_preview_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
        let out = self.run(&["--capture-preview", "--stdout"])?;
        if !out.status.success() {
            // Failure on the frame path means the tether is gone.
            return Err(DeviceError::Lost(stderr_of(&out)));
        }
        if !out.stdout.starts_with(&JPEG_SOI) {
            return Err(DeviceError::Lost(format!(
                "no preview data from {}",
                self.model
            )));
        }
        Ok(out.stdout)
    }

    fn read_setting(&mut self, name: &str) -> Result<SettingInfo, DeviceError> {
        let out = self.run(&["--get-config", name])?;
        if !out.status.success() {
            let err = stderr_of(&out);
            if err.contains("not found") {
                return Err(DeviceError::SettingNotFound { name: name.into() });
            }
            return Err(DeviceError::CommandFailed(err));
        }
        Ok(parse_get_config(
            &String::from_utf8_lossy(&out.stdout),
            name,
        ))
    }

    fn write_setting(&mut self, name: &str, value: &str) -> Result<(), DeviceError> {
        let assignment = format!("{}={}", name, value);
        let out = self.run(&["--set-config", &assignment])?;
        if !out.status.success() {
            return Err(DeviceError::CommandFailed(stderr_of(&out)));
        }
        Ok(())
    }
}

impl Drop for Gphoto2Session {
    fn drop(&mut self) {
        // Nothing held open between invocations; the port pin just ends here.
        tracing::info!(model = %self.model, port = %self.port, "camera session closed");
    }
}

fn stderr_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).trim().to_string()
}

/// Parse `gphoto2 --auto-detect` output: a two-line header followed by
/// `Model<padding>port` rows.
fn parse_auto_detect(stdout: &str) -> Vec<DeviceRef> {
    let mut devices = Vec::new();
    let mut past_header = false;
    for line in stdout.lines() {
        if line.starts_with('-') {
            past_header = true;
            continue;
        }
        if !past_header {
            continue;
        }
        let trimmed = line.trim_end();
        let mut halves = trimmed.rsplitn(2, char::is_whitespace);
        let port = match halves.next() {
            Some(p) if p.contains(':') => p,
            _ => continue,
        };
        let model = halves.next().unwrap_or("").trim();
        if model.is_empty() {
            continue;
        }
        devices.push(DeviceRef {
            model: model.to_string(),
            port: port.to_string(),
        });
    }
    devices
}

/// Parse `gphoto2 --get-config <name>` output into the current value and the
/// enumerated choices.
fn parse_get_config(stdout: &str, name: &str) -> SettingInfo {
    let mut current = String::new();
    let mut choices = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Current:") {
            current = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Choice:") {
            // "Choice: 3 1/125" - the index is noise, the value may contain spaces.
            let rest = rest.trim();
            match rest.split_once(char::is_whitespace) {
                Some((_, value)) => choices.push(value.trim().to_string()),
                None => choices.push(rest.to_string()),
            }
        }
    }
    SettingInfo {
        name: name.to_string(),
        current,
        choices,
    }
}
