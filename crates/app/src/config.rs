//! Startup configuration: built-in defaults, overridden by the config file,
//! overridden by CLI flags. A broken config file degrades to defaults with a
//! warning; it is never fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Cli;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_device: PathBuf,
    pub width: u32,
    pub height: u32,
    pub preserve_aspect: bool,
    pub wait_for_device: bool,
    pub idle_timeout_mins: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_device: PathBuf::from("/dev/video0"),
            width: 1280,
            height: 720,
            preserve_aspect: true,
            wait_for_device: false,
            idle_timeout_mins: 5,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file unreadable, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file malformed, using defaults");
                Self::default()
            }
        }
    }

    /// CLI flags win over file keys.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(device) = &cli.output_device {
            self.output_device = device.clone();
        }
        if let Some(width) = cli.width {
            self.width = width;
        }
        if let Some(height) = cli.height {
            self.height = height;
        }
        if let Some(preserve) = cli.preserve_aspect {
            self.preserve_aspect = preserve;
        }
        if cli.wait_for_device {
            self.wait_for_device = true;
        }
        if let Some(mins) = cli.idle_timeout {
            self.idle_timeout_mins = mins;
        }
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_mins * 60)
    }
}
