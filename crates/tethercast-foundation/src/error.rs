use thiserror::Error;

/// Process exit statuses. The supervisor and the startup checks funnel every
/// fatal condition into one of these.
pub mod exit {
    pub const CLEAN: i32 = 0;
    pub const NO_OUTPUT_SINK: i32 = 1;
    pub const NO_DEVICE: i32 = 2;
    pub const DEVICE_LOST: i32 = 3;
    pub const IDLE_TIMEOUT: i32 = 4;
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no camera detected")]
    NoDeviceFound,

    #[error("camera lost: {0}")]
    Lost(String),

    #[error("device command failed: {0}")]
    CommandFailed(String),

    #[error("setting not found: {name}")]
    SettingNotFound { name: String },

    #[error("I/O error talking to device: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Whether the session is unusable after this error. Anything that is not
    /// a plain command/setting failure means the tether itself is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DeviceError::CommandFailed(_) | DeviceError::SettingNotFound { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to spawn encoder: {0}")]
    EncoderSpawn(String),

    #[error("encoder input pipe broken")]
    EncoderPipeBroken,

    #[error("could not read capture geometry: {0}")]
    Geometry(String),

    #[error("control channel closed")]
    ChannelClosed,

    #[error("worker thread could not be spawned: {0}")]
    WorkerSpawn(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("streaming error: {0}")]
    Stream(#[from] StreamError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("output sink missing: {0}")]
    MissingOutputSink(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failures_are_not_fatal() {
        assert!(!DeviceError::CommandFailed("busy".into()).is_fatal());
        assert!(!DeviceError::SettingNotFound { name: "iso".into() }.is_fatal());
    }

    #[test]
    fn lost_tether_is_fatal() {
        assert!(DeviceError::Lost("usb gone".into()).is_fatal());
        assert!(DeviceError::NoDeviceFound.is_fatal());
    }
}
