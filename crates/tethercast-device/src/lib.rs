pub mod gphoto2cli;
pub mod port;
pub mod sim;

pub use gphoto2cli::Gphoto2Cli;
pub use port::{CameraSession, CaptureBackend, DeviceRef, SettingInfo};
pub use sim::SimCamera;
