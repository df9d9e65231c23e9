//! Collaborator boundary for the imaging device. The streaming side only ever
//! talks to these traits; the gphoto2 CLI driver and the simulated camera are
//! the two implementations.

use tethercast_foundation::DeviceError;

/// A camera detected on the host, addressable for opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub model: String,
    pub port: String,
}

/// One device setting as reported by the camera: the live value plus the
/// enumerated valid choices (empty for free-form settings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingInfo {
    pub name: String,
    pub current: String,
    pub choices: Vec<String>,
}

/// Host-level access: enumeration and session opening.
pub trait CaptureBackend: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceRef>, DeviceError>;

    fn open(&self, device: &DeviceRef) -> Result<Box<dyn CameraSession>, DeviceError>;
}

/// An exclusive handle to one opened camera. Owned by a single capture worker
/// for its whole lifetime; closed on drop.
///
/// Every method may block for as long as the hardware takes. There is no
/// per-call timeout: a wedged call wedges the owning worker.
pub trait CameraSession: Send {
    /// Fetch one preview frame (JPEG bytes).
    fn fetch_preview_frame(&mut self) -> Result<Vec<u8>, DeviceError>;

    fn read_setting(&mut self, name: &str) -> Result<SettingInfo, DeviceError>;

    fn write_setting(&mut self, name: &str, value: &str) -> Result<(), DeviceError>;
}
