//! Deterministic in-process camera used by the streaming and protocol tests.
//! Serves a fixed preview frame, keeps a settings table, records every write,
//! and can be scripted to lose the tether after N frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tethercast_foundation::DeviceError;

use crate::port::{CameraSession, CaptureBackend, DeviceRef, SettingInfo};

#[derive(Default)]
struct SimState {
    frame: Vec<u8>,
    fail_after: Mutex<Option<usize>>,
    served: AtomicUsize,
    settings: Mutex<HashMap<String, SettingInfo>>,
    writes: Mutex<Vec<(String, String)>>,
}

#[derive(Clone, Default)]
pub struct SimCamera {
    state: Arc<SimState>,
}

impl SimCamera {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            state: Arc::new(SimState {
                frame,
                ..Default::default()
            }),
        }
    }

    pub fn with_setting(self, info: SettingInfo) -> Self {
        self.state.settings.lock().insert(info.name.clone(), info);
        self
    }

    /// Serve `n` frames, then report the tether as lost.
    pub fn fail_frames_after(self, n: usize) -> Self {
        *self.state.fail_after.lock() = Some(n);
        self
    }

    pub fn frames_served(&self) -> usize {
        self.state.served.load(Ordering::SeqCst)
    }

    /// All write attempts in order, including rejected ones.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.writes.lock().clone()
    }
}

impl CaptureBackend for SimCamera {
    fn list_devices(&self) -> Result<Vec<DeviceRef>, DeviceError> {
        Ok(vec![DeviceRef {
            model: "SimCam".into(),
            port: "sim:0".into(),
        }])
    }

    fn open(&self, _device: &DeviceRef) -> Result<Box<dyn CameraSession>, DeviceError> {
        Ok(Box::new(SimSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimSession {
    state: Arc<SimState>,
}

impl CameraSession for SimSession {
    fn fetch_preview_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
        let served = self.state.served.load(Ordering::SeqCst);
        if let Some(limit) = *self.state.fail_after.lock() {
            if served >= limit {
                return Err(DeviceError::Lost("simulated tether loss".into()));
            }
        }
        self.state.served.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.frame.clone())
    }

    fn read_setting(&mut self, name: &str) -> Result<SettingInfo, DeviceError> {
        self.state
            .settings
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::SettingNotFound { name: name.into() })
    }

    fn write_setting(&mut self, name: &str, value: &str) -> Result<(), DeviceError> {
        self.state
            .writes
            .lock()
            .push((name.to_string(), value.to_string()));
        let mut settings = self.state.settings.lock();
        match settings.get_mut(name) {
            Some(info) => {
                if !info.choices.is_empty() && !info.choices.iter().any(|c| c == value) {
                    return Err(DeviceError::CommandFailed(format!(
                        "value {:?} not valid for {}",
                        value, name
                    )));
                }
                info.current = value.to_string();
                Ok(())
            }
            None => Err(DeviceError::CommandFailed(format!(
                "unknown setting {}",
                name
            ))),
        }
    }
}
