use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

/// Counters shared between the worker, supervisor, and log output.
#[derive(Debug, Default)]
pub struct StreamStats {
    pub frames_written: AtomicU64,
    pub worker_respawns: AtomicU64,
    pub last_frame_time: RwLock<Option<Instant>>,
}

impl StreamStats {
    pub fn record_frame(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        *self.last_frame_time.write() = Some(Instant::now());
    }

    pub fn record_respawn(&self) {
        self.worker_respawns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    pub fn respawns(&self) -> u64 {
        self.worker_respawns.load(Ordering::Relaxed)
    }
}
