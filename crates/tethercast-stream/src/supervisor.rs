//! Watchdog actor: keeps exactly one capture worker alive, escalates fatal
//! device loss, and enforces the idle-stream timeout. Runs decoupled from the
//! streaming loop so a stuck worker cannot block timeout enforcement.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tethercast_foundation::{exit, SharedClock, StreamError};

use crate::protocol::{ControlHandle, Outcome};
use crate::sink::SinkProbe;
use crate::stats::StreamStats;
use crate::worker::WorkerHandle;

/// Watchdog cycle; worker death is noticed within one of these.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub interval: Duration,
    pub idle_timeout: Duration,
    pub sink: PathBuf,
}

impl SupervisorConfig {
    pub fn new(sink: PathBuf, idle_timeout: Duration) -> Self {
        Self {
            interval: WATCHDOG_INTERVAL,
            idle_timeout,
            sink,
        }
    }
}

/// What one watchdog cycle decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Fatal { code: i32, reason: String },
}

type Spawner = Box<dyn FnMut() -> Result<WorkerHandle, StreamError> + Send>;

pub struct Supervisor {
    cfg: SupervisorConfig,
    clock: SharedClock,
    probe: Box<dyn SinkProbe>,
    control: ControlHandle,
    spawner: Spawner,
    stats: Arc<StreamStats>,
    worker: Option<WorkerHandle>,
    spawned_before: bool,
    idle_since: Option<Instant>,
}

impl Supervisor {
    pub fn new(
        cfg: SupervisorConfig,
        clock: SharedClock,
        probe: Box<dyn SinkProbe>,
        control: ControlHandle,
        spawner: Spawner,
        stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            cfg,
            clock,
            probe,
            control,
            spawner,
            stats,
            worker: None,
            spawned_before: false,
            idle_since: None,
        }
    }

    /// One watchdog cycle: worker liveness first, then the idle check. The
    /// two are independent; both run every cycle.
    pub fn tick(&mut self) -> Verdict {
        if let Some(verdict) = self.ensure_worker() {
            return verdict;
        }
        if let Some(verdict) = self.check_idle() {
            return verdict;
        }
        Verdict::Continue
    }

    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Restart policy: only touched when the worker is *not alive*, i.e. it
    /// has finished teardown and pushed its final outcome, if any. That is
    /// what keeps the reply queue free of stale results across respawns.
    fn ensure_worker(&mut self) -> Option<Verdict> {
        if self.worker_alive() {
            return None;
        }
        if let Some(handle) = self.worker.take() {
            handle.join();
        }
        match self.control.try_take() {
            Some(Outcome::Abort(reason)) => {
                return Some(Verdict::Fatal {
                    code: exit::DEVICE_LOST,
                    reason,
                });
            }
            Some(outcome) => {
                tracing::debug!(?outcome, "worker final outcome");
            }
            None => {}
        }
        match (self.spawner)() {
            Ok(handle) => {
                if self.spawned_before {
                    self.stats.record_respawn();
                    tracing::info!(
                        respawns = self.stats.respawns(),
                        "capture worker respawned"
                    );
                } else {
                    tracing::info!("capture worker started");
                }
                self.spawned_before = true;
                self.worker = Some(handle);
            }
            Err(e) => {
                tracing::error!(error = %e, "could not start capture worker");
            }
        }
        None
    }

    fn check_idle(&mut self) -> Option<Verdict> {
        let now = self.clock.now();
        let readers = self.probe.open_reader_count(&self.cfg.sink);
        if readers > 1 {
            if self.idle_since.take().is_some() {
                tracing::debug!(readers, "output sink has consumers again");
            }
            return None;
        }
        let since = *self.idle_since.get_or_insert(now);
        let idle_for = now.duration_since(since);
        if idle_for > self.cfg.idle_timeout {
            return Some(Verdict::Fatal {
                code: exit::IDLE_TIMEOUT,
                reason: format!(
                    "no consumer read {} for {}s",
                    self.cfg.sink.display(),
                    idle_for.as_secs()
                ),
            });
        }
        None
    }

    /// Run the watchdog on its own thread until `stop` is raised. A fatal
    /// verdict ends the whole process with its exit status.
    pub fn spawn(mut self, stop: Arc<AtomicBool>) -> Result<JoinHandle<()>, StreamError> {
        thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match self.tick() {
                        Verdict::Fatal { code, reason } => {
                            tracing::error!(code, %reason, "supervisor escalating");
                            eprintln!("{}", reason);
                            std::process::exit(code);
                        }
                        Verdict::Continue => {}
                    }
                    self.clock.sleep(self.cfg.interval);
                }
                if let Some(handle) = self.worker.take() {
                    if handle.is_finished() {
                        handle.join();
                    }
                }
                tracing::info!("supervisor stopped");
            })
            .map_err(|e| StreamError::WorkerSpawn(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;
    use tethercast_foundation::{SessionCell, TestClock};

    use super::*;
    use crate::protocol::control_channel;

    /// Probe replaying a scripted count sequence, repeating the last entry.
    struct ScriptedProbe {
        counts: Mutex<VecDeque<usize>>,
        last: Mutex<usize>,
    }

    impl ScriptedProbe {
        fn new(counts: &[usize]) -> Box<Self> {
            Box::new(Self {
                counts: Mutex::new(counts.iter().copied().collect()),
                last: Mutex::new(*counts.last().unwrap_or(&0)),
            })
        }
    }

    impl SinkProbe for ScriptedProbe {
        fn open_reader_count(&self, _sink: &Path) -> usize {
            match self.counts.lock().pop_front() {
                Some(n) => {
                    *self.last.lock() = n;
                    n
                }
                None => *self.last.lock(),
            }
        }
    }

    fn short_lived_spawner(count: Arc<AtomicUsize>) -> Spawner {
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
            let handle = thread::spawn(|| {});
            Ok(WorkerHandle::test_only(handle, SessionCell::new()))
        })
    }

    fn long_lived_spawner(stop: Arc<AtomicBool>) -> Spawner {
        Box::new(move || {
            let stop = stop.clone();
            let handle = thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
            });
            Ok(WorkerHandle::test_only(handle, SessionCell::new()))
        })
    }

    fn supervisor_with(
        probe: Box<dyn SinkProbe>,
        spawner: Spawner,
        clock: Arc<TestClock>,
        idle_timeout: Duration,
    ) -> (Supervisor, ControlHandle, crate::protocol::WorkerEndpoint) {
        let (control, endpoint) = control_channel();
        let cfg = SupervisorConfig {
            interval: WATCHDOG_INTERVAL,
            idle_timeout,
            sink: PathBuf::from("/dev/video9"),
        };
        let supervisor = Supervisor::new(
            cfg,
            clock,
            probe,
            control.clone(),
            spawner,
            Arc::new(StreamStats::default()),
        );
        (supervisor, control, endpoint)
    }

    #[test]
    fn dead_worker_without_abort_is_respawned() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(TestClock::new());
        let (mut sup, _control, _endpoint) = supervisor_with(
            ScriptedProbe::new(&[2]),
            short_lived_spawner(spawns.clone()),
            clock,
            Duration::from_secs(300),
        );

        assert_eq!(sup.tick(), Verdict::Continue);
        assert_eq!(spawns.load(Ordering::SeqCst), 1);

        // The worker thread exits immediately; the next cycle replaces it.
        while !sup.worker.as_ref().unwrap().is_finished() {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sup.tick(), Verdict::Continue);
        assert_eq!(spawns.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn abort_outcome_escalates_and_does_not_respawn() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(TestClock::new());
        let (mut sup, _control, endpoint) = supervisor_with(
            ScriptedProbe::new(&[2]),
            short_lived_spawner(spawns.clone()),
            clock,
            Duration::from_secs(300),
        );
        endpoint.push(Outcome::Abort("usb gone".into()));

        let verdict = sup.tick();
        assert_eq!(
            verdict,
            Verdict::Fatal {
                code: exit::DEVICE_LOST,
                reason: "usb gone".into()
            }
        );
        assert_eq!(spawns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restart_outcome_is_consumed_and_worker_respawned() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(TestClock::new());
        let (mut sup, control, endpoint) = supervisor_with(
            ScriptedProbe::new(&[2]),
            short_lived_spawner(spawns.clone()),
            clock,
            Duration::from_secs(300),
        );
        endpoint.push(Outcome::Restart);

        assert_eq!(sup.tick(), Verdict::Continue);
        assert_eq!(spawns.load(Ordering::SeqCst), 1);
        assert!(control.try_take().is_none());
    }

    #[test]
    fn idle_timeout_fires_after_deadline() {
        let stop = Arc::new(AtomicBool::new(false));
        let clock = Arc::new(TestClock::new());
        // Two busy samples, then the external consumer goes away for good.
        let (mut sup, _control, _endpoint) = supervisor_with(
            ScriptedProbe::new(&[2, 2, 1]),
            long_lived_spawner(stop.clone()),
            clock.clone(),
            Duration::from_secs(300),
        );

        assert_eq!(sup.tick(), Verdict::Continue); // readers=2
        clock.advance(WATCHDOG_INTERVAL);
        assert_eq!(sup.tick(), Verdict::Continue); // readers=2
        clock.advance(WATCHDOG_INTERVAL);
        assert_eq!(sup.tick(), Verdict::Continue); // readers=1, idle marked

        clock.advance(Duration::from_secs(299));
        assert_eq!(sup.tick(), Verdict::Continue); // not yet past the deadline

        clock.advance(Duration::from_secs(2));
        match sup.tick() {
            Verdict::Fatal { code, .. } => assert_eq!(code, exit::IDLE_TIMEOUT),
            v => panic!("expected idle timeout, got {:?}", v),
        }
        stop.store(true, Ordering::SeqCst);
    }

    #[test]
    fn returning_reader_clears_the_idle_marker() {
        let stop = Arc::new(AtomicBool::new(false));
        let clock = Arc::new(TestClock::new());
        let (mut sup, _control, _endpoint) = supervisor_with(
            ScriptedProbe::new(&[1, 1, 2, 1]),
            long_lived_spawner(stop.clone()),
            clock.clone(),
            Duration::from_secs(300),
        );

        assert_eq!(sup.tick(), Verdict::Continue); // idle starts
        clock.advance(Duration::from_secs(299));
        assert_eq!(sup.tick(), Verdict::Continue); // still idle, below deadline
        assert_eq!(sup.tick(), Verdict::Continue); // reader back, marker cleared

        // Idle again: the old timestamp must not count.
        clock.advance(Duration::from_secs(250));
        assert_eq!(sup.tick(), Verdict::Continue);
        stop.store(true, Ordering::SeqCst);
    }
}
