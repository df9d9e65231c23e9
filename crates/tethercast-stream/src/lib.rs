pub mod encoder;
pub mod geometry;
pub mod protocol;
pub mod sink;
pub mod stats;
pub mod supervisor;
pub mod worker;

pub use encoder::{EncodeParams, EncoderLauncher, EncoderProcess};
pub use geometry::{select_correction, AspectCorrection, CaptureGeometry};
pub use protocol::{control_channel, Command, ControlHandle, Facet, Outcome, SettingFacet, WorkerEndpoint};
pub use sink::{ProcScanProbe, SinkProbe};
pub use stats::StreamStats;
pub use supervisor::{Supervisor, SupervisorConfig, Verdict};
pub use worker::{CaptureWorker, WorkerConfig, WorkerHandle};
