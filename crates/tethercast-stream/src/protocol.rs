//! Operator commands and their outcomes, carried over a pair of unbounded
//! queues shared by every worker incarnation.

use crossbeam_channel::{Receiver, Sender};
use tethercast_device::SettingInfo;
use tethercast_foundation::StreamError;

/// Which facet of a setting a query wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Current,
    Choices,
}

/// One operator command. Consumed by the capture worker at a rate of at most
/// one per streamed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AutofocusStart,
    AutofocusCancel,
    /// Raw choice value for the manual-focus pulse, e.g. "Near 3".
    FocusStep(String),
    GetSetting {
        name: String,
        facet: Option<Facet>,
    },
    /// Raw `name:value` text, split by the worker. Deliberately unvalidated
    /// here: bad input surfaces from the device, not from the dispatcher.
    UpdateSetting(String),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingFacet {
    Current(String),
    Choices(Vec<String>),
    Full(SettingInfo),
}

/// Outcome of a command or of a worker's death.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Encoder pipe broke; the supervisor should respawn the worker.
    Restart,
    /// Device-level fault; the supervisor should abandon ship.
    Abort(String),
    /// Clean shutdown acknowledged.
    Done,
    /// Reply to a `GetSetting` query.
    Value(SettingFacet),
}

/// Dispatcher/supervisor side of the control queues.
///
/// The reply queue carries no correlation identifiers. `request` is correct
/// only because a single dispatcher issues all waiting requests sequentially
/// and at most one worker is alive at a time; a second concurrent requester
/// would need per-request reply channels instead.
#[derive(Clone)]
pub struct ControlHandle {
    cmd_tx: Sender<Command>,
    outcome_rx: Receiver<Outcome>,
}

impl ControlHandle {
    /// Fire-and-forget send.
    pub fn send(&self, command: Command) -> Result<(), StreamError> {
        self.cmd_tx
            .send(command)
            .map_err(|_| StreamError::ChannelClosed)
    }

    /// Send, then block until the worker pushes the matching outcome.
    pub fn request(&self, command: Command) -> Result<Outcome, StreamError> {
        self.send(command)?;
        self.outcome_rx.recv().map_err(|_| StreamError::ChannelClosed)
    }

    /// Non-blocking sample of the outcome queue; `None` when empty.
    pub fn try_take(&self) -> Option<Outcome> {
        self.outcome_rx.try_recv().ok()
    }
}

/// Worker side of the control queues. Cloned into every respawned worker so
/// the queues outlive any single incarnation.
#[derive(Clone)]
pub struct WorkerEndpoint {
    cmd_rx: Receiver<Command>,
    outcome_tx: Sender<Outcome>,
}

impl WorkerEndpoint {
    /// Non-blocking pop of the next pending command.
    pub fn next_command(&self) -> Option<Command> {
        self.cmd_rx.try_recv().ok()
    }

    pub fn push(&self, outcome: Outcome) {
        // The dispatcher half can only be gone during process teardown.
        let _ = self.outcome_tx.send(outcome);
    }
}

pub fn control_channel() -> (ControlHandle, WorkerEndpoint) {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
    (
        ControlHandle { cmd_tx, outcome_rx },
        WorkerEndpoint { cmd_rx, outcome_tx },
    )
}
