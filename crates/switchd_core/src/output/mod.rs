//!The closed set of output variants. Each output runs as one spawned task
//!owning its control channels; all transitions for a given channel happen
//!on that task, so they are totally ordered and never race. The cloneable
//!`OutputHandle` is the only way in: an mpsc sender for requests and watch
//!receivers for the current state, status and dimming level.

mod pwm;
mod relay;
mod switch;

pub use pwm::PwmOutput;
pub use relay::{BistableRelay, RelayConfig};
pub use switch::SwitchOutput;

use crate::kind::OutputType;
use crate::status::Status;
use tokio::sync::{mpsc, watch};

const COMMAND_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Command {
    SetState(bool),
    SetDimming(u8),
}

///Send a new value to a watch channel only when it actually changed, so
///observers see exactly one notification per change.
fn publish<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

///Handle to a running output task.
#[derive(Clone)]
pub struct OutputHandle {
    name: String,
    label: String,
    kind: OutputType,
    persisted: bool,
    has_feedback: bool,
    cmd: mpsc::Sender<Command>,
    state: watch::Receiver<i64>,
    status: watch::Receiver<Status>,
    dimming: Option<watch::Receiver<i64>>,
}

impl OutputHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> OutputType {
        self.kind
    }

    ///Whether state/dimming must be restored from the settings store at
    ///startup. False when a feedback source makes a stored value redundant.
    pub fn persisted(&self) -> bool {
        self.persisted
    }

    pub fn has_feedback(&self) -> bool {
        self.has_feedback
    }

    ///The last requested logical state. For a bistable relay this is set
    ///optimistically before confirmation; read `status` for the confirmed
    ///physical value.
    pub fn state(&self) -> i64 {
        *self.state.borrow()
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn dimming(&self) -> Option<i64> {
        self.dimming.as_ref().map(|rx| *rx.borrow())
    }

    pub fn watch_state(&self) -> watch::Receiver<i64> {
        self.state.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn watch_dimming(&self) -> Option<watch::Receiver<i64>> {
        self.dimming.clone()
    }

    ///Request a state change. Values outside {0,1} are rejected with no
    ///mutation and no status change; the return value is the only failure
    ///signal the caller gets.
    pub async fn set_state(&self, value: i64) -> bool {
        if !(0..=1).contains(&value) {
            return false;
        }
        self.cmd.send(Command::SetState(value == 1)).await.is_ok()
    }

    ///Request a dimming change, percentage 0-100. Rejected for non-dimmable
    ///outputs and out-of-domain values.
    pub async fn set_dimming(&self, value: i64) -> bool {
        if self.dimming.is_none() || !(0..=100).contains(&value) {
            return false;
        }
        self.cmd.send(Command::SetDimming(value as u8)).await.is_ok()
    }
}

struct HandleParts {
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<i64>,
    status_tx: watch::Sender<Status>,
    dimming_tx: Option<watch::Sender<i64>>,
}

fn make_handle(
    name: String,
    label: String,
    kind: OutputType,
    persisted: bool,
    has_feedback: bool,
    initial_state: i64,
    initial_status: Status,
    dimmable: bool,
) -> (OutputHandle, HandleParts) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (state_tx, state_rx) = watch::channel(initial_state);
    let (status_tx, status_rx) = watch::channel(initial_status);
    let (dimming_tx, dimming_rx) = if dimmable {
        let (tx, rx) = watch::channel(0);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    let handle = OutputHandle {
        name,
        label,
        kind,
        persisted,
        has_feedback,
        cmd: cmd_tx,
        state: state_rx,
        status: status_rx,
        dimming: dimming_rx,
    };
    let parts = HandleParts {
        cmd_rx,
        state_tx,
        status_tx,
        dimming_tx,
    };
    (handle, parts)
}
