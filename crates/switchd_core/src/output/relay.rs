//!Bistable (latching) relay output. The relay is driven by a momentary
//!pulse on a set or reset line, so a write proves nothing by itself: the
//!task runs a bounded feedback-polling cycle to turn the uncertain
//!actuation into a definite status, or falls back to a blind timed
//!assumption when the channel has no feedback line.

use super::{make_handle, publish, Command, OutputHandle};
use crate::channel::RawChannel;
use crate::error::BuildError;
use crate::kind::OutputType;
use crate::status::{derive_status, Status, WriteOutcome};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, warn};

///Total confirmation budget for one pulse.
pub const PULSE_LEN: Duration = Duration::from_millis(2000);
///Feedback poll interval within the budget.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(100);
///PULSE_LEN / CHECK_INTERVAL.
pub const MAX_ATTEMPTS: u32 = 20;

pub struct RelayConfig<C> {
    pub name: String,
    pub label: String,
    pub set: C,
    pub reset: C,
    pub feedback: Option<C>,
}

pub struct BistableRelay {
    pub join_handle: JoinHandle<()>,
    pub handle: OutputHandle,
}

///The single in-flight confirmation cycle. Replacing it is the only form
///of cancellation; at most one exists per relay.
enum Pending {
    Poll {
        desired: bool,
        retries: u32,
        at: Instant,
    },
    Blind {
        desired: bool,
        at: Instant,
    },
}

impl Pending {
    fn at(&self) -> Instant {
        match self {
            Pending::Poll { at, .. } | Pending::Blind { at, .. } => *at,
        }
    }
}

struct RelayTask<C> {
    name: String,
    set: C,
    reset: C,
    feedback: Option<C>,
    pending: Option<Pending>,
    state_tx: watch::Sender<i64>,
    status_tx: watch::Sender<Status>,
}

impl<C: RawChannel> RelayTask<C> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.pending.as_ref().map(Pending::at);
            tokio::select! {
                biased;
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick();
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::SetState(desired)) => self.request(desired),
                    Some(Command::SetDimming(_)) => {}
                    None => break,
                },
            }
        }
        debug!("bistable relay {} shutting down", self.name);
    }

    fn request(&mut self, desired: bool) {
        //newest request wins: drop any in-flight confirmation cycle before
        //pulsing again
        self.pending = None;
        let line = if desired { &self.set } else { &self.reset };
        if let Err(err) = line.write(1) {
            error!("error pulsing relay {}: {}", self.name, err);
            return;
        }
        //the logical state follows the request immediately; only status
        //reflects the confirmation outcome
        publish(&self.state_tx, i64::from(desired));
        self.pending = Some(if self.feedback.is_some() {
            Pending::Poll {
                desired,
                retries: 0,
                at: Instant::now() + CHECK_INTERVAL,
            }
        } else {
            Pending::Blind {
                desired,
                at: Instant::now() + PULSE_LEN,
            }
        });
    }

    fn tick(&mut self) {
        match self.pending.take() {
            Some(Pending::Poll { desired, retries, at }) => {
                let retries = retries + 1;
                let confirmed = match self.feedback.as_ref().map(RawChannel::read) {
                    Some(Ok(value)) => (value != 0) == desired,
                    Some(Err(err)) => {
                        warn!("error reading relay {} feedback: {}", self.name, err);
                        false
                    }
                    None => false,
                };
                if confirmed {
                    self.resolve(WriteOutcome::Wrote { on: desired });
                } else if retries >= MAX_ATTEMPTS {
                    self.resolve(WriteOutcome::Unconfirmed);
                } else {
                    self.pending = Some(Pending::Poll {
                        desired,
                        retries,
                        at: at + CHECK_INTERVAL,
                    });
                }
            }
            Some(Pending::Blind { desired, .. }) => {
                //no feedback line: assume the pulse worked, there is no way
                //to detect failure here
                self.resolve(WriteOutcome::Wrote { on: desired });
            }
            None => {}
        }
    }

    fn resolve(&mut self, outcome: WriteOutcome) {
        publish(&self.status_tx, derive_status(outcome));
        self.release_lines();
    }

    ///Both actuator lines return to 0 whatever the outcome; the coil must
    ///not stay energized.
    fn release_lines(&self) {
        for line in [&self.set, &self.reset] {
            if let Err(err) = line.write(0) {
                error!("error releasing relay {} line: {}", self.name, err);
            }
        }
    }
}

impl BistableRelay {
    pub fn try_build<C: RawChannel + Send + 'static>(
        cfg: RelayConfig<C>,
    ) -> Result<Self, BuildError> {
        //a feedback relay must start from known ground truth
        let initial = match &cfg.feedback {
            Some(fb) => {
                fb.read().map_err(|err| {
                    BuildError::from_string(format!(
                        "relay {} feedback is unreadable: {}",
                        cfg.name, err
                    ))
                })? != 0
            }
            None => false,
        };
        let has_feedback = cfg.feedback.is_some();
        let initial_status = if has_feedback {
            derive_status(WriteOutcome::Wrote { on: initial })
        } else {
            derive_status(WriteOutcome::Unbacked)
        };

        let (handle, parts) = make_handle(
            cfg.name.clone(),
            cfg.label.clone(),
            OutputType::Latching,
            !has_feedback,
            has_feedback,
            i64::from(initial),
            initial_status,
            false,
        );

        let task = RelayTask {
            name: cfg.name,
            set: cfg.set,
            reset: cfg.reset,
            feedback: cfg.feedback,
            pending: None,
            state_tx: parts.state_tx,
            status_tx: parts.status_tx,
        };
        task.release_lines();

        let join_handle = tokio::spawn(task.run(parts.cmd_rx));
        Ok(BistableRelay { join_handle, handle })
    }
}
