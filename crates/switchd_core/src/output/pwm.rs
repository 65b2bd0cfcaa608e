//!Dimmable (PWM) output: one duty-cycle write path gated by a power state.

use super::{make_handle, publish, Command, OutputHandle};
use crate::channel::RawChannel;
use crate::kind::OutputType;
use crate::status::{derive_status, Status, WriteOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub struct PwmOutput {
    pub join_handle: JoinHandle<()>,
    pub handle: OutputHandle,
}

struct PwmTask<C> {
    name: String,
    channel: C,
    dimming: u8,
    on: bool,
}

impl<C: RawChannel> PwmTask<C> {
    ///Raw duty written to the hardware: round(dimming * 2.55) while
    ///powered, 0 otherwise.
    fn duty(&self, on: bool) -> i64 {
        if on {
            (f64::from(self.dimming) * 2.55).round() as i64
        } else {
            0
        }
    }

    fn apply_state(
        &mut self,
        on: bool,
        state_tx: &tokio::sync::watch::Sender<i64>,
        status_tx: &tokio::sync::watch::Sender<Status>,
    ) {
        match self.channel.write(self.duty(on)) {
            Ok(()) => {
                self.on = on;
                publish(state_tx, i64::from(on));
                publish(status_tx, derive_status(WriteOutcome::Wrote { on }));
            }
            Err(err) => {
                error!("error writing pwm output {}: {}", self.name, err);
                publish(status_tx, derive_status(WriteOutcome::Failed));
            }
        }
    }
}

impl PwmOutput {
    pub fn spawn<C: RawChannel + Send + 'static>(
        name: &str,
        label: &str,
        channel: C,
    ) -> Self {
        let (handle, mut parts) = make_handle(
            name.to_string(),
            label.to_string(),
            OutputType::Dimmable,
            true,
            false,
            0,
            Status::Disabled,
            true,
        );

        let mut task = PwmTask {
            name: name.to_string(),
            channel,
            dimming: 0,
            on: false,
        };
        let dimming_tx = parts.dimming_tx.take();

        let join_handle = tokio::spawn(async move {
            while let Some(cmd) = parts.cmd_rx.recv().await {
                match cmd {
                    Command::SetState(on) => {
                        task.apply_state(on, &parts.state_tx, &parts.status_tx);
                    }
                    Command::SetDimming(value) => {
                        task.dimming = value;
                        if let Some(ref tx) = dimming_tx {
                            publish(tx, i64::from(value));
                        }
                        //a powered output follows the new level immediately
                        if task.on {
                            task.apply_state(true, &parts.state_tx, &parts.status_tx);
                        }
                    }
                }
            }
            debug!("pwm output {} shutting down", task.name);
        });

        PwmOutput { join_handle, handle }
    }
}
