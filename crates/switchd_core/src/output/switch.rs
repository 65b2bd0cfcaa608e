//!Momentary/toggle output: a single write path driven by a held signal.

use super::{make_handle, publish, Command, OutputHandle};
use crate::channel::RawChannel;
use crate::kind::OutputType;
use crate::status::{derive_status, Status, WriteOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub struct SwitchOutput {
    pub join_handle: JoinHandle<()>,
    pub handle: OutputHandle,
}

impl SwitchOutput {
    ///A channel with a feedback line (monostable relays with an `_in`
    ///path) is not persisted; the stored state would be redundant.
    pub fn spawn<C: RawChannel + Send + 'static>(
        name: &str,
        label: &str,
        channel: C,
        has_feedback: bool,
    ) -> Self {
        let (handle, mut parts) = make_handle(
            name.to_string(),
            label.to_string(),
            OutputType::Latching,
            !has_feedback,
            has_feedback,
            0,
            Status::Disabled,
            false,
        );

        let name = name.to_string();
        let join_handle = tokio::spawn(async move {
            while let Some(cmd) = parts.cmd_rx.recv().await {
                match cmd {
                    Command::SetState(on) => {
                        //writes are re-issued even for an unchanged value
                        match channel.write(i64::from(on)) {
                            Ok(()) => {
                                publish(&parts.state_tx, i64::from(on));
                                publish(&parts.status_tx, derive_status(WriteOutcome::Wrote { on }));
                            }
                            Err(err) => {
                                error!("error writing output {}: {}", name, err);
                                publish(&parts.status_tx, derive_status(WriteOutcome::Failed));
                            }
                        }
                    }
                    Command::SetDimming(_) => {}
                }
            }
            debug!("switch output {} shutting down", name);
        });

        SwitchOutput { join_handle, handle }
    }
}
