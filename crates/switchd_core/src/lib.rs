//!Core library for the switchd daemon: the raw control-file protocol, the
//!status vocabulary shared with the bus layer, and the switchable output
//!variants with their confirmation logic. The bus surface and persistence
//!live in the other workspace crates and depend on this one.

pub mod channel;
pub mod error;
pub mod kind;
pub mod output;
pub mod status;

pub use channel::{FsChannel, MemChannel, RawChannel};
pub use error::BuildError;
pub use kind::{OutputFunction, OutputType};
pub use output::{BistableRelay, OutputHandle, PwmOutput, RelayConfig, SwitchOutput};
pub use status::{derive_status, ModuleState, Status, WriteOutcome};
