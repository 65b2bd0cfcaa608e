//!The status vocabulary shared with the bus layer, and the single pure
//!function that maps an operation's outcome to a reportable status.

use serde::Serialize;

///Per-channel status codes. The full table exists for the bus layer's
///text rendering; this daemon's own logic only ever produces Off, On,
///OutputFault and Disabled. Tripped, OverTemperature, Powered and
///ShortFault are reserved for collaborator-reported conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Off,
    Powered,
    Tripped,
    OverTemperature,
    OutputFault,
    On,
    ShortFault,
    Disabled,
}

impl Status {
    pub fn code(self) -> u32 {
        match self {
            Status::Off => 0x00,
            Status::Powered => 0x01,
            Status::Tripped => 0x02,
            Status::OverTemperature => 0x04,
            Status::OutputFault => 0x08,
            Status::On => 0x09,
            Status::ShortFault => 0x10,
            Status::Disabled => 0x20,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Status::Off => "Off",
            Status::Powered => "Powered",
            Status::Tripped => "Tripped",
            Status::OverTemperature => "Over temperature",
            Status::OutputFault => "Output fault",
            Status::On => "On",
            Status::ShortFault => "Short fault",
            Status::Disabled => "Disabled",
        }
    }
}

///Module-level state codes published at the device level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleState {
    Connected,
    OverTemperature,
    TemperatureWarning,
    ChannelFault,
    ChannelTripped,
    UnderVoltage,
}

impl ModuleState {
    pub fn code(self) -> u32 {
        match self {
            ModuleState::Connected => 0x100,
            ModuleState::OverTemperature => 0x101,
            ModuleState::TemperatureWarning => 0x102,
            ModuleState::ChannelFault => 0x103,
            ModuleState::ChannelTripped => 0x104,
            ModuleState::UnderVoltage => 0x105,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ModuleState::Connected => "Connected",
            ModuleState::OverTemperature => "Over temperature",
            ModuleState::TemperatureWarning => "Temperature warning",
            ModuleState::ChannelFault => "Channel fault",
            ModuleState::ChannelTripped => "Channel tripped",
            ModuleState::UnderVoltage => "Under voltage",
        }
    }
}

///Outcome of a physical actuation, as seen by the output that performed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    ///The write (or a confirmed relay pulse) landed, output is on/off.
    Wrote { on: bool },
    ///The write failed with an I/O error.
    Failed,
    ///A relay pulse was issued but feedback never confirmed it within the
    ///retry budget.
    Unconfirmed,
    ///The channel has no hardware backing.
    Unbacked,
}

///Status is always derived through here; outputs never pick a status code
///directly.
pub fn derive_status(outcome: WriteOutcome) -> Status {
    match outcome {
        WriteOutcome::Wrote { on: true } => Status::On,
        WriteOutcome::Wrote { on: false } => Status::Off,
        WriteOutcome::Failed => Status::OutputFault,
        WriteOutcome::Unconfirmed => Status::OutputFault,
        WriteOutcome::Unbacked => Status::Disabled,
    }
}
