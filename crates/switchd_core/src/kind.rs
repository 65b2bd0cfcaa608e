//!Output type and function vocabulary, plus the bitmask renderings the bus
//!layer shows for the ValidTypes/ValidFunctions paths.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputType {
    Momentary,
    Latching,
    Dimmable,
}

impl OutputType {
    pub fn code(self) -> u32 {
        match self {
            OutputType::Momentary => 0,
            OutputType::Latching => 1,
            OutputType::Dimmable => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(OutputType::Momentary),
            1 => Some(OutputType::Latching),
            2 => Some(OutputType::Dimmable),
            _ => None,
        }
    }

    pub fn bit(self) -> u32 {
        1 << self.code()
    }

    pub fn text(self) -> &'static str {
        match self {
            OutputType::Momentary => "Momentary",
            OutputType::Latching => "Latching",
            OutputType::Dimmable => "Dimmable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputFunction {
    Alarm,
    GensetStartStop,
    Manual,
    TankPump,
    Temperature,
    ConnectedGensetHelper,
}

impl OutputFunction {
    pub fn code(self) -> u32 {
        match self {
            OutputFunction::Alarm => 0,
            OutputFunction::GensetStartStop => 1,
            OutputFunction::Manual => 2,
            OutputFunction::TankPump => 3,
            OutputFunction::Temperature => 4,
            OutputFunction::ConnectedGensetHelper => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(OutputFunction::Alarm),
            1 => Some(OutputFunction::GensetStartStop),
            2 => Some(OutputFunction::Manual),
            3 => Some(OutputFunction::TankPump),
            4 => Some(OutputFunction::Temperature),
            5 => Some(OutputFunction::ConnectedGensetHelper),
            _ => None,
        }
    }

    pub fn bit(self) -> u32 {
        1 << self.code()
    }

    pub fn text(self) -> &'static str {
        match self {
            OutputFunction::Alarm => "Alarm",
            OutputFunction::GensetStartStop => "Genset start stop",
            OutputFunction::Manual => "Manual",
            OutputFunction::TankPump => "Tank pump",
            OutputFunction::Temperature => "Temperature",
            OutputFunction::ConnectedGensetHelper => "Connected genset helper relay",
        }
    }
}

fn render_mask(mask: u32, order: &[(u32, &'static str)]) -> String {
    let mut out = String::new();
    for (bit, name) in order {
        if mask & bit != 0 {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(name);
        }
    }
    out
}

///Comma-joined names of the set bits, in the fixed order the bus shows them.
pub fn render_type_mask(mask: u32) -> String {
    render_mask(
        mask,
        &[
            (OutputType::Dimmable.bit(), OutputType::Dimmable.text()),
            (OutputType::Latching.bit(), OutputType::Latching.text()),
            (OutputType::Momentary.bit(), OutputType::Momentary.text()),
        ],
    )
}

pub fn render_function_mask(mask: u32) -> String {
    render_mask(
        mask,
        &[
            (OutputFunction::Alarm.bit(), OutputFunction::Alarm.text()),
            (
                OutputFunction::GensetStartStop.bit(),
                OutputFunction::GensetStartStop.text(),
            ),
            (OutputFunction::Manual.bit(), OutputFunction::Manual.text()),
            (OutputFunction::TankPump.bit(), OutputFunction::TankPump.text()),
            (
                OutputFunction::Temperature.bit(),
                OutputFunction::Temperature.text(),
            ),
            (
                OutputFunction::ConnectedGensetHelper.bit(),
                OutputFunction::ConnectedGensetHelper.text(),
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for t in [OutputType::Momentary, OutputType::Latching, OutputType::Dimmable] {
            assert_eq!(OutputType::from_code(t.code()), Some(t));
        }
        assert_eq!(OutputType::from_code(3), None);
    }

    #[test]
    fn type_mask_rendering() {
        assert_eq!(render_type_mask(OutputType::Dimmable.bit()), "Dimmable");
        assert_eq!(
            render_type_mask(OutputType::Latching.bit() | OutputType::Momentary.bit()),
            "Latching, Momentary"
        );
        assert_eq!(render_type_mask(0), "");
    }

    #[test]
    fn function_mask_rendering() {
        assert_eq!(render_function_mask(OutputFunction::Manual.bit()), "Manual");
        assert_eq!(
            render_function_mask(
                OutputFunction::Alarm.bit()
                    | OutputFunction::TankPump.bit()
                    | OutputFunction::ConnectedGensetHelper.bit()
            ),
            "Alarm, Tank pump, Connected genset helper relay"
        );
    }
}
