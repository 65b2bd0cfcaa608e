//!Parsing of the pins.conf channel list. Each line declares one channel:
//!
//!```text
//!relay /run/io-ext/1/relay_1 1
//!pwm /sys/class/pwm/pwmchip0/pwm0/duty_cycle 1
//!output /run/io-ext/1/output_3 3
//!```
//!
//!A `relay` path is a prefix: the directory is listed and every entry
//!starting with the basename belongs to the channel (set/reset/feedback
//!lines). An `output` path names a directory with a `value` file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use switchd_core::BuildError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Relay,
    Pwm,
    Output,
}

#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub kind: ChannelKind,
    pub id: String,
    pub name: String,
    pub label: String,
    pub paths: Vec<PathBuf>,
}

pub fn parse_pins_conf(path: &Path) -> Result<Vec<ChannelDescriptor>, BuildError> {
    let text = fs::read_to_string(path).map_err(|err| {
        BuildError::from_string(format!("cannot read config {}: {}", path.display(), err))
    })?;
    parse_lines(&text, &expand_relay_paths)
}

fn parse_lines(
    text: &str,
    expand: &dyn Fn(&str) -> io::Result<Vec<PathBuf>>,
) -> Result<Vec<ChannelDescriptor>, BuildError> {
    let mut channels = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [cmd, pth, id] = fields.as_slice() else {
            return Err(BuildError::from_string(format!(
                "malformed config line {}: {:?}",
                lineno + 1,
                raw
            )));
        };
        let descriptor = match *cmd {
            "relay" => ChannelDescriptor {
                kind: ChannelKind::Relay,
                id: id.to_string(),
                name: format!("relay_{}", id),
                label: format!("Relay {}", id),
                paths: expand(pth).map_err(|err| {
                    BuildError::from_string(format!("cannot expand relay path {}: {}", pth, err))
                })?,
            },
            "pwm" => ChannelDescriptor {
                kind: ChannelKind::Pwm,
                id: id.to_string(),
                name: format!("pwm_{}", id),
                label: format!("PWM {}", id),
                paths: vec![PathBuf::from(pth)],
            },
            "output" => ChannelDescriptor {
                kind: ChannelKind::Output,
                id: id.to_string(),
                name: format!("output_{}", id),
                label: format!("Output {}", id),
                paths: vec![Path::new(pth).join("value")],
            },
            other => {
                warn!("unknown config directive {:?} on line {}, skipped", other, lineno + 1);
                continue;
            }
        };
        channels.push(descriptor);
    }
    Ok(channels)
}

///List the prefix path's directory for entries belonging to this channel.
fn expand_relay_paths(prefix: &str) -> io::Result<Vec<PathBuf>> {
    let prefix = Path::new(prefix);
    let dir = prefix.parent().unwrap_or(Path::new("."));
    let base = prefix
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&base) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}
