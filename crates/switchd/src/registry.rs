//!Builds the output instances from the parsed channel descriptors. The
//!variant for a relay channel follows from its path set: a lone set
//!actuator is a plain switch output, set plus reset is a bistable relay,
//!anything else is dropped.

use crate::config::{ChannelDescriptor, ChannelKind};
use std::path::PathBuf;
use switchd_core::{
    BistableRelay, BuildError, FsChannel, OutputHandle, PwmOutput, RelayConfig, SwitchOutput,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Registry {
    pub outputs: Vec<OutputHandle>,
    pub tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug, Default, PartialEq)]
pub struct RelayPathSet {
    pub set: Option<PathBuf>,
    pub reset: Option<PathBuf>,
    pub feedback: Option<PathBuf>,
}

///Sorts a relay channel's paths into actuator and feedback roles: `_in`
///is the feedback line, `_res` the reset actuator, `_set` or the bare
///channel id the set actuator. Later paths win on a conflict.
pub fn classify_relay_paths(id: &str, paths: &[PathBuf]) -> RelayPathSet {
    let mut roles = RelayPathSet::default();
    for path in paths {
        let text = path.to_string_lossy();
        if text.ends_with("_in") {
            roles.feedback = Some(path.clone());
        }
        if text.ends_with("_res") {
            roles.reset = Some(path.clone());
        }
        if text.ends_with("_set") || text.ends_with(id) {
            roles.set = Some(path.clone());
        }
    }
    roles
}

pub fn build(descriptors: &[ChannelDescriptor]) -> Result<Registry, BuildError> {
    let mut outputs = Vec::new();
    let mut tasks = Vec::new();

    for desc in descriptors {
        match desc.kind {
            ChannelKind::Relay => {
                let roles = classify_relay_paths(&desc.id, &desc.paths);
                match roles {
                    //bistable relay, pulsed set/reset lines
                    RelayPathSet {
                        set: Some(set),
                        reset: Some(reset),
                        feedback,
                    } => {
                        let relay = BistableRelay::try_build(RelayConfig {
                            name: desc.name.clone(),
                            label: desc.label.clone(),
                            set: FsChannel::new(set.join("value")),
                            reset: FsChannel::new(reset.join("value")),
                            feedback: feedback.map(|p| FsChannel::new(p.join("value"))),
                        })?;
                        info!("channel {}: bistable relay", desc.name);
                        outputs.push(relay.handle);
                        tasks.push(relay.join_handle);
                    }
                    //monostable relay, one held set line
                    RelayPathSet {
                        set: Some(set),
                        reset: None,
                        feedback,
                    } => {
                        let out = SwitchOutput::spawn(
                            &desc.name,
                            &desc.label,
                            FsChannel::new(set.join("value")),
                            feedback.is_some(),
                        );
                        info!("channel {}: switch output", desc.name);
                        outputs.push(out.handle);
                        tasks.push(out.join_handle);
                    }
                    _ => {
                        warn!("channel {} has no usable actuator paths, dropped", desc.name);
                    }
                }
            }
            ChannelKind::Pwm => {
                let Some(path) = desc.paths.first() else {
                    warn!("channel {} has no path, dropped", desc.name);
                    continue;
                };
                let out = PwmOutput::spawn(&desc.name, &desc.label, FsChannel::new(path));
                info!("channel {}: pwm output", desc.name);
                outputs.push(out.handle);
                tasks.push(out.join_handle);
            }
            ChannelKind::Output => {
                let Some(path) = desc.paths.first() else {
                    warn!("channel {} has no path, dropped", desc.name);
                    continue;
                };
                let out = SwitchOutput::spawn(&desc.name, &desc.label, FsChannel::new(path), false);
                info!("channel {}: switch output", desc.name);
                outputs.push(out.handle);
                tasks.push(out.join_handle);
            }
        }
    }

    Ok(Registry { outputs, tasks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use switchd_core::{OutputType, Status};

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn classifies_bistable_relay_paths() {
        let roles = classify_relay_paths(
            "1",
            &paths(&["/io/relay_1_in", "/io/relay_1_res", "/io/relay_1_set"]),
        );
        assert_eq!(roles.set, Some(PathBuf::from("/io/relay_1_set")));
        assert_eq!(roles.reset, Some(PathBuf::from("/io/relay_1_res")));
        assert_eq!(roles.feedback, Some(PathBuf::from("/io/relay_1_in")));
    }

    #[test]
    fn bare_channel_id_is_a_set_actuator() {
        let roles = classify_relay_paths("2", &paths(&["/io/relay_2"]));
        assert_eq!(roles.set, Some(PathBuf::from("/io/relay_2")));
        assert_eq!(roles.reset, None);
        assert_eq!(roles.feedback, None);
    }

    #[test]
    fn unusable_combinations_have_no_set() {
        //feedback and reset without a set actuator
        let roles = classify_relay_paths("3", &paths(&["/io/relay_3_in", "/io/relay_3_res"]));
        assert_eq!(roles.set, None);
    }

    #[tokio::test]
    async fn builds_outputs_from_descriptors() {
        let dir = std::env::temp_dir().join(format!("switchd-reg-{}", std::process::id()));
        for sub in [
            "relay_1_set",
            "relay_1_res",
            "relay_1_in",
            "relay_2",
            "relay_4",
            "relay_4_in",
            "output_3",
        ] {
            fs::create_dir_all(dir.join(sub)).unwrap();
        }
        fs::write(dir.join("relay_1_in/value"), "1").unwrap();

        let descriptors = vec![
            ChannelDescriptor {
                kind: ChannelKind::Relay,
                id: "1".to_string(),
                name: "relay_1".to_string(),
                label: "Relay 1".to_string(),
                paths: vec![
                    dir.join("relay_1_in"),
                    dir.join("relay_1_res"),
                    dir.join("relay_1_set"),
                ],
            },
            ChannelDescriptor {
                kind: ChannelKind::Relay,
                id: "2".to_string(),
                name: "relay_2".to_string(),
                label: "Relay 2".to_string(),
                paths: vec![dir.join("relay_2")],
            },
            ChannelDescriptor {
                kind: ChannelKind::Relay,
                id: "9".to_string(),
                name: "relay_9".to_string(),
                label: "Relay 9".to_string(),
                paths: vec![],
            },
            ChannelDescriptor {
                kind: ChannelKind::Relay,
                id: "4".to_string(),
                name: "relay_4".to_string(),
                label: "Relay 4".to_string(),
                paths: vec![dir.join("relay_4"), dir.join("relay_4_in")],
            },
            ChannelDescriptor {
                kind: ChannelKind::Output,
                id: "3".to_string(),
                name: "output_3".to_string(),
                label: "Output 3".to_string(),
                paths: vec![dir.join("output_3/value")],
            },
        ];

        let registry = build(&descriptors).unwrap();
        //relay_9 had no usable paths and was dropped
        assert_eq!(registry.outputs.len(), 4);

        let relay = &registry.outputs[0];
        assert_eq!(relay.name(), "relay_1");
        assert!(relay.has_feedback());
        assert!(!relay.persisted());
        //ground truth read from the feedback line at construction
        assert_eq!(relay.state(), 1);
        assert_eq!(relay.status(), Status::On);
        //both actuator lines were cleared at startup
        assert_eq!(fs::read_to_string(dir.join("relay_1_set/value")).unwrap(), "0");
        assert_eq!(fs::read_to_string(dir.join("relay_1_res/value")).unwrap(), "0");

        let mono = &registry.outputs[1];
        assert_eq!(mono.name(), "relay_2");
        assert_eq!(mono.kind(), OutputType::Latching);
        assert!(!mono.has_feedback());
        assert!(mono.persisted());

        //a monostable relay with a feedback line reports it and skips
        //persistence, like the bistable case
        let mono_fb = &registry.outputs[2];
        assert_eq!(mono_fb.name(), "relay_4");
        assert!(mono_fb.has_feedback());
        assert!(!mono_fb.persisted());

        let plain = &registry.outputs[3];
        assert_eq!(plain.name(), "output_3");
        assert!(!plain.has_feedback());
        assert!(plain.persisted());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn unreadable_feedback_is_fatal() {
        let dir = std::env::temp_dir().join(format!("switchd-reg-bad-{}", std::process::id()));
        for sub in ["relay_1_set", "relay_1_res", "relay_1_in"] {
            fs::create_dir_all(dir.join(sub)).unwrap();
        }
        //no value file inside relay_1_in

        let descriptors = vec![ChannelDescriptor {
            kind: ChannelKind::Relay,
            id: "1".to_string(),
            name: "relay_1".to_string(),
            label: "Relay 1".to_string(),
            paths: vec![
                dir.join("relay_1_in"),
                dir.join("relay_1_res"),
                dir.join("relay_1_set"),
            ],
        }];

        assert!(build(&descriptors).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
