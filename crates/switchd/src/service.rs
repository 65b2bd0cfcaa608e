//!The bus-facing surface. Holds the built outputs, owns their settings
//!registrations and the dimming writer, validates external write requests
//!against the per-channel masks, and publishes the per-channel model the
//!bus layer renders.

use serde::Serialize;
use std::collections::HashMap;
use switchd_core::{
    kind::{render_function_mask, render_type_mask},
    ModuleState, OutputFunction, OutputHandle, OutputType,
};
use switchd_store::{DimmingWriter, SettingValue, SharedStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const PRODUCT_NAME: &str = "GX IO extender 150";
pub const PRODUCT_ID: u32 = 0xC01A;

fn state_key(name: &str) -> String {
    format!("state_{}", name)
}
fn dimming_key(name: &str) -> String {
    format!("dimming_{}", name)
}
fn type_key(name: &str) -> String {
    format!("type_{}", name)
}
fn group_key(name: &str) -> String {
    format!("group_{}", name)
}
fn custom_name_key(name: &str) -> String {
    format!("customname_{}", name)
}
fn show_ui_key(name: &str) -> String {
    format!("showuicontrol_{}", name)
}

pub struct Service {
    serial: String,
    outputs: Vec<OutputHandle>,
    //per-instance, deliberately not shared across devices
    functions: HashMap<String, OutputFunction>,
    store: SharedStore,
    writer: DimmingWriter,
}

impl Service {
    pub fn new(serial: &str, outputs: Vec<OutputHandle>, store: SharedStore) -> Self {
        let mut functions = HashMap::new();
        {
            let mut s = store.lock().expect("settings store lock");
            s.register("customname", SettingValue::Text(PRODUCT_NAME.to_string()), None, None);
            for out in &outputs {
                let name = out.name();
                s.register(&custom_name_key(name), SettingValue::Text(String::new()), None, None);
                s.register(
                    &type_key(name),
                    SettingValue::Int(i64::from(out.kind().code())),
                    Some(0),
                    Some(2),
                );
                s.register(&group_key(name), SettingValue::Text(String::new()), None, None);
                s.register(&show_ui_key(name), SettingValue::Int(1), Some(0), Some(1));
                if out.persisted() {
                    s.register(&state_key(name), SettingValue::Int(0), Some(0), Some(1));
                }
                if out.dimming().is_some() {
                    s.register(&dimming_key(name), SettingValue::Int(0), Some(0), Some(100));
                }
                functions.insert(name.to_string(), OutputFunction::Manual);
            }
            s.flush_defaults();
        }

        //persist logical state as the output tasks publish it, so a failed
        //hardware write never lands in the store
        for out in &outputs {
            if !out.persisted() {
                continue;
            }
            let key = state_key(out.name());
            let mut state = out.watch_state();
            let store = store.clone();
            tokio::spawn(async move {
                while state.changed().await.is_ok() {
                    let value = *state.borrow();
                    let mut store = store.lock().expect("settings store lock");
                    if store.get_int(&key) != Some(value) {
                        store.set_int(&key, value);
                    }
                }
            });
        }

        let writer = DimmingWriter::spawn(store.clone());
        Service {
            serial: serial.to_string(),
            outputs,
            functions,
            store,
            writer,
        }
    }

    fn output(&self, name: &str) -> Option<&OutputHandle> {
        self.outputs.iter().find(|out| out.name() == name)
    }

    ///Apply stored state and dimming to every channel that persists them.
    ///Feedback channels already hold their hardware-derived state.
    pub async fn restore(&self) {
        for out in &self.outputs {
            if !out.persisted() {
                continue;
            }
            if out.dimming().is_some() {
                let stored = {
                    let s = self.store.lock().expect("settings store lock");
                    s.get_int(&dimming_key(out.name())).unwrap_or(0)
                };
                if !out.set_dimming(stored).await {
                    warn!("stored dimming {} for {} was rejected", stored, out.name());
                }
            }
            let stored = {
                let s = self.store.lock().expect("settings store lock");
                s.get_int(&state_key(out.name())).unwrap_or(0)
            };
            if !out.set_state(stored).await {
                warn!("stored state {} for {} was rejected", stored, out.name());
            }
        }
    }

    ///The accepted value reaches the store through the state watch once
    ///the output task has actually written it.
    pub async fn handle_set_state(&self, name: &str, value: i64) -> bool {
        let Some(out) = self.output(name) else {
            return false;
        };
        out.set_state(value).await
    }

    ///Dimming goes to the output immediately but reaches the settings
    ///store only through the debounced writer.
    pub async fn handle_set_dimming(&self, name: &str, value: i64) -> bool {
        let Some(out) = self.output(name) else {
            return false;
        };
        if !out.set_dimming(value).await {
            return false;
        }
        self.writer.record(&dimming_key(name), value).await
    }

    pub fn valid_types(&self, name: &str) -> Option<u32> {
        self.output(name).map(|out| {
            if out.kind() == OutputType::Dimmable {
                OutputType::Dimmable.bit()
            } else {
                OutputType::Latching.bit() | OutputType::Momentary.bit()
            }
        })
    }

    pub fn valid_functions(&self, name: &str) -> Option<u32> {
        self.output(name).map(|_| OutputFunction::Manual.bit())
    }

    pub async fn handle_set_type(&self, name: &str, code: u32) -> bool {
        let Some(mask) = self.valid_types(name) else {
            return false;
        };
        let Some(new_type) = OutputType::from_code(code) else {
            return false;
        };
        if new_type.bit() & mask == 0 {
            return false;
        }
        self.store
            .lock()
            .expect("settings store lock")
            .set_int(&type_key(name), i64::from(code));
        //a momentary output may not stay latched on
        if new_type == OutputType::Momentary {
            self.handle_set_state(name, 0).await;
        }
        true
    }

    pub fn handle_set_function(&mut self, name: &str, code: u32) -> bool {
        let Some(mask) = self.valid_functions(name) else {
            return false;
        };
        let Some(function) = OutputFunction::from_code(code) else {
            return false;
        };
        if function.bit() & mask == 0 {
            return false;
        }
        self.functions.insert(name.to_string(), function);
        true
    }

    pub fn function(&self, name: &str) -> Option<OutputFunction> {
        self.functions.get(name).copied()
    }

    pub fn handle_set_group(&self, name: &str, value: &str) -> bool {
        self.output(name).is_some()
            && self
                .store
                .lock()
                .expect("settings store lock")
                .set_text(&group_key(name), value)
    }

    pub fn handle_set_custom_name(&self, name: &str, value: &str) -> bool {
        self.output(name).is_some()
            && self
                .store
                .lock()
                .expect("settings store lock")
                .set_text(&custom_name_key(name), value)
    }

    pub fn handle_set_show_ui_control(&self, name: &str, value: i64) -> bool {
        self.output(name).is_some()
            && self
                .store
                .lock()
                .expect("settings store lock")
                .set_int(&show_ui_key(name), value)
    }

    pub fn snapshot(&self) -> DeviceModel {
        let store = self.store.lock().expect("settings store lock");
        let channels = self
            .outputs
            .iter()
            .map(|out| {
                let name = out.name();
                let type_code = store
                    .get_int(&type_key(name))
                    .and_then(|code| u32::try_from(code).ok())
                    .unwrap_or(out.kind().code());
                let output_type = OutputType::from_code(type_code).unwrap_or(out.kind());
                let function = self.functions.get(name).copied().unwrap_or(OutputFunction::Manual);
                let valid_types = if out.kind() == OutputType::Dimmable {
                    OutputType::Dimmable.bit()
                } else {
                    OutputType::Latching.bit() | OutputType::Momentary.bit()
                };
                let valid_functions = OutputFunction::Manual.bit();
                ChannelModel {
                    name: name.to_string(),
                    label: out.label().to_string(),
                    state: out.state(),
                    status: out.status().code(),
                    status_text: out.status().text(),
                    dimming: out.dimming(),
                    output_type: output_type.code(),
                    type_text: output_type.text(),
                    function: function.code(),
                    function_text: function.text(),
                    group: store.get_text(&group_key(name)).unwrap_or_default().to_string(),
                    custom_name: store
                        .get_text(&custom_name_key(name))
                        .unwrap_or_default()
                        .to_string(),
                    show_ui_control: store.get_int(&show_ui_key(name)).unwrap_or(1),
                    valid_types,
                    valid_types_text: render_type_mask(valid_types),
                    valid_functions,
                    valid_functions_text: render_function_mask(valid_functions),
                }
            })
            .collect();

        DeviceModel {
            product_name: PRODUCT_NAME,
            product_id: PRODUCT_ID,
            serial: self.serial.clone(),
            custom_name: store.get_text("customname").unwrap_or(PRODUCT_NAME).to_string(),
            state: ModuleState::Connected.code(),
            state_text: ModuleState::Connected.text(),
            channels,
        }
    }

    pub fn snapshot_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_default()
    }

    ///Publish status transitions until cancelled, then flush the dimming
    ///writer so nothing pending is lost at shutdown.
    pub async fn run(self, cancel: CancellationToken) {
        let mut watchers = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            let mut status = out.watch_status();
            let name = out.name().to_string();
            let cancel = cancel.clone();
            watchers.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        changed = status.changed() => match changed {
                            Ok(()) => info!("{} status: {}", name, status.borrow().text()),
                            Err(_) => break,
                        },
                    }
                }
            }));
        }

        cancel.cancelled().await;
        self.writer.shutdown().await;
        for watcher in watchers {
            let _ = watcher.await;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelModel {
    pub name: String,
    pub label: String,
    pub state: i64,
    pub status: u32,
    pub status_text: &'static str,
    pub dimming: Option<i64>,
    pub output_type: u32,
    pub type_text: &'static str,
    pub function: u32,
    pub function_text: &'static str,
    pub group: String,
    pub custom_name: String,
    pub show_ui_control: i64,
    pub valid_types: u32,
    pub valid_types_text: String,
    pub valid_functions: u32,
    pub valid_functions_text: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceModel {
    pub product_name: &'static str,
    pub product_id: u32,
    pub serial: String,
    pub custom_name: String,
    pub state: u32,
    pub state_text: &'static str,
    pub channels: Vec<ChannelModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use switchd_core::{MemChannel, PwmOutput, Status, SwitchOutput};
    use switchd_store::SettingsStore;
    use tokio::time::{sleep, Duration};

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn shared_store() -> SharedStore {
        Arc::new(Mutex::new(SettingsStore::in_memory()))
    }

    fn switch_service(store: &SharedStore) -> (Service, MemChannel) {
        let ch = MemChannel::new(0);
        let out = SwitchOutput::spawn("relay_1", "Relay 1", ch.clone(), false);
        (Service::new("t1", vec![out.handle], store.clone()), ch)
    }

    #[tokio::test]
    async fn set_state_writes_through_to_the_store() {
        let store = shared_store();
        let (service, ch) = switch_service(&store);

        assert!(service.handle_set_state("relay_1", 1).await);
        settle().await;
        assert_eq!(ch.writes(), vec![1]);
        assert_eq!(store.lock().unwrap().get_int("state_relay_1"), Some(1));

        assert!(!service.handle_set_state("relay_1", 2).await);
        assert!(!service.handle_set_state("nope", 1).await);
    }

    #[tokio::test]
    async fn failed_write_is_not_persisted() {
        let store = shared_store();
        let (service, ch) = switch_service(&store);

        ch.fail(true);
        assert!(service.handle_set_state("relay_1", 1).await);
        settle().await;

        //the write faulted and state stayed 0; the store must agree
        let out = service.output("relay_1").unwrap();
        assert_eq!(out.status(), Status::OutputFault);
        assert_eq!(out.state(), 0);
        assert_eq!(store.lock().unwrap().get_int("state_relay_1"), Some(0));

        //the next successful write lands in the store as usual
        ch.fail(false);
        assert!(service.handle_set_state("relay_1", 1).await);
        settle().await;
        assert_eq!(store.lock().unwrap().get_int("state_relay_1"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn dimming_reaches_the_store_after_the_quiet_period() {
        let store = shared_store();
        let ch = MemChannel::new(0);
        let out = PwmOutput::spawn("pwm_1", "PWM 1", ch.clone());
        let service = Service::new("t1", vec![out.handle], store.clone());

        assert!(service.handle_set_dimming("pwm_1", 30).await);
        assert!(service.handle_set_dimming("pwm_1", 60).await);
        settle().await;
        assert_eq!(store.lock().unwrap().get_int("dimming_pwm_1"), Some(0));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.lock().unwrap().get_int("dimming_pwm_1"), Some(60));

        assert!(!service.handle_set_dimming("pwm_1", 101).await);
        assert!(!service.handle_set_dimming("relay_1", 50).await);
    }

    #[tokio::test]
    async fn type_change_to_momentary_resets_state() {
        let store = shared_store();
        let (service, ch) = switch_service(&store);

        assert!(service.handle_set_state("relay_1", 1).await);
        settle().await;

        assert!(service.handle_set_type("relay_1", OutputType::Momentary.code()).await);
        settle().await;
        assert_eq!(ch.writes(), vec![1, 0]);
        let s = store.lock().unwrap();
        assert_eq!(s.get_int("type_relay_1"), Some(0));
        assert_eq!(s.get_int("state_relay_1"), Some(0));
    }

    #[tokio::test]
    async fn type_and_function_writes_are_mask_checked() {
        let store = shared_store();
        let (mut service, _ch) = switch_service(&store);

        assert_eq!(
            service.valid_types("relay_1"),
            Some(OutputType::Latching.bit() | OutputType::Momentary.bit())
        );
        assert!(!service.handle_set_type("relay_1", OutputType::Dimmable.code()).await);
        assert!(service.handle_set_type("relay_1", OutputType::Latching.code()).await);

        assert_eq!(service.valid_functions("relay_1"), Some(OutputFunction::Manual.bit()));
        assert!(!service.handle_set_function("relay_1", OutputFunction::Alarm.code()));
        assert!(service.handle_set_function("relay_1", OutputFunction::Manual.code()));
        assert_eq!(service.function("relay_1"), Some(OutputFunction::Manual));
    }

    #[tokio::test]
    async fn restore_applies_stored_values() {
        let store = shared_store();
        let dim_ch = MemChannel::new(0);
        let sw_ch = MemChannel::new(0);
        let pwm = PwmOutput::spawn("pwm_1", "PWM 1", dim_ch.clone());
        let sw = SwitchOutput::spawn("output_1", "Output 1", sw_ch.clone(), false);
        let service = Service::new("t1", vec![pwm.handle, sw.handle], store.clone());

        {
            let mut s = store.lock().unwrap();
            assert!(s.set_int("dimming_pwm_1", 80));
            assert!(s.set_int("state_pwm_1", 1));
            assert!(s.set_int("state_output_1", 1));
        }

        service.restore().await;
        settle().await;
        assert_eq!(dim_ch.writes(), vec![204]); // round(80 * 2.55)
        assert_eq!(sw_ch.writes(), vec![1]);
    }

    #[tokio::test]
    async fn snapshot_renders_the_published_model() {
        let store = shared_store();
        let (service, _ch) = switch_service(&store);

        assert!(service.handle_set_state("relay_1", 1).await);
        assert!(service.handle_set_group("relay_1", "Deck"));
        assert!(service.handle_set_custom_name("relay_1", "Anchor light"));
        settle().await;

        let device = service.snapshot();
        assert_eq!(device.product_name, PRODUCT_NAME);
        assert_eq!(device.state, 0x100);
        assert_eq!(device.state_text, "Connected");
        assert_eq!(device.channels.len(), 1);

        let ch = &device.channels[0];
        assert_eq!(ch.name, "relay_1");
        assert_eq!(ch.state, 1);
        assert_eq!(ch.status, Status::On.code());
        assert_eq!(ch.status_text, "On");
        assert_eq!(ch.dimming, None);
        assert_eq!(ch.type_text, "Latching");
        assert_eq!(ch.function_text, "Manual");
        assert_eq!(ch.group, "Deck");
        assert_eq!(ch.custom_name, "Anchor light");
        assert_eq!(ch.valid_types_text, "Latching, Momentary");
        assert_eq!(ch.valid_functions_text, "Manual");
    }

    #[tokio::test(start_paused = true)]
    async fn run_flushes_pending_dimming_on_cancel() {
        let store = shared_store();
        let ch = MemChannel::new(0);
        let out = PwmOutput::spawn("pwm_1", "PWM 1", ch.clone());
        let service = Service::new("t1", vec![out.handle], store.clone());

        assert!(service.handle_set_dimming("pwm_1", 42).await);
        settle().await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        service.run(cancel).await;

        //shutdown flushed without waiting out the quiet period
        assert_eq!(store.lock().unwrap().get_int("dimming_pwm_1"), Some(42));
    }
}
