//!Persistent settings for the switchd daemon. The store is the system of
//!record for per-channel state (non-feedback channels), dimming level,
//!group, custom name, UI visibility and configured type. Every entry is
//!registered with a default and, for numeric entries, an allowed range.
//!High-frequency dimming updates go through the `DimmingWriter` in the
//!`debounce` module instead of writing here directly.

pub mod debounce;

pub use debounce::DimmingWriter;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use switchd_core::BuildError;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Text(String),
}

struct Spec {
    min: Option<i64>,
    max: Option<i64>,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    specs: HashMap<String, Spec>,
    values: HashMap<String, SettingValue>,
    writes: u64,
}

pub type SharedStore = Arc<Mutex<SettingsStore>>;

impl SettingsStore {
    ///Open a store backed by a JSON file, loading any existing values.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let values = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|err| {
                BuildError::from_string(format!(
                    "settings file {} is corrupt: {}",
                    path.display(),
                    err
                ))
            })?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            specs: HashMap::new(),
            values,
            writes: 0,
        })
    }

    ///A store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            specs: HashMap::new(),
            values: HashMap::new(),
            writes: 0,
        }
    }

    ///Declare a key with its default value and, for integers, its range.
    ///An already-persisted value wins over the default.
    pub fn register(
        &mut self,
        key: &str,
        default: SettingValue,
        min: Option<i64>,
        max: Option<i64>,
    ) {
        self.specs.insert(key.to_string(), Spec { min, max });
        self.values.entry(key.to_string()).or_insert(default);
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(SettingValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(SettingValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    ///Update an integer entry. Unregistered keys and out-of-range values
    ///are refused.
    pub fn set_int(&mut self, key: &str, value: i64) -> bool {
        let Some(spec) = self.specs.get(key) else {
            return false;
        };
        if spec.min.is_some_and(|min| value < min) || spec.max.is_some_and(|max| value > max) {
            return false;
        }
        self.values.insert(key.to_string(), SettingValue::Int(value));
        self.save();
        true
    }

    pub fn set_text(&mut self, key: &str, value: &str) -> bool {
        if !self.specs.contains_key(key) {
            return false;
        }
        self.values
            .insert(key.to_string(), SettingValue::Text(value.to_string()));
        self.save();
        true
    }

    ///Durable writes performed so far.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    ///Write the registered defaults through once, after registration.
    pub fn flush_defaults(&mut self) {
        self.save();
    }

    fn save(&mut self) {
        self.writes += 1;
        let Some(path) = &self.path else {
            return;
        };
        match serde_json::to_string_pretty(&self.values) {
            Ok(text) => {
                if let Err(err) = fs::write(path, text) {
                    error!("error writing settings file {}: {}", path.display(), err);
                } else {
                    debug!("settings written to {}", path.display());
                }
            }
            Err(err) => error!("error serializing settings: {}", err),
        }
    }
}
