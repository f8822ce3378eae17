//! Persistent driver settings
//!
//! The driver remembers the last station, the tone settings and the seek
//! mode across sessions through a [`SettingsStore`]. Two stores ship with
//! the crate: [`MemorySettings`] for tests and embedding, and
//! [`JsonFileSettings`], a JSON file under the user's config directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DriverError;

/// Keys written by the driver
pub mod keys {
    pub const SEEK_ALL: &str = "seek_all";
    pub const FREQUENCY: &str = "frequency";
    pub const BAND: &str = "band";
    pub const SUBCHANNEL: &str = "subchannel";
    pub const VOLUME: &str = "volume";
    pub const BASS: &str = "bass";
    pub const TREBLE: &str = "treble";
}

/// Typed key/value storage
pub trait SettingsStore: Send + Sync {
    fn get_int(&self, key: &str, default: i32) -> i32;
    fn get_string(&self, key: &str, default: &str) -> String;
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn put_int(&self, key: &str, value: i32);
    fn put_string(&self, key: &str, value: &str);
    fn put_bool(&self, key: &str, value: bool);

    /// Make earlier puts durable
    fn flush(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

type ValueMap = BTreeMap<String, Value>;

fn get_int(map: &ValueMap, key: &str, default: i32) -> i32 {
    map.get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(default)
}

fn get_string(map: &ValueMap, key: &str, default: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn get_bool(map: &ValueMap, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// In-memory settings
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<ValueMap>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, ValueMap> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettings {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        get_int(&self.map(), key, default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        get_string(&self.map(), key, default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        get_bool(&self.map(), key, default)
    }

    fn put_int(&self, key: &str, value: i32) {
        self.map().insert(key.to_string(), value.into());
    }

    fn put_string(&self, key: &str, value: &str) {
        self.map().insert(key.to_string(), value.into());
    }

    fn put_bool(&self, key: &str, value: bool) {
        self.map().insert(key.to_string(), value.into());
    }
}

/// Settings kept in a JSON object on disk
///
/// Puts are buffered in memory until [`flush`](SettingsStore::flush).
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<ValueMap>,
}

impl JsonFileSettings {
    /// Get the XDG config directory for hdradio
    /// Uses $XDG_CONFIG_HOME/hdradio, falls back to ~/.config/hdradio
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("hdradio"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("hdradio"))
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("radio.json"))
    }

    /// Load from `path`; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| match serde_json::from_str::<ValueMap>(&s) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!("Ignoring malformed settings in {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        debug!("Loaded {} setting(s) from {}", values.len(), path.display());
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map(&self) -> std::sync::MutexGuard<'_, ValueMap> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        get_int(&self.map(), key, default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        get_string(&self.map(), key, default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        get_bool(&self.map(), key, default)
    }

    fn put_int(&self, key: &str, value: i32) {
        self.map().insert(key.to_string(), value.into());
    }

    fn put_string(&self, key: &str, value: &str) {
        self.map().insert(key.to_string(), value.into());
    }

    fn put_bool(&self, key: &str, value: bool) {
        self.map().insert(key.to_string(), value.into());
    }

    fn flush(&self) -> Result<(), DriverError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DriverError::Settings(format!("failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&*self.map())
            .map_err(|e| DriverError::Settings(format!("failed to serialize settings: {}", e)))?;

        std::fs::write(&self.path, json)
            .map_err(|e| DriverError::Settings(format!("failed to write settings: {}", e)))
    }
}
