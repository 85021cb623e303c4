// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plugin settings, their migration and their persistence.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, StoreError};
use crate::types::{DeviceEndpoint, ProtocolParams};

/// Current settings schema version.
pub const SETTINGS_VERSION: u32 = 2;

/// First schema version with a `protocol` field. Older settings were
/// written by the Tuya-only plugin.
pub const PROTOCOL_INTRODUCED_IN: u32 = 2;

/// Settings as the host stores them.
///
/// Unknown keys are ignored and missing keys take their defaults.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::plugin::PluginSettings;
///
/// let settings: PluginSettings =
///     serde_json::from_str(r#"{"address": "192.168.1.50"}"#).unwrap();
/// assert_eq!(settings.protocol, "tasmota");
/// assert_eq!(settings.version, "3.3");
/// assert!(settings.endpoint().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// `tasmota` or `tuya`.
    pub protocol: String,
    /// Host or IP address of the outlet.
    pub address: String,
    /// HTTP basic auth user (Tasmota).
    pub tasmota_username: String,
    /// HTTP basic auth password (Tasmota).
    pub tasmota_password: String,
    /// Device identifier (Tuya).
    pub device_id: String,
    /// Local key (Tuya).
    pub local_key: String,
    /// Protocol version (Tuya).
    pub version: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            protocol: "tasmota".to_string(),
            address: String::new(),
            tasmota_username: String::new(),
            tasmota_password: String::new(),
            device_id: String::new(),
            local_key: String::new(),
            version: "3.3".to_string(),
        }
    }
}

impl fmt::Debug for PluginSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSettings")
            .field("protocol", &self.protocol)
            .field("address", &self.address)
            .field("tasmota_username", &self.tasmota_username)
            .field("device_id", &self.device_id)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl PluginSettings {
    /// Upgrades settings written under schema `current` to `target`.
    ///
    /// Settings older than [`PROTOCOL_INTRODUCED_IN`], or without a version
    /// at all, came from the Tuya-only plugin, so the protocol is forced to
    /// `tuya`. Returns true if anything changed.
    pub fn migrate(&mut self, target: u32, current: Option<u32>) -> bool {
        let predates_protocol = current.is_none_or(|v| v < PROTOCOL_INTRODUCED_IN);
        if predates_protocol && target >= PROTOCOL_INTRODUCED_IN {
            tracing::info!(?current, target, "Migrating settings, protocol set to tuya");
            self.protocol = "tuya".to_string();
            return true;
        }
        false
    }

    /// Applies a partial update, as sent by a settings dialog.
    ///
    /// Keys not present in `patch` keep their value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Malformed` if `patch` is not an object or a value
    /// has the wrong type.
    pub fn merge(&mut self, patch: &Value) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::Malformed(serde::de::Error::custom(
                "settings update must be a JSON object",
            )));
        };
        let mut current = serde_json::to_value(&*self)?;
        if let Value::Object(fields) = &mut current {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Returns the protocol parameters.
    #[must_use]
    pub fn params(&self) -> ProtocolParams {
        ProtocolParams {
            username: self.tasmota_username.clone(),
            password: self.tasmota_password.clone(),
            timeout: None,
            device_id: self.device_id.clone(),
            local_key: self.local_key.clone(),
            version: self.version.clone(),
        }
    }

    /// Validates the settings into an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown protocol or a missing field.
    pub fn endpoint(&self) -> Result<DeviceEndpoint, ConfigError> {
        DeviceEndpoint::from_params(&self.protocol, &self.address, &self.params())
    }
}

/// Settings plus the schema version they were written under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    /// Schema version; absent in settings written before versioning.
    #[serde(
        rename = "_config_version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<u32>,
    /// The settings.
    #[serde(flatten)]
    pub settings: PluginSettings,
}

impl StoredSettings {
    /// Wraps settings at the current schema version.
    #[must_use]
    pub fn current(settings: PluginSettings) -> Self {
        Self {
            version: Some(SETTINGS_VERSION),
            settings,
        }
    }
}

/// Persistence for plugin settings.
pub trait SettingsStore: Send + Sync {
    /// Loads the stored settings; `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the settings exist but cannot be read.
    fn load(&self) -> Result<Option<StoredSettings>, StoreError>;

    /// Replaces the stored settings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the settings cannot be written.
    fn save(&self, stored: &StoredSettings) -> Result<(), StoreError>;
}

/// Settings kept as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Creates a store backed by `path`. Nothing is read until [`load`].
    ///
    /// [`load`]: SettingsStore::load
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Option<StoredSettings>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No settings file found at {}, using defaults", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let stored = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded settings from {}", self.path.display());
        Ok(Some(stored))
    }

    fn save(&self, stored: &StoredSettings) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let contents = serde_json::to_string_pretty(stored)?;
        fs::write(&self.path, contents).map_err(|e| self.io_error(e))?;
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// Settings kept in memory, for hosts that persist them elsewhere.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    stored: Mutex<Option<StoredSettings>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `stored`.
    #[must_use]
    pub fn with_settings(stored: StoredSettings) -> Self {
        Self {
            stored: Mutex::new(Some(stored)),
        }
    }

    /// Returns a copy of what is stored.
    #[must_use]
    pub fn snapshot(&self) -> Option<StoredSettings> {
        self.stored.lock().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<StoredSettings>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, stored: &StoredSettings) -> Result<(), StoreError> {
        *self.stored.lock() = Some(stored.clone());
        Ok(())
    }
}
