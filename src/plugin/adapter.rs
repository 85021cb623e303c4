// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Settings lifecycle and PSU control entry points.

use serde_json::Value;
use tracing::{Instrument, Span};

use super::settings::{PluginSettings, SETTINGS_VERSION, SettingsStore, StoredSettings};
use crate::controller::EndpointConnector;
use crate::error::{ConfigError, Result};
use crate::state::PowerStateCache;

/// The plugin as seen by a PSU control host.
///
/// The host calls the `on_settings_*` hooks as settings change and the
/// `*_psu_*` methods to drive the outlet. Every settings reload builds a new
/// controller and an empty state cache.
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::plugin::{FileSettingsStore, PsuControlPlugin};
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let store = FileSettingsStore::new("/var/lib/octoprint/psucontrol_outlet.json");
/// let mut plugin = PsuControlPlugin::new(store, tracing::info_span!("psucontrol"));
/// plugin.on_settings_initialized().await?;
///
/// plugin.turn_psu_on().await?;
/// assert!(plugin.get_psu_state().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PsuControlPlugin<S: SettingsStore> {
    store: S,
    settings: PluginSettings,
    cache: Option<PowerStateCache<EndpointConnector>>,
    config_error: Option<ConfigError>,
    span: Span,
}

impl<S: SettingsStore> PsuControlPlugin<S> {
    /// Creates an unconfigured plugin. Call
    /// [`on_settings_initialized`](Self::on_settings_initialized) before use.
    #[must_use]
    pub fn new(store: S, span: Span) -> Self {
        Self {
            store,
            settings: PluginSettings::default(),
            cache: None,
            config_error: Some(ConfigError::MissingField("address")),
            span,
        }
    }

    /// Default settings, as shown to the user on first run.
    #[must_use]
    pub fn settings_defaults() -> PluginSettings {
        PluginSettings::default()
    }

    /// Settings schema version written by this plugin.
    #[must_use]
    pub fn settings_version() -> u32 {
        SETTINGS_VERSION
    }

    /// Returns the active settings.
    #[must_use]
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Returns the settings store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the configuration error of the last reload, if any.
    #[must_use]
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.config_error.as_ref()
    }

    /// Loads the stored settings, migrates them if they are older than
    /// [`settings_version`](Self::settings_version), and connects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the settings cannot be loaded or saved.
    /// Connection failures are only logged.
    pub async fn on_settings_initialized(&mut self) -> Result<()> {
        match self.store.load()? {
            None => {
                self.settings = Self::settings_defaults();
                self.store.save(&StoredSettings::current(self.settings.clone()))?;
            }
            Some(stored) => {
                self.settings = stored.settings;
                if stored.version.is_none_or(|v| v < SETTINGS_VERSION) {
                    self.on_settings_migrate(SETTINGS_VERSION, stored.version)?;
                }
            }
        }
        self.reload_settings().await;
        Ok(())
    }

    /// Applies a partial settings update from the host, persists it and
    /// reconnects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the update is malformed or cannot be saved;
    /// the active settings are then unchanged.
    pub async fn on_settings_save(&mut self, data: &Value) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.merge(data)?;
        self.store.save(&StoredSettings::current(settings.clone()))?;
        self.settings = settings;
        self.reload_settings().await;
        Ok(())
    }

    /// Migrates the active settings from schema `current` to `target` and
    /// persists them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the migrated settings cannot be saved.
    pub fn on_settings_migrate(&mut self, target: u32, current: Option<u32>) -> Result<()> {
        self.settings.migrate(target, current);
        self.store.save(&StoredSettings {
            version: Some(target),
            settings: self.settings.clone(),
        })?;
        Ok(())
    }

    /// Rebuilds the controller from the active settings and connects
    /// eagerly.
    ///
    /// Invalid settings leave the plugin unconfigured; a failed connection
    /// is logged and retried by the next operation.
    pub async fn reload_settings(&mut self) {
        let span = self.span.clone();
        async {
            tracing::info!(config = ?self.settings, "Reloading settings");
            self.cache = None;
            match self.settings.endpoint() {
                Ok(endpoint) => {
                    tracing::info!(
                        address = endpoint.address(),
                        protocol = %endpoint.protocol(),
                        "Connecting to outlet"
                    );
                    let cache = PowerStateCache::for_endpoint(endpoint, self.span.clone());
                    if let Err(e) = cache.connect().await {
                        tracing::error!(error = %e, "Failed to connect to outlet");
                    }
                    self.cache = Some(cache);
                    self.config_error = None;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Invalid outlet settings");
                    self.config_error = Some(e);
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Switches the PSU on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when unconfigured, otherwise the device error.
    pub async fn turn_psu_on(&self) -> Result<()> {
        self.switch(true).await
    }

    /// Switches the PSU off.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when unconfigured, otherwise the device error.
    pub async fn turn_psu_off(&self) -> Result<()> {
        self.switch(false).await
    }

    /// Returns the PSU state, from cache when known.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when unconfigured, or the device error when
    /// nothing is cached yet and the outlet cannot be read.
    pub async fn get_psu_state(&self) -> Result<bool> {
        let cache = self.cache()?;
        cache.read_state().instrument(self.span.clone()).await.inspect_err(|e| {
            tracing::error!(parent: &self.span, error = %e, "Failed to get PSU state");
        })
    }

    /// Returns the cached PSU state without touching the outlet; `None` while
    /// unknown.
    #[must_use]
    pub fn cached_psu_state(&self) -> Option<bool> {
        self.cache.as_ref().and_then(PowerStateCache::cached)
    }

    async fn switch(&self, on: bool) -> Result<()> {
        let cache = self.cache()?;
        let result = if on {
            cache.turn_on().instrument(self.span.clone()).await
        } else {
            cache.turn_off().instrument(self.span.clone()).await
        };
        result.inspect_err(|e| {
            let target = if on { "On" } else { "Off" };
            tracing::error!(parent: &self.span, error = %e, "Failed to switch PSU {target}");
        })
    }

    fn cache(&self) -> Result<&PowerStateCache<EndpointConnector>> {
        match (&self.cache, &self.config_error) {
            (Some(cache), _) => Ok(cache),
            (None, Some(e)) => Err(e.clone().into()),
            (None, None) => Err(ConfigError::MissingField("address").into()),
        }
    }
}
