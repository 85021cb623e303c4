// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-facing PSU control plugin.
//!
//! A thin layer that turns persisted settings into a [`PowerStateCache`]
//! and exposes the three calls a PSU control host makes: switch on, switch
//! off, read state. Settings changes rebuild the whole stack.
//!
//! [`PowerStateCache`]: crate::state::PowerStateCache

mod adapter;
mod settings;

pub use adapter::PsuControlPlugin;
pub use settings::{
    FileSettingsStore, MemorySettingsStore, PROTOCOL_INTRODUCED_IN, PluginSettings,
    SETTINGS_VERSION, SettingsStore, StoredSettings,
};

/// Plugin identifier.
pub const PLUGIN_IDENTIFIER: &str = "psucontrol_outlet";

/// Human-readable plugin name.
pub const PLUGIN_NAME: &str = "PSU Control - Smart Outlet";

/// Plugin version.
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
