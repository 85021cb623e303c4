// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response parsing for the HTTP command API.

use serde::Deserialize;

use crate::types::PowerState;

/// Response from a `Power` command.
///
/// Single-relay devices answer `{"POWER": "ON"}`, some firmwares use
/// `{"POWER1": "ON"}` instead.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::protocol::http::PowerResponse;
/// use psucontrol_outlet::types::PowerState;
///
/// let response: PowerResponse = serde_json::from_str(r#"{"POWER1": "on"}"#).unwrap();
/// assert_eq!(response.power_state(), PowerState::On);
///
/// let response: PowerResponse = serde_json::from_str("{}").unwrap();
/// assert_eq!(response.power_state(), PowerState::Off);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowerResponse {
    #[serde(rename = "POWER", default)]
    power: Option<String>,
    #[serde(rename = "POWER1", default)]
    power1: Option<String>,
}

impl PowerResponse {
    /// Returns the raw reported value, `POWER` taking precedence over `POWER1`.
    #[must_use]
    pub fn reported(&self) -> Option<&str> {
        self.power.as_deref().or(self.power1.as_deref())
    }

    /// Returns the reported state; a missing key reads as off.
    #[must_use]
    pub fn power_state(&self) -> PowerState {
        self.reported()
            .map_or(PowerState::Off, PowerState::from_reply)
    }
}

/// The parts of the `Status 0` response used by the liveness probe.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "Status", default)]
    status: Option<StatusDeviceParameters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StatusDeviceParameters {
    #[serde(rename = "DeviceName", default)]
    device_name: Option<String>,
}

impl StatusResponse {
    /// Name reported for unnamed devices.
    pub const UNKNOWN_DEVICE: &'static str = "Unknown";

    /// Returns `Status.DeviceName`, or `"Unknown"`.
    #[must_use]
    pub fn device_name(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.device_name.as_deref())
            .unwrap_or(Self::UNKNOWN_DEVICE)
    }
}
