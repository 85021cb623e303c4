// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Commands understood by the HTTP command API.

use std::fmt;

use crate::types::PowerState;

/// A command sent as `cmnd=<command>` to `/cm`.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::protocol::http::HttpCommand;
///
/// assert_eq!(HttpCommand::power(true).as_command_string(), "Power ON");
/// assert_eq!(HttpCommand::Status.encoded(), "Status%200");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCommand {
    /// `Status 0`: full status, used as the liveness probe.
    Status,
    /// `Power`: query the relay state.
    PowerQuery,
    /// `Power ON` / `Power OFF`.
    PowerSet(PowerState),
    /// `Power TOGGLE`.
    PowerToggle,
}

impl HttpCommand {
    /// Creates a command that switches the relay on or off.
    #[must_use]
    pub fn power(on: bool) -> Self {
        Self::PowerSet(PowerState::from(on))
    }

    /// Returns the command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::PowerQuery | Self::PowerSet(_) | Self::PowerToggle => "Power",
        }
    }

    /// Returns the command payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&'static str> {
        match self {
            Self::Status => Some("0"),
            Self::PowerQuery => None,
            Self::PowerSet(state) => Some(state.as_str()),
            Self::PowerToggle => Some("TOGGLE"),
        }
    }

    /// Returns the command as typed in the device console, e.g. `"Power ON"`.
    #[must_use]
    pub fn as_command_string(&self) -> String {
        match self.payload() {
            Some(payload) => format!("{} {payload}", self.name()),
            None => self.name().to_string(),
        }
    }

    /// Returns the URL-encoded command, e.g. `"Power%20ON"`.
    #[must_use]
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.as_command_string()).into_owned()
    }
}

impl fmt::Display for HttpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_command_string())
    }
}
