// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state of an outlet.

use std::fmt;

/// The on/off state of an outlet relay.
///
/// The cached state of a PSU is an `Option<bool>` (`None` until the first
/// successful read); this type is the wire-facing view of a known state.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::types::PowerState;
///
/// assert_eq!(PowerState::from(true).as_str(), "ON");
/// assert_eq!(PowerState::from_reply("off"), PowerState::Off);
/// assert!(bool::from(PowerState::On));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// Power is off.
    Off,
    /// Power is on.
    On,
}

impl PowerState {
    /// Returns the command/echo string used by the HTTP command protocol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Interprets a reply value leniently: `"ON"` in any case is on,
    /// anything else is off.
    #[must_use]
    pub fn from_reply(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ON") {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Returns true if the state is [`PowerState::On`].
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl From<PowerState> for bool {
    fn from(value: PowerState) -> Self {
        value.is_on()
    }
}
