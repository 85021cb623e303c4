// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol clients for talking to a single smart outlet.
//!
//! # Protocols
//!
//! - [`http`]: Tasmota/OpenBeken HTTP command API, one stateless request per call
//! - [`local`]: Tuya encrypted local protocol over a persistent TCP session
//!
//! Every client implements [`PowerSwitch`], so the layers above never care
//! which wire protocol is in use.

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "local")]
pub mod local;
mod retry;

pub use retry::RetryPolicy;

use std::future::Future;

use crate::error::Result;

/// An outlet whose relay can be read and switched.
///
/// `toggle` is provided generically as "read, then set the opposite";
/// clients with a native toggle command may override it.
pub trait PowerSwitch: Send {
    /// Reads the relay state (`true` = on).
    fn get_status(&mut self) -> impl Future<Output = Result<bool>> + Send;

    /// Switches the relay on or off.
    fn set_status(&mut self, on: bool) -> impl Future<Output = Result<()>> + Send;

    /// Switches the relay on.
    fn turn_on(&mut self) -> impl Future<Output = Result<()>> + Send {
        self.set_status(true)
    }

    /// Switches the relay off.
    fn turn_off(&mut self) -> impl Future<Output = Result<()>> + Send {
        self.set_status(false)
    }

    /// Flips the relay and returns the new state.
    fn toggle(&mut self) -> impl Future<Output = Result<bool>> + Send {
        async move {
            let target = !self.get_status().await?;
            self.set_status(target).await?;
            Ok(target)
        }
    }
}
