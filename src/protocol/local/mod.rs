// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tuya encrypted local protocol.
//!
//! Devices listen on TCP port 6668 and exchange binary frames whose payloads
//! are encrypted with the per-device local key (3.1 to 3.3) or a session key
//! negotiated at connect time (3.4, 3.5).
//!
//! # Clients
//!
//! - [`LocalClient`]: one session, no retries; a failed call drops the
//!   session and the next call reconnects
//! - [`RobustLocalClient`]: wraps the plain client in a [`RetryPolicy`]
//!   around construction and every operation
//!
//! The [`frame`], [`codec`] and [`cipher`] modules are public so the wire
//! format can be inspected or simulated.
//!
//! [`RetryPolicy`]: crate::protocol::RetryPolicy

pub mod cipher;
mod client;
pub mod codec;
pub mod frame;
mod robust;
mod session;

pub use client::{
    CURRENT_DP, EnergyReading, LocalClient, LocalConfig, POWER_DP, SWITCH_DP, VOLTAGE_DP,
    check_reply, data_points, energy_reading, switch_state,
};
pub use robust::RobustLocalClient;
pub use session::derive_session_key;
