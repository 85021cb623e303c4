// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `psucontrol_outlet` - switch a 3D printer PSU through a smart outlet.
//!
//! This library drives the mains outlet a printer's power supply is plugged
//! into, for PSU control hosts. Two kinds of outlet are supported:
//!
//! - **Tasmota** firmware, over its HTTP command API (`http` feature)
//! - **Tuya** devices, over the encrypted local protocol, versions 3.1 to
//!   3.5 (`local` feature)
//!
//! # Layers
//!
//! - [`protocol`]: one client per wire protocol, behind [`PowerSwitch`]
//! - [`Device`]: picks the client from the configured protocol
//! - [`controller`]: drops the client after any failure so the next call
//!   reconnects from scratch
//! - [`state`]: caches the last known power state and refreshes it in the
//!   background
//! - [`plugin`]: settings, migration and the host-facing PSU calls
//!
//! # Quick Start
//!
//! ```no_run
//! use psucontrol_outlet::state::PowerStateCache;
//! use psucontrol_outlet::types::{DeviceEndpoint, ProtocolParams};
//!
//! #[tokio::main]
//! async fn main() -> psucontrol_outlet::Result<()> {
//!     let params = ProtocolParams {
//!         device_id: "bf0123456789abcdefgh".to_string(),
//!         local_key: "0123456789abcdef".to_string(),
//!         version: "3.3".to_string(),
//!         ..ProtocolParams::default()
//!     };
//!     let endpoint = DeviceEndpoint::from_params("tuya", "192.168.1.60", &params)?;
//!     let psu = PowerStateCache::for_endpoint(endpoint, tracing::info_span!("psu"));
//!
//!     psu.turn_on().await?;
//!     assert!(psu.read_state().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## One-off Device Access
//!
//! ```no_run
//! use psucontrol_outlet::{Device, PowerSwitch};
//! use psucontrol_outlet::types::ProtocolParams;
//!
//! #[tokio::main]
//! async fn main() -> psucontrol_outlet::Result<()> {
//!     let params = ProtocolParams {
//!         username: "admin".to_string(),
//!         password: "secret".to_string(),
//!         ..ProtocolParams::default()
//!     };
//!     let mut device = Device::construct("tasmota", "192.168.1.50", &params).await?;
//!     let on = device.toggle().await?;
//!     println!("outlet is now {}", if on { "on" } else { "off" });
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "http", feature = "local")))]
compile_error!("enable at least one of the `http` and `local` features");

pub mod controller;
mod device;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

pub use controller::{ConnectionState, Connector, DeviceController, EndpointConnector};
pub use device::Device;
pub use error::{ConfigError, DeviceError, Error, ProtocolError, Result, TransportError};
pub use protocol::{PowerSwitch, RetryPolicy};
pub use state::PowerStateCache;
pub use types::{DeviceEndpoint, LocalVersion, PowerState, ProtocolKind, ProtocolParams};
