// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the protocol clients and the controller.
//!
//! # Types
//!
//! - [`PowerState`] - On/Off state as reported or commanded
//! - [`ProtocolKind`] - Which wire protocol the outlet speaks
//! - [`LocalVersion`] - Version of the encrypted local protocol (3.1-3.5)
//! - [`DeviceEndpoint`] - Validated address + credentials of one outlet
//! - [`ProtocolParams`] - Loose protocol parameters as read from settings

mod endpoint;
mod power;

pub use endpoint::{Credentials, DeviceEndpoint, LocalVersion, ProtocolKind, ProtocolParams};
pub use power::PowerState;
