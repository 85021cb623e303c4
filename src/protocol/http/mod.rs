// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP command protocol (Tasmota/OpenBeken web API).
//!
//! Commands are sent as `GET http://<address>/cm?cmnd=<command>` with
//! optional HTTP basic auth; the device answers with a small JSON object.

mod client;
mod command;
mod response;

pub use client::{EchoPolicy, HttpCommandClient, HttpConfig};
pub use command::HttpCommand;
pub use response::{PowerResponse, StatusResponse};
