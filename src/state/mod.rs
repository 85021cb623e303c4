// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last-known power state with background refresh.
//!
//! [`PowerStateCache`] answers state queries from memory once a value is
//! known, and refreshes that value in a detached task after every answer.
//! Only the first query, while the state is still unknown, waits for the
//! outlet.
//!
//! # Examples
//!
//! ```no_run
//! use psucontrol_outlet::state::PowerStateCache;
//! use psucontrol_outlet::types::DeviceEndpoint;
//!
//! # async fn example() -> psucontrol_outlet::Result<()> {
//! let cache = PowerStateCache::for_endpoint(DeviceEndpoint::http("192.168.1.50"), tracing::Span::none());
//!
//! // Blocks: nothing is cached yet
//! let on = cache.read_state().await?;
//! // Returns at once and refreshes in the background
//! assert_eq!(cache.read_state().await?, on);
//! # Ok(())
//! # }
//! ```

mod cache;

pub use cache::PowerStateCache;
