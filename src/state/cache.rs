// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state cache.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{Instrument, Span};

use crate::controller::{ConnectionState, Connector, DeviceController, EndpointConnector};
use crate::error::Result;
use crate::types::{DeviceEndpoint, PowerState};

/// Cached power state in front of a [`DeviceController`].
///
/// `None` means unknown. The cached value only changes after a successful
/// read or a successful switch; failures never touch it.
///
/// Clones share the cache and the controller. Refreshes are not coalesced:
/// overlapping refreshes race and the last one to finish wins.
pub struct PowerStateCache<C: Connector> {
    state: Arc<Mutex<Option<bool>>>,
    controller: Arc<tokio::sync::Mutex<DeviceController<C>>>,
    span: Span,
}

impl PowerStateCache<EndpointConnector> {
    /// Creates an empty cache in front of a new controller for `endpoint`.
    #[must_use]
    pub fn for_endpoint(endpoint: DeviceEndpoint, span: Span) -> Self {
        Self::new(DeviceController::for_endpoint(endpoint, span.clone()), span)
    }
}

impl<C: Connector + 'static> PowerStateCache<C> {
    /// Creates an empty cache in front of `controller`.
    #[must_use]
    pub fn new(controller: DeviceController<C>, span: Span) -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
            controller: Arc::new(tokio::sync::Mutex::new(controller)),
            span,
        }
    }

    /// Returns the cached state without touching the outlet.
    #[must_use]
    pub fn cached(&self) -> Option<bool> {
        *self.state.lock()
    }

    /// Returns the controller's connection state, or `None` while an
    /// operation holds it.
    #[must_use]
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.controller.try_lock().ok().map(|c| c.state())
    }

    /// Returns the power state.
    ///
    /// With nothing cached this waits for the outlet and caches the answer.
    /// Otherwise it returns the cached value at once and spawns a detached
    /// refresh whose failure is only logged. Must be called within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns the controller's error when the state is unknown and the read
    /// fails; the cache stays unknown.
    pub async fn read_state(&self) -> Result<bool> {
        let cached = self.cached();
        match cached {
            Some(on) => {
                self.spawn_refresh();
                Ok(on)
            }
            None => {
                tracing::debug!(parent: &self.span, "No cached power state, reading outlet");
                self.fetch().await
            }
        }
    }

    /// Connects the controller ahead of the first operation.
    ///
    /// # Errors
    ///
    /// Returns the connection failure; the next operation tries again.
    pub async fn connect(&self) -> Result<()> {
        self.controller.lock().await.ensure_connected().await?;
        Ok(())
    }

    /// Reads the outlet now and updates the cache.
    ///
    /// # Errors
    ///
    /// Returns the controller's error; the cache is left as it was.
    pub async fn refresh(&self) -> Result<bool> {
        self.fetch().await
    }

    /// Switches the outlet on; the cache follows only on success.
    ///
    /// # Errors
    ///
    /// Returns the controller's error.
    pub async fn turn_on(&self) -> Result<()> {
        self.switch(true).await
    }

    /// Switches the outlet off; the cache follows only on success.
    ///
    /// # Errors
    ///
    /// Returns the controller's error.
    pub async fn turn_off(&self) -> Result<()> {
        self.switch(false).await
    }

    async fn switch(&self, on: bool) -> Result<()> {
        let state = PowerState::from(on);
        tracing::debug!(parent: &self.span, "Switching PSU {state}");
        self.controller.lock().await.set_status(on).await?;
        *self.state.lock() = Some(on);
        Ok(())
    }

    async fn fetch(&self) -> Result<bool> {
        let on = self.controller.lock().await.get_status().await?;
        *self.state.lock() = Some(on);
        tracing::debug!(parent: &self.span, state = %PowerState::from(on), "Power state updated");
        Ok(on)
    }

    fn spawn_refresh(&self) {
        let cache = self.clone();
        let span = self.span.clone();
        tokio::spawn(
            async move {
                if let Err(e) = cache.fetch().await {
                    tracing::warn!(error = %e, "Background power state refresh failed");
                }
            }
            .instrument(span),
        );
    }
}

impl<C: Connector> Clone for PowerStateCache<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            controller: Arc::clone(&self.controller),
            span: self.span.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for PowerStateCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerStateCache")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
