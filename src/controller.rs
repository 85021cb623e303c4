// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconnecting wrapper around one outlet.
//!
//! [`DeviceController`] holds at most one live client. The client is created
//! lazily on first use, and dropped as soon as any call through it fails, so
//! the next call starts from a fresh connection and liveness probe. The
//! controller itself never retries: the error goes back to the caller.

use std::fmt;
use std::future::Future;

use tracing::{Instrument, Span};

use crate::device::Device;
use crate::error::Result;
use crate::protocol::PowerSwitch;
use crate::types::DeviceEndpoint;

/// Creates connected clients for a controller.
pub trait Connector: Send + Sync {
    /// The client type produced.
    type Switch: PowerSwitch;

    /// Connects and probes a new client.
    fn connect(&self) -> impl Future<Output = Result<Self::Switch>> + Send;
}

/// Connects a [`Device`] to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: DeviceEndpoint,
    span: Span,
}

impl EndpointConnector {
    /// Creates a connector; clients log into `span`.
    #[must_use]
    pub fn new(endpoint: DeviceEndpoint, span: Span) -> Self {
        Self { endpoint, span }
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }
}

impl Connector for EndpointConnector {
    type Switch = Device;

    async fn connect(&self) -> Result<Device> {
        Device::connect(&self.endpoint, self.span.clone()).await
    }
}

/// Connection state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live client; the next operation connects.
    Disconnected,
    /// A client is held and was valid after its last use.
    Connected,
}

impl ConnectionState {
    /// Returns true if a client is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Invalidate-and-rethrow controller for one outlet.
///
/// Operations take `&mut self`; share a controller behind an async mutex.
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::controller::DeviceController;
/// use psucontrol_outlet::types::DeviceEndpoint;
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let endpoint = DeviceEndpoint::http("192.168.1.50");
/// let mut controller = DeviceController::for_endpoint(endpoint, tracing::Span::none());
///
/// controller.turn_on().await?;
/// assert!(controller.get_status().await?);
/// # Ok(())
/// # }
/// ```
pub struct DeviceController<C: Connector> {
    connector: C,
    device: Option<C::Switch>,
    span: Span,
}

impl DeviceController<EndpointConnector> {
    /// Creates a controller for `endpoint`. Nothing connects until the
    /// first operation.
    #[must_use]
    pub fn for_endpoint(endpoint: DeviceEndpoint, span: Span) -> Self {
        Self::new(EndpointConnector::new(endpoint, span.clone()), span)
    }
}

impl<C: Connector> DeviceController<C> {
    /// Creates a disconnected controller.
    #[must_use]
    pub fn new(connector: C, span: Span) -> Self {
        Self {
            connector,
            device: None,
            span,
        }
    }

    /// Returns the connector.
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.device.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Connects if no client is held, and returns it.
    ///
    /// # Errors
    ///
    /// Returns the connection failure; the controller stays disconnected.
    pub async fn ensure_connected(&mut self) -> Result<&mut C::Switch> {
        let device = match self.device.take() {
            Some(device) => device,
            None => {
                tracing::info!(parent: &self.span, "Connecting to outlet");
                match self.connector.connect().instrument(self.span.clone()).await {
                    Ok(device) => device,
                    Err(e) => {
                        tracing::error!(parent: &self.span, error = %e, "Failed to connect to outlet");
                        return Err(e);
                    }
                }
            }
        };
        Ok(self.device.insert(device))
    }

    /// Reads the relay state.
    ///
    /// # Errors
    ///
    /// Returns the connection or device failure; the client is dropped.
    pub async fn get_status(&mut self) -> Result<bool> {
        let device = self.ensure_connected().await?;
        let result = device.get_status().await;
        self.settle("get_status", result)
    }

    /// Switches the relay.
    ///
    /// # Errors
    ///
    /// Returns the connection or device failure; the client is dropped.
    pub async fn set_status(&mut self, on: bool) -> Result<()> {
        let device = self.ensure_connected().await?;
        let result = device.set_status(on).await;
        self.settle("set_status", result)
    }

    /// Switches the relay on.
    ///
    /// # Errors
    ///
    /// See [`set_status`](Self::set_status).
    pub async fn turn_on(&mut self) -> Result<()> {
        self.set_status(true).await
    }

    /// Switches the relay off.
    ///
    /// # Errors
    ///
    /// See [`set_status`](Self::set_status).
    pub async fn turn_off(&mut self) -> Result<()> {
        self.set_status(false).await
    }

    /// Drops the held client, if any.
    pub fn disconnect(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!(parent: &self.span, "Outlet client dropped");
        }
    }

    fn settle<T>(&mut self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!(parent: &self.span, operation, error = %e, "Outlet operation failed, dropping connection");
            self.device = None;
        }
        result
    }
}

impl<C: Connector + fmt::Debug> fmt::Debug for DeviceController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("connector", &self.connector)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
