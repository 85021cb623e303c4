// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol-agnostic outlet handle.
//!
//! [`Device`] picks the protocol client once, at construction, and then
//! forwards every call to it. Callers see one [`PowerSwitch`] whatever the
//! outlet speaks.

use tracing::Span;

use crate::error::Result;
#[cfg(feature = "http")]
use crate::protocol::http::{HttpCommandClient, HttpConfig};
#[cfg(feature = "local")]
use crate::protocol::local::{LocalConfig, RobustLocalClient};
use crate::protocol::PowerSwitch;
#[cfg(feature = "local")]
use crate::protocol::RetryPolicy;
use crate::types::{Credentials, DeviceEndpoint, ProtocolKind, ProtocolParams};

/// A connected outlet.
///
/// The encrypted local variant is always the retrying client; the HTTP
/// variant relies on its request timeout and lets the controller reconnect.
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::Device;
/// use psucontrol_outlet::protocol::PowerSwitch;
/// use psucontrol_outlet::types::ProtocolParams;
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let mut device = Device::construct("tasmota", "192.168.1.50", &ProtocolParams::default()).await?;
/// if !device.get_status().await? {
///     device.turn_on().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub enum Device {
    /// HTTP command protocol.
    #[cfg(feature = "http")]
    Http(HttpCommandClient),
    /// Encrypted local protocol, with retries.
    #[cfg(feature = "local")]
    Local(RobustLocalClient),
}

impl Device {
    /// Validates the parameters, then connects and probes the outlet.
    ///
    /// `protocol` is `"tasmota"` or `"tuya"` (case-insensitive). Logs go to
    /// the current span.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown protocol or invalid parameters,
    /// before any network I/O. Otherwise returns the connection failure.
    pub async fn construct(protocol: &str, address: &str, params: &ProtocolParams) -> Result<Self> {
        let endpoint = DeviceEndpoint::from_params(protocol, address, params)?;
        Self::connect(&endpoint, Span::current()).await
    }

    /// Connects and probes the outlet described by `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ProtocolDisabled` if the protocol was compiled
    /// out, otherwise the connection failure.
    pub async fn connect(endpoint: &DeviceEndpoint, span: Span) -> Result<Self> {
        match endpoint.credentials() {
            Credentials::Http {
                basic_auth,
                timeout,
            } => {
                #[cfg(feature = "http")]
                {
                    tracing::info!(address = endpoint.address(), "Using Tasmota protocol");
                    let mut config = HttpConfig::new(endpoint.address()).with_timeout(*timeout);
                    if let Some((username, password)) = basic_auth {
                        config = config.with_credentials(username, password);
                    }
                    let client = HttpCommandClient::connect(config, span).await?;
                    Ok(Self::Http(client))
                }
                #[cfg(not(feature = "http"))]
                {
                    let _ = (basic_auth, timeout, span);
                    Err(crate::error::ConfigError::ProtocolDisabled(ProtocolKind::HttpCommand).into())
                }
            }
            Credentials::Local {
                device_id,
                local_key,
                version,
            } => {
                #[cfg(feature = "local")]
                {
                    tracing::info!(
                        address = endpoint.address(),
                        version = %version,
                        "Using Tuya protocol"
                    );
                    let config = LocalConfig::new(endpoint.address(), device_id, local_key, *version)?
                        .with_socket_timeout(LocalConfig::ROBUST_SOCKET_TIMEOUT);
                    let client =
                        RobustLocalClient::connect(config, RetryPolicy::default(), span).await?;
                    Ok(Self::Local(client))
                }
                #[cfg(not(feature = "local"))]
                {
                    let _ = (device_id, local_key, version, span);
                    Err(crate::error::ConfigError::ProtocolDisabled(ProtocolKind::EncryptedLocal).into())
                }
            }
        }
    }

    /// Returns the protocol of the connected client.
    #[must_use]
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            #[cfg(feature = "http")]
            Self::Http(_) => ProtocolKind::HttpCommand,
            #[cfg(feature = "local")]
            Self::Local(_) => ProtocolKind::EncryptedLocal,
        }
    }
}

impl PowerSwitch for Device {
    async fn get_status(&mut self) -> Result<bool> {
        match self {
            #[cfg(feature = "http")]
            Self::Http(client) => client.get_status().await,
            #[cfg(feature = "local")]
            Self::Local(client) => client.get_status().await,
        }
    }

    async fn set_status(&mut self, on: bool) -> Result<()> {
        match self {
            #[cfg(feature = "http")]
            Self::Http(client) => client.set_status(on).await,
            #[cfg(feature = "local")]
            Self::Local(client) => client.set_status(on).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};

    #[tokio::test]
    async fn construct_rejects_unknown_protocol_before_io() {
        let err = Device::construct("bogus", "192.0.2.1", &ProtocolParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownProtocol(ref p)) if p == "bogus"
        ));
    }

    #[tokio::test]
    async fn construct_rejects_missing_local_fields() {
        let err = Device::construct("tuya", "192.0.2.1", &ProtocolParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField("device_id"))
        ));
    }

    #[tokio::test]
    async fn construct_rejects_short_local_key() {
        let params = ProtocolParams {
            device_id: "bf01".to_string(),
            local_key: "short".to_string(),
            ..ProtocolParams::default()
        };
        let err = Device::construct("tuya", "192.0.2.1", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidLocalKey(5))));
    }

    #[tokio::test]
    async fn construct_rejects_empty_address() {
        let err = Device::construct("tasmota", "  ", &ProtocolParams::default())
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
