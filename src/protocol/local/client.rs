// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plain local protocol client.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Instrument, Span};

use super::cipher::{self, Key};
use super::codec::LocalCodec;
use super::session::LocalSession;
use crate::error::{ConfigError, DeviceError, Error, Result, TransportError};
use crate::protocol::PowerSwitch;
use crate::types::{LocalVersion, PowerState};

/// Data point holding the relay state.
pub const SWITCH_DP: &str = "1";
/// Data point holding the current in mA, on plugs with an energy meter.
pub const CURRENT_DP: &str = "18";
/// Data point holding the power, on plugs with an energy meter.
pub const POWER_DP: &str = "19";
/// Data point holding the voltage, on plugs with an energy meter.
pub const VOLTAGE_DP: &str = "20";

// ============================================================================
// LocalConfig
// ============================================================================

/// Configuration for an encrypted local outlet.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::protocol::local::LocalConfig;
/// use psucontrol_outlet::types::LocalVersion;
/// use std::time::Duration;
///
/// let config = LocalConfig::new(
///     "192.168.1.60",
///     "bf0123456789abcdefgh",
///     "0123456789abcdef",
///     LocalVersion::V33,
/// )
/// .unwrap()
/// .with_socket_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.port(), 6668);
/// assert_eq!(config.address(), "192.168.1.60:6668");
/// ```
#[derive(Clone)]
pub struct LocalConfig {
    host: String,
    port: u16,
    device_id: String,
    local_key: Key,
    version: LocalVersion,
    socket_timeout: Duration,
}

impl std::fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("device_id", &self.device_id)
            .field("version", &self.version)
            .field("socket_timeout", &self.socket_timeout)
            .finish_non_exhaustive()
    }
}

impl LocalConfig {
    /// Default TCP port of the local protocol.
    pub const DEFAULT_PORT: u16 = 6668;
    /// Default socket timeout of the plain client.
    pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
    /// Socket timeout used by the robust client.
    pub const ROBUST_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration. `address` may carry a port (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty address or device id, or a local
    /// key that is not 16 bytes.
    pub fn new(
        address: &str,
        device_id: &str,
        local_key: &str,
        version: LocalVersion,
    ) -> std::result::Result<Self, ConfigError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingField("address"));
        }
        if device_id.is_empty() {
            return Err(ConfigError::MissingField("device_id"));
        }
        let local_key = cipher::parse_key(local_key)?;

        let (host, port) = split_host_port(address);
        Ok(Self {
            host: host.to_string(),
            port: port.unwrap_or(Self::DEFAULT_PORT),
            device_id: device_id.to_string(),
            local_key,
            version,
            socket_timeout: Self::DEFAULT_SOCKET_TIMEOUT,
        })
    }

    /// Sets the TCP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the timeout applied to connect and to every read and write.
    #[must_use]
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the device id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the protocol version.
    #[must_use]
    pub fn version(&self) -> LocalVersion {
        self.version
    }

    /// Returns the socket timeout.
    #[must_use]
    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }
}

fn split_host_port(address: &str) -> (&str, Option<u16>) {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (address, None),
        },
        _ => (address, None),
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Energy meter readings, as raw data point values.
///
/// Scaling of power and voltage varies between plug models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EnergyReading {
    /// Relay state.
    pub switch: bool,
    /// Current in mA.
    pub current_ma: i64,
    /// Power, in W or tenths of W.
    pub power: i64,
    /// Voltage, in V or tenths of V.
    pub voltage: i64,
}

/// Returns the data points of a status reply.
///
/// They sit at the top level (`{"dps": {...}}`) up to 3.3 and under
/// `data` (`{"data": {"dps": {...}}}`) from 3.4. A reply without data
/// points yields `None`.
///
/// # Errors
///
/// Returns `DeviceError::Reported` if the reply carries an `Error` field.
pub fn data_points(reply: &Value) -> Result<Option<&Map<String, Value>>> {
    check_reply(reply)?;
    Ok(reply
        .get("dps")
        .or_else(|| reply.get("data").and_then(|data| data.get("dps")))
        .and_then(Value::as_object))
}

/// Reads the relay state from a status reply; a missing slot reads as off.
///
/// # Errors
///
/// Returns `DeviceError::Reported` if the reply carries an `Error` field.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::protocol::local::switch_state;
/// use serde_json::json;
///
/// assert!(switch_state(&json!({"dps": {"1": true}})).unwrap());
/// assert!(!switch_state(&json!({"dps": {}})).unwrap());
/// assert!(switch_state(&json!({"Error": "Unexpected Payload"})).is_err());
/// ```
pub fn switch_state(reply: &Value) -> Result<bool> {
    Ok(data_points(reply)?
        .and_then(|dps| dps.get(SWITCH_DP))
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Reads energy meter slots from a status reply; missing slots read as 0.
///
/// # Errors
///
/// Returns `DeviceError::Reported` if the reply carries an `Error` field.
pub fn energy_reading(reply: &Value) -> Result<EnergyReading> {
    let dps = data_points(reply)?;
    let int = |slot: &str| {
        dps.and_then(|dps| dps.get(slot))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    Ok(EnergyReading {
        switch: switch_state(reply)?,
        current_ma: int(CURRENT_DP),
        power: int(POWER_DP),
        voltage: int(VOLTAGE_DP),
    })
}

/// Fails if a reply carries an `Error` field.
///
/// # Errors
///
/// Returns `DeviceError::Reported` with the error text.
pub fn check_reply(reply: &Value) -> Result<()> {
    match reply.get("Error") {
        Some(error) => {
            let message = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            Err(DeviceError::Reported(message).into())
        }
        None => Ok(()),
    }
}

// ============================================================================
// LocalClient
// ============================================================================

/// Client for one outlet over the encrypted local protocol.
///
/// The TCP session is opened on [`LocalClient::connect`] and reopened on
/// the next call after any failure. There are no retries; see
/// [`RobustLocalClient`](super::RobustLocalClient) for that.
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::protocol::PowerSwitch;
/// use psucontrol_outlet::protocol::local::{LocalClient, LocalConfig};
/// use psucontrol_outlet::types::LocalVersion;
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let config = LocalConfig::new(
///     "192.168.1.60",
///     "bf0123456789abcdefgh",
///     "0123456789abcdef",
///     LocalVersion::V33,
/// )?;
/// let mut plug = LocalClient::connect(config, tracing::Span::none()).await?;
/// if !plug.get_status().await? {
///     plug.turn_on().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalClient {
    config: LocalConfig,
    session: Option<LocalSession>,
    span: Span,
}

impl LocalClient {
    /// Creates a client without connecting; the session opens on first use.
    #[must_use]
    pub fn new(config: LocalConfig) -> Self {
        Self {
            config,
            session: None,
            span: Span::none(),
        }
    }

    /// Sets the span every operation is recorded under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Creates a client and opens its session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` if the session cannot be opened.
    pub async fn connect(config: LocalConfig, span: Span) -> Result<Self> {
        let mut client = Self::new(config).with_span(span);
        let span = client.span.clone();
        client.open().instrument(span).await?;
        Ok(client)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Returns true if a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Closes the session; the next call opens a new one.
    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!(address = %self.config.address(), "Session closed");
        }
    }

    /// Queries all data points and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns any transport, protocol or device error; the session is
    /// dropped on failure.
    pub async fn status(&mut self) -> Result<Value> {
        let span = self.span.clone();
        async {
            let result = match self.session().await {
                Ok(session) => session.query().await,
                Err(e) => Err(e),
            };
            let reply = self.settle(result)?;
            check_reply(&reply)?;
            Ok(reply)
        }
        .instrument(span)
        .await
    }

    /// Sets data points and returns the reply, if any.
    ///
    /// # Errors
    ///
    /// Returns any transport, protocol or device error; the session is
    /// dropped on failure.
    pub async fn set_data_points(&mut self, dps: Value) -> Result<Option<Value>> {
        let span = self.span.clone();
        async {
            let result = match self.session().await {
                Ok(session) => session.set_data_points(dps).await,
                Err(e) => Err(e),
            };
            let reply = self.settle(result)?;
            if let Some(reply) = &reply {
                check_reply(reply)?;
            }
            Ok(reply)
        }
        .instrument(span)
        .await
    }

    /// Reads the energy meter data points.
    ///
    /// # Errors
    ///
    /// Same as [`LocalClient::status`].
    pub async fn energy(&mut self) -> Result<EnergyReading> {
        let reply = self.status().await?;
        tracing::debug!(reply = %reply, "Energy info response");
        energy_reading(&reply)
    }

    async fn open(&mut self) -> Result<()> {
        self.session = None;
        let codec = LocalCodec::new(self.config.version, self.config.local_key);
        let session = LocalSession::open(
            &self.config.host,
            self.config.port,
            &self.config.device_id,
            codec,
            self.config.socket_timeout,
        )
        .await
        .map_err(|e| Error::connect(self.config.address(), e))?;

        tracing::debug!(
            address = %self.config.address(),
            version = %session.version(),
            "Connected to local outlet"
        );
        self.session = Some(session);
        Ok(())
    }

    async fn session(&mut self) -> Result<&mut LocalSession> {
        if self.session.is_none() {
            self.open().await?;
        }
        self.session
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionClosed.into())
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.disconnect();
        }
        result
    }
}

impl PowerSwitch for LocalClient {
    async fn get_status(&mut self) -> Result<bool> {
        let reply = self.status().await?;
        let on = switch_state(&reply)?;
        tracing::debug!(parent: &self.span, dps = %reply, "Device is {}", PowerState::from(on));
        Ok(on)
    }

    async fn set_status(&mut self, on: bool) -> Result<()> {
        tracing::debug!(parent: &self.span, "Turning device {}", PowerState::from(on));
        let mut dps = Map::new();
        dps.insert(SWITCH_DP.to_string(), Value::Bool(on));
        let reply = self.set_data_points(Value::Object(dps)).await?;
        tracing::debug!(parent: &self.span, reply = ?reply, "Set status result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn switch_state_from_top_level_dps() {
        assert!(switch_state(&json!({"devId": "x", "dps": {"1": true, "9": 0}})).unwrap());
        assert!(!switch_state(&json!({"dps": {"1": false}})).unwrap());
    }

    #[test]
    fn switch_state_from_nested_dps() {
        let reply = json!({"protocol": 4, "t": 1_700_000_000, "data": {"dps": {"1": true}}});
        assert!(switch_state(&reply).unwrap());
    }

    #[test]
    fn missing_switch_reads_as_off() {
        assert!(!switch_state(&json!({"dps": {}})).unwrap());
        assert!(!switch_state(&json!({})).unwrap());
        assert!(!switch_state(&json!({"dps": {"1": "on"}})).unwrap());
    }

    #[test]
    fn error_field_is_a_device_error() {
        let err = switch_state(&json!({"Error": "Unexpected Payload from Device", "Err": "904"}))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::Reported(ref msg)) if msg == "Unexpected Payload from Device"
        ));

        let err = check_reply(&json!({"Error": 905})).unwrap_err();
        assert!(err.to_string().contains("905"));
    }

    #[test]
    fn energy_slots() {
        let reply = json!({"dps": {"1": true, "18": 120, "19": 264, "20": 2401}});
        assert_eq!(
            energy_reading(&reply).unwrap(),
            EnergyReading {
                switch: true,
                current_ma: 120,
                power: 264,
                voltage: 2401,
            }
        );
        assert_eq!(
            energy_reading(&json!({"dps": {"1": false}})).unwrap(),
            EnergyReading::default()
        );
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            LocalConfig::new("", "id", "0123456789abcdef", LocalVersion::V33),
            Err(ConfigError::MissingField("address"))
        ));
        assert!(matches!(
            LocalConfig::new("10.0.0.2", "", "0123456789abcdef", LocalVersion::V33),
            Err(ConfigError::MissingField("device_id"))
        ));
        assert!(matches!(
            LocalConfig::new("10.0.0.2", "id", "0123", LocalVersion::V33),
            Err(ConfigError::InvalidLocalKey(4))
        ));
    }

    #[test]
    fn address_with_port() {
        let config =
            LocalConfig::new("127.0.0.1:40001", "id", "0123456789abcdef", LocalVersion::V34)
                .unwrap();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 40001);
        assert_eq!(config.socket_timeout(), Duration::from_secs(5));

        let config =
            LocalConfig::new("outlet.lan", "id", "0123456789abcdef", LocalVersion::V33).unwrap();
        assert_eq!(config.address(), "outlet.lan:6668");
    }

    #[test]
    fn debug_hides_local_key() {
        let config =
            LocalConfig::new("10.0.0.2", "id", "0123456789abcdef", LocalVersion::V33).unwrap();
        assert!(!format!("{config:?}").contains("0123456789abcdef"));
    }
}
