// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP command client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{Instrument, Span};

use super::command::HttpCommand;
use super::response::{PowerResponse, StatusResponse};
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::protocol::PowerSwitch;
use crate::types::PowerState;

/// What to do when a device echoes a different state than commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Log a warning and treat the command as successful.
    #[default]
    Lenient,
    /// Fail with [`ProtocolError::EchoMismatch`].
    Strict,
}

// ============================================================================
// HttpConfig
// ============================================================================

/// Configuration for an HTTP command outlet.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::protocol::http::{EchoPolicy, HttpConfig};
/// use std::time::Duration;
///
/// let config = HttpConfig::new("192.168.1.50")
///     .with_port(8080)
///     .with_credentials("admin", "secret")
///     .with_timeout(Duration::from_secs(5))
///     .with_echo_policy(EchoPolicy::Strict);
///
/// assert_eq!(config.base_url(), "http://192.168.1.50:8080");
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    timeout: Duration,
    echo_policy: EchoPolicy,
}

impl HttpConfig {
    /// Default HTTP port.
    pub const DEFAULT_PORT: u16 = 80;
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the given host (`host`, `host:port` or a URL).
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            credentials: None,
            timeout: Self::DEFAULT_TIMEOUT,
            echo_policy: EchoPolicy::default(),
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets HTTP basic auth credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how echo mismatches are handled.
    #[must_use]
    pub fn with_echo_policy(mut self, policy: EchoPolicy) -> Self {
        self.echo_policy = policy;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the echo policy.
    #[must_use]
    pub fn echo_policy(&self) -> EchoPolicy {
        self.echo_policy
    }

    /// Builds the base URL from this configuration.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            return host.to_string();
        }
        if self.port == Self::DEFAULT_PORT {
            format!("http://{host}")
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

// ============================================================================
// HttpCommandClient
// ============================================================================

/// Client for outlets running Tasmota-compatible firmware.
///
/// Every call is one independent `GET /cm?cmnd=<command>` request; there is
/// no session to lose. [`HttpCommandClient::connect`] runs a `Status 0`
/// liveness probe before handing out the client.
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::protocol::PowerSwitch;
/// use psucontrol_outlet::protocol::http::{HttpCommandClient, HttpConfig};
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let mut client =
///     HttpCommandClient::connect(HttpConfig::new("192.168.1.50"), tracing::Span::none()).await?;
/// let on = client.get_status().await?;
/// println!("{} is {}", client.device_name(), on);
/// client.turn_off().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpCommandClient {
    base_url: String,
    client: Client,
    credentials: Option<(String, String)>,
    echo_policy: EchoPolicy,
    device_name: String,
    span: Span,
}

impl HttpCommandClient {
    /// Builds a client without probing the device.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Http` if the HTTP stack cannot be initialized.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let base_url = config.base_url();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            base_url,
            client,
            credentials: config.credentials,
            echo_policy: config.echo_policy,
            device_name: StatusResponse::UNKNOWN_DEVICE.to_string(),
            span: Span::none(),
        })
    }

    /// Sets the span every request is recorded under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Builds a client and verifies the device answers `Status 0`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` wrapping the probe failure.
    pub async fn connect(config: HttpConfig, span: Span) -> Result<Self> {
        let mut client = Self::new(config)?.with_span(span);
        let probe_span = client.span.clone();
        client.probe().instrument(probe_span).await?;
        Ok(client)
    }

    /// Returns the device name reported by the last probe.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Returns the base URL of the device.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the URL for a command.
    #[must_use]
    pub fn command_url(&self, command: HttpCommand) -> String {
        format!("{}/cm?cmnd={}", self.base_url, command.encoded())
    }

    /// Issues `Status 0` and records the reported device name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` wrapping the request or parse failure.
    pub async fn probe(&mut self) -> Result<&str> {
        let status: StatusResponse = self
            .send_json(HttpCommand::Status)
            .await
            .map_err(|e| Error::connect(&self.base_url, e))?;

        self.device_name = status.device_name().to_string();
        tracing::info!(
            address = %self.base_url,
            device_name = %self.device_name,
            "Connected to HTTP outlet"
        );
        Ok(&self.device_name)
    }

    /// Sends a command and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on network failure or timeout,
    /// `ProtocolError::AuthenticationFailed` on 401 and
    /// `ProtocolError::HttpStatus` on any other non-success status.
    pub async fn send(&self, command: HttpCommand) -> Result<String> {
        let url = self.command_url(command);

        tracing::debug!(url = %url, command = %command, "Sending HTTP command");

        let mut request = self.client.get(&url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(TransportError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProtocolError::AuthenticationFailed.into());
        }
        if !status.is_success() {
            return Err(ProtocolError::HttpStatus(status.as_u16()).into());
        }

        let body = response.text().await.map_err(TransportError::Http)?;

        tracing::debug!(body = %body, "Received HTTP response");

        Ok(body)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, command: HttpCommand) -> Result<T> {
        let body = self.send(command).await?;
        serde_json::from_str(&body).map_err(|e| ProtocolError::Json(e).into())
    }

    async fn query_power(&self) -> Result<bool> {
        let response: PowerResponse = self.send_json(HttpCommand::PowerQuery).await?;
        Ok(response.power_state().is_on())
    }

    async fn command_power(&self, on: bool) -> Result<()> {
        let expected = PowerState::from(on);
        let response: PowerResponse = self.send_json(HttpCommand::PowerSet(expected)).await?;

        if response.power_state() != expected {
            let actual = response.reported().unwrap_or("<missing>").to_string();
            match self.echo_policy {
                EchoPolicy::Lenient => {
                    tracing::warn!(
                        expected = %expected,
                        actual = %actual,
                        "Device echoed a different power state"
                    );
                }
                EchoPolicy::Strict => {
                    return Err(ProtocolError::EchoMismatch {
                        expected: expected.to_string(),
                        actual,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    async fn toggle_power(&self) -> Result<bool> {
        let response: PowerResponse = self.send_json(HttpCommand::PowerToggle).await?;
        Ok(response.power_state().is_on())
    }
}

impl PowerSwitch for HttpCommandClient {
    async fn get_status(&mut self) -> Result<bool> {
        self.query_power().instrument(self.span.clone()).await
    }

    async fn set_status(&mut self, on: bool) -> Result<()> {
        self.command_power(on).instrument(self.span.clone()).await
    }

    async fn toggle(&mut self) -> Result<bool> {
        self.toggle_power().instrument(self.span.clone()).await
    }
}
