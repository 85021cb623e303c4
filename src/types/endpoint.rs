// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device endpoint description: where the outlet lives and how to talk to it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Wire protocol spoken by the outlet.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::types::ProtocolKind;
///
/// let kind: ProtocolKind = "Tasmota".parse().unwrap();
/// assert_eq!(kind, ProtocolKind::HttpCommand);
/// assert_eq!(ProtocolKind::EncryptedLocal.as_str(), "tuya");
/// assert!("bogus".parse::<ProtocolKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolKind {
    /// Tasmota/OpenBeken HTTP command API (`/cm?cmnd=...`).
    #[default]
    HttpCommand,
    /// Tuya encrypted local protocol on TCP port 6668.
    EncryptedLocal,
}

impl ProtocolKind {
    /// Returns the settings name of the protocol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HttpCommand => "tasmota",
            Self::EncryptedLocal => "tuya",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tasmota" => Ok(Self::HttpCommand),
            "tuya" => Ok(Self::EncryptedLocal),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Version of the Tuya local protocol.
///
/// An empty version string selects the default, 3.3.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::types::LocalVersion;
///
/// assert_eq!("3.4".parse::<LocalVersion>().unwrap(), LocalVersion::V34);
/// assert_eq!("".parse::<LocalVersion>().unwrap(), LocalVersion::V33);
/// assert!("2.0".parse::<LocalVersion>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LocalVersion {
    /// Version 3.1: only control commands are encrypted.
    V31,
    /// Version 3.2: framed like 3.3.
    V32,
    /// Version 3.3: AES-ECB with the local key, CRC32 frames.
    #[default]
    V33,
    /// Version 3.4: negotiated session key, HMAC-SHA256 frames.
    V34,
    /// Version 3.5: negotiated session key, AES-GCM frames.
    V35,
}

impl LocalVersion {
    /// All supported versions, oldest first.
    pub const ALL: [Self; 5] = [Self::V31, Self::V32, Self::V33, Self::V34, Self::V35];

    /// Returns the version string, e.g. `"3.3"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V31 => "3.1",
            Self::V32 => "3.2",
            Self::V33 => "3.3",
            Self::V34 => "3.4",
            Self::V35 => "3.5",
        }
    }

    /// Returns the version string as the bytes used in protocol headers.
    #[must_use]
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Returns true if the version negotiates a per-session key.
    #[must_use]
    pub fn negotiates_session_key(&self) -> bool {
        *self >= Self::V34
    }
}

impl fmt::Display for LocalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == trimmed)
            .ok_or_else(|| ConfigError::UnsupportedVersion(s.to_string()))
    }
}

/// Protocol-specific connection parameters, as supplied by configuration.
///
/// Fields that do not apply to the selected protocol are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolParams {
    /// HTTP basic auth user (HTTP command protocol).
    pub username: String,
    /// HTTP basic auth password (HTTP command protocol).
    pub password: String,
    /// Per-request timeout (HTTP command protocol).
    pub timeout: Option<Duration>,
    /// Device identifier (encrypted local protocol).
    pub device_id: String,
    /// Shared local key (encrypted local protocol).
    pub local_key: String,
    /// Protocol version string (encrypted local protocol).
    pub version: String,
}

/// Credentials for one outlet, by protocol.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP command protocol parameters.
    Http {
        /// `(username, password)` when both are configured.
        basic_auth: Option<(String, String)>,
        /// Per-request timeout.
        timeout: Duration,
    },
    /// Encrypted local protocol parameters.
    Local {
        /// Device identifier.
        device_id: String,
        /// 16-byte shared local key.
        local_key: String,
        /// Negotiated protocol version.
        version: LocalVersion,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                basic_auth,
                timeout,
            } => f
                .debug_struct("Http")
                .field("username", &basic_auth.as_ref().map(|(u, _)| u))
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            Self::Local {
                device_id, version, ..
            } => f
                .debug_struct("Local")
                .field("device_id", device_id)
                .field("version", version)
                .finish_non_exhaustive(),
        }
    }
}

/// A validated, immutable description of one outlet.
///
/// Changing any field means building a new endpoint and a new controller.
///
/// # Examples
///
/// ```
/// use psucontrol_outlet::types::{DeviceEndpoint, ProtocolKind, ProtocolParams};
///
/// let params = ProtocolParams {
///     device_id: "bf0123456789abcdefgh".to_string(),
///     local_key: "0123456789abcdef".to_string(),
///     version: "3.4".to_string(),
///     ..ProtocolParams::default()
/// };
/// let endpoint = DeviceEndpoint::from_params("tuya", "192.168.1.60", &params).unwrap();
/// assert_eq!(endpoint.protocol(), ProtocolKind::EncryptedLocal);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    address: String,
    credentials: Credentials,
}

impl DeviceEndpoint {
    /// Default per-request timeout of the HTTP command protocol.
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates an HTTP command endpoint without credentials.
    #[must_use]
    pub fn http(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: Credentials::Http {
                basic_auth: None,
                timeout: Self::DEFAULT_HTTP_TIMEOUT,
            },
        }
    }

    /// Creates an encrypted local endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the device id is empty or the key is not 16 bytes.
    pub fn local(
        address: impl Into<String>,
        device_id: impl Into<String>,
        local_key: impl Into<String>,
        version: LocalVersion,
    ) -> Result<Self, ConfigError> {
        let endpoint = Self {
            address: address.into(),
            credentials: Credentials::Local {
                device_id: device_id.into(),
                local_key: local_key.into(),
                version,
            },
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Builds an endpoint from a protocol name and loose parameters.
    ///
    /// All validation happens here, before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown protocol, an empty address, or
    /// missing/invalid protocol-specific parameters.
    pub fn from_params(
        protocol: &str,
        address: &str,
        params: &ProtocolParams,
    ) -> Result<Self, ConfigError> {
        let kind: ProtocolKind = protocol.parse()?;
        let address = address.trim();

        let credentials = match kind {
            ProtocolKind::HttpCommand => {
                let basic_auth = (!params.username.is_empty() && !params.password.is_empty())
                    .then(|| (params.username.clone(), params.password.clone()));
                Credentials::Http {
                    basic_auth,
                    timeout: params.timeout.unwrap_or(Self::DEFAULT_HTTP_TIMEOUT),
                }
            }
            ProtocolKind::EncryptedLocal => Credentials::Local {
                device_id: params.device_id.trim().to_string(),
                local_key: params.local_key.clone(),
                version: params.version.parse()?,
            },
        };

        let endpoint = Self {
            address: address.to_string(),
            credentials,
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Adds HTTP basic auth credentials. Ignored for local endpoints.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        if let Credentials::Http { basic_auth, .. } = &mut self.credentials {
            *basic_auth = Some((username.into(), password.into()));
        }
        self
    }

    /// Sets the HTTP request timeout. Ignored for local endpoints.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Credentials::Http { timeout: t, .. } = &mut self.credentials {
            *t = timeout;
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::MissingField("address"));
        }
        if let Credentials::Local {
            device_id,
            local_key,
            ..
        } = &self.credentials
        {
            if device_id.is_empty() {
                return Err(ConfigError::MissingField("device_id"));
            }
            if local_key.is_empty() {
                return Err(ConfigError::MissingField("local_key"));
            }
            if local_key.len() != 16 {
                return Err(ConfigError::InvalidLocalKey(local_key.len()));
            }
        }
        Ok(())
    }

    /// Returns the host or IP address of the outlet.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the protocol spoken by the outlet.
    #[must_use]
    pub fn protocol(&self) -> ProtocolKind {
        match self.credentials {
            Credentials::Http { .. } => ProtocolKind::HttpCommand,
            Credentials::Local { .. } => ProtocolKind::EncryptedLocal,
        }
    }

    /// Returns the protocol-specific credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
