// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the outlet controller.
//!
//! The hierarchy mirrors the layers of the crate: configuration problems are
//! detected before any network I/O, connection failures wrap whatever made
//! the liveness probe fail, transport errors come from the socket or HTTP
//! stack, protocol errors mean the device answered with something we could
//! not use, and device errors are failures the outlet itself reported.

use std::time::Duration;

use thiserror::Error;

use crate::types::ProtocolKind;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The liveness probe or session establishment failed.
    #[error("cannot connect to device at {address}: {source}")]
    Connect {
        /// Address of the outlet that could not be reached.
        address: String,
        /// The failure that made the probe fail.
        #[source]
        source: Box<Error>,
    },

    /// Network-level failure while talking to the device.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered, but the answer was malformed or unusable.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device reported an error, or the retry budget ran out.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Persisted plugin settings could not be read or written.
    #[error("settings store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Wraps `source` as a connection failure for `address`.
    pub(crate) fn connect(address: impl Into<String>, source: Error) -> Self {
        Self::Connect {
            address: address.into(),
            source: Box::new(source),
        }
    }

    /// Returns true for configuration errors, which no amount of retrying fixes.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if the failure is worth retrying with a fresh connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::Store(_)
            | Self::Protocol(ProtocolError::AuthenticationFailed) => false,
            Self::Connect { source, .. } => source.is_transient(),
            Self::Transport(_) | Self::Protocol(_) | Self::Device(_) => true,
        }
    }
}

/// Errors detected while validating configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The protocol name is not one of the recognized kinds.
    #[error("unknown protocol: {0} (use 'tasmota' or 'tuya')")]
    UnknownProtocol(String),

    /// A field required by the selected protocol is empty or missing.
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    /// The encrypted protocol version is not supported.
    #[error("unsupported protocol version: {0} (use 3.1, 3.2, 3.3, 3.4 or 3.5)")]
    UnsupportedVersion(String),

    /// The local key must be exactly 16 bytes.
    #[error("local key must be 16 characters, got {0}")]
    InvalidLocalKey(usize),

    /// Support for the protocol was compiled out.
    #[error("support for the {0} protocol is not enabled in this build")]
    ProtocolDisabled(ProtocolKind),
}

/// Network-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (DNS, connect, timeout, body read).
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation did not complete within its fixed timeout.
    #[error("operation timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("connection closed by device")]
    ConnectionClosed,
}

/// Errors in a response that arrived intact at the transport level.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Response body was not valid JSON.
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP endpoint answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The device rejected the credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The device echoed a different power state than commanded.
    #[error("device reported {actual} after being commanded {expected}")]
    EchoMismatch {
        /// The commanded state.
        expected: String,
        /// The state reported in the response.
        actual: String,
    },

    /// A binary frame failed validation.
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// Payload could not be decrypted with the configured key.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Session key negotiation failed.
    #[error("session negotiation failed: {0}")]
    Handshake(String),

    /// Payload decoded but did not have the expected shape.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
}

/// Structural problems in a binary frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame does not start with a known prefix.
    #[error("unknown prefix 0x{0:08X}")]
    BadPrefix(u32),

    /// The frame does not end with the expected suffix.
    #[error("bad suffix 0x{0:08X}")]
    BadSuffix(u32),

    /// The declared length does not fit the data.
    #[error("frame length {declared} does not match {available} available bytes")]
    Length {
        /// Length from the header.
        declared: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// CRC32 checksum mismatch.
    #[error("CRC mismatch")]
    Crc,

    /// HMAC or GCM tag verification failed.
    #[error("authentication tag mismatch")]
    Tag,
}

/// Failures reported by the device or raised after the retry budget ran out.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device response carried an `Error` field.
    #[error("device reported error: {0}")]
    Reported(String),

    /// Every attempt allowed by the retry policy failed.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the operation that was retried.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        source: Box<Error>,
    },
}

/// Failures of the settings persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the settings file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The settings file.
        path: std::path::PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON of the expected shape.
    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
