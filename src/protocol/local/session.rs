// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A TCP session with one device.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::cipher::{self, GCM_IV_LEN, HMAC_LEN, KEY_LEN, Key};
use super::codec::LocalCodec;
use super::frame::{
    CommandType, FrameHeader, HEADER_LEN_55AA, HEADER_LEN_6699, Message, PREFIX_55AA, PREFIX_6699,
};
use crate::error::{FrameError, ProtocolError, Result, TransportError};
use crate::types::LocalVersion;

/// Largest frame accepted from a device.
const MAX_FRAME_LEN: usize = 64 * 1024;
/// Unrelated frames (heartbeats, status pushes) skipped while waiting for a reply.
const MAX_SKIPPED_FRAMES: usize = 16;

/// An open, possibly key-negotiated connection.
///
/// Any error leaves the session in an unknown state; callers drop it and
/// open a new one.
#[derive(Debug)]
pub(crate) struct LocalSession {
    stream: TcpStream,
    codec: LocalCodec,
    device_id: String,
    seqno: u32,
    timeout: Duration,
}

impl LocalSession {
    /// Connects to `host:port` and negotiates a session key when the
    /// version requires one.
    pub(crate) async fn open(
        host: &str,
        port: u16,
        device_id: &str,
        codec: LocalCodec,
        socket_timeout: Duration,
    ) -> Result<Self> {
        let stream = match timeout(socket_timeout, TcpStream::connect((host, port))).await {
            Err(_) => return Err(TransportError::Timeout(socket_timeout).into()),
            Ok(result) => result.map_err(TransportError::Io)?,
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Cannot disable Nagle's algorithm");
        }

        let mut session = Self {
            stream,
            codec,
            device_id: device_id.to_string(),
            seqno: 0,
            timeout: socket_timeout,
        };

        if session.codec.version().negotiates_session_key() {
            session.negotiate().await?;
        }

        tracing::debug!(host, port, version = %session.codec.version(), "Session opened");
        Ok(session)
    }

    /// Returns the protocol version of the session.
    pub(crate) fn version(&self) -> LocalVersion {
        self.codec.version()
    }

    /// Queries all data points.
    pub(crate) async fn query(&mut self) -> Result<Value> {
        let cmd = if self.version() >= LocalVersion::V34 {
            CommandType::DpQueryNew
        } else {
            CommandType::DpQuery
        };
        let payload = self.query_payload();
        self.request(cmd, &payload)
            .await?
            .ok_or_else(|| ProtocolError::UnexpectedPayload("empty status reply".to_string()).into())
    }

    /// Sets data points; returns the reply body, if the device sent one.
    pub(crate) async fn set_data_points(&mut self, dps: Value) -> Result<Option<Value>> {
        let (cmd, payload) = if self.version() >= LocalVersion::V34 {
            (
                CommandType::ControlNew,
                serde_json::json!({
                    "protocol": 5,
                    "t": timestamp(),
                    "data": { "dps": dps },
                }),
            )
        } else {
            (
                CommandType::Control,
                serde_json::json!({
                    "devId": self.device_id,
                    "uid": self.device_id,
                    "t": timestamp().to_string(),
                    "dps": dps,
                }),
            )
        };
        self.request(cmd, &payload).await
    }

    fn query_payload(&self) -> Value {
        serde_json::json!({
            "gwId": self.device_id,
            "devId": self.device_id,
            "uid": self.device_id,
            "t": timestamp().to_string(),
        })
    }

    async fn request(&mut self, cmd: CommandType, payload: &Value) -> Result<Option<Value>> {
        let body = serde_json::to_vec(payload).map_err(ProtocolError::Json)?;
        tracing::debug!(command = ?cmd, payload = %payload, "Sending local command");
        self.send(cmd, &body).await?;

        let reply = self.receive_reply(cmd).await?;
        if reply.payload.is_empty() {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&reply.payload);
        tracing::debug!(command = reply.cmd, payload = %text, "Received local reply");
        serde_json::from_slice(&reply.payload)
            .map(Some)
            .map_err(|_| ProtocolError::UnexpectedPayload(text.into_owned()).into())
    }

    async fn negotiate(&mut self) -> Result<()> {
        let local_key = *self.codec.local_key();
        let local_nonce = cipher::random_bytes::<KEY_LEN>();

        self.send(CommandType::SessKeyNegStart, &local_nonce).await?;
        let reply = self.receive_reply(CommandType::SessKeyNegStart).await?;
        if reply.payload.len() < KEY_LEN + HMAC_LEN {
            return Err(handshake(format!(
                "reply too short ({} bytes)",
                reply.payload.len()
            )));
        }

        let (remote_nonce, proof) = reply.payload.split_at(KEY_LEN);
        if !cipher::verify_hmac(&local_key, &local_nonce, &proof[..HMAC_LEN]) {
            return Err(handshake("device proof mismatch (wrong local key?)".to_string()));
        }

        let answer = cipher::hmac_sha256(&local_key, remote_nonce);
        self.send(CommandType::SessKeyNegFinish, &answer).await?;

        let session_key = derive_session_key(
            self.codec.version(),
            &local_key,
            &local_nonce,
            remote_nonce,
        )?;
        self.codec.set_session_key(session_key);
        tracing::debug!("Session key negotiated");
        Ok(())
    }

    async fn send(&mut self, cmd: CommandType, payload: &[u8]) -> Result<()> {
        self.seqno = self.seqno.wrapping_add(1);
        let data = self.codec.encode(self.seqno, cmd, payload)?;
        tracing::trace!(frame = %hex::encode(&data), "Sending frame");

        match timeout(self.timeout, self.stream.write_all(&data)).await {
            Err(_) => Err(TransportError::Timeout(self.timeout).into()),
            Ok(result) => result.map_err(|e| io_error(e).into()),
        }
    }

    /// Reads frames until one answers `cmd`.
    ///
    /// Control commands also accept a status push, which some firmwares send
    /// instead of an acknowledgement.
    async fn receive_reply(&mut self, cmd: CommandType) -> Result<Message> {
        for _ in 0..=MAX_SKIPPED_FRAMES {
            let message = self.receive().await?;
            let matches = match cmd {
                CommandType::SessKeyNegStart => {
                    message.cmd == CommandType::SessKeyNegResp.code()
                }
                CommandType::Control | CommandType::ControlNew => {
                    message.cmd == cmd.code() || message.cmd == CommandType::Status.code()
                }
                other => message.cmd == other.code(),
            };
            if matches {
                return Ok(message);
            }
            tracing::debug!(command = message.cmd, "Skipping unrelated frame");
        }
        Err(ProtocolError::UnexpectedPayload(format!(
            "no reply to command {} after {MAX_SKIPPED_FRAMES} unrelated frames",
            cmd.code()
        ))
        .into())
    }

    async fn receive(&mut self) -> Result<Message> {
        let mut buf = vec![0u8; HEADER_LEN_55AA];
        self.read_exact(&mut buf[..4]).await?;

        let prefix = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let header_len = match prefix {
            PREFIX_55AA => HEADER_LEN_55AA,
            PREFIX_6699 => HEADER_LEN_6699,
            other => return Err(ProtocolError::from(FrameError::BadPrefix(other)).into()),
        };
        buf.resize(header_len, 0);
        self.read_exact(&mut buf[4..]).await?;

        let header = FrameHeader::parse(&buf).map_err(ProtocolError::from)?;
        let frame_len = header.frame_len();
        if frame_len > MAX_FRAME_LEN || frame_len < header_len {
            return Err(ProtocolError::from(FrameError::Length {
                declared: frame_len,
                available: MAX_FRAME_LEN,
            })
            .into());
        }
        buf.resize(frame_len, 0);
        self.read_exact(&mut buf[header_len..]).await?;

        tracing::trace!(frame = %hex::encode(&buf), "Received frame");
        self.codec.decode(&buf)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.timeout, self.stream.read_exact(buf)).await {
            Err(_) => Err(TransportError::Timeout(self.timeout).into()),
            Ok(result) => result.map(|_| ()).map_err(|e| io_error(e).into()),
        }
    }
}

/// Derives the session key from both nonces.
///
/// 3.4 encrypts `local XOR remote` with AES-ECB; 3.5 takes the AES-GCM
/// ciphertext of the same value with the first 12 bytes of the local nonce
/// as IV.
///
/// # Errors
///
/// Returns `ProtocolError::Handshake` if the nonces are not 16 bytes.
pub fn derive_session_key(
    version: LocalVersion,
    local_key: &Key,
    local_nonce: &[u8],
    remote_nonce: &[u8],
) -> Result<Key> {
    if local_nonce.len() != KEY_LEN || remote_nonce.len() != KEY_LEN {
        return Err(handshake("nonces must be 16 bytes".to_string()));
    }
    let mut mixed = [0u8; KEY_LEN];
    for (out, (a, b)) in mixed.iter_mut().zip(local_nonce.iter().zip(remote_nonce)) {
        *out = a ^ b;
    }

    let encrypted = if version == LocalVersion::V35 {
        let mut iv = [0u8; GCM_IV_LEN];
        iv.copy_from_slice(&local_nonce[..GCM_IV_LEN]);
        cipher::gcm_encrypt(local_key, &iv, &[], &mixed)?
    } else {
        cipher::ecb_encrypt(local_key, &mixed, false)?
    };

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&encrypted[..KEY_LEN]);
    Ok(key)
}

fn handshake(message: String) -> crate::error::Error {
    ProtocolError::Handshake(message).into()
}

fn io_error(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ConnectionClosed
    } else {
        TransportError::Io(e)
    }
}

fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Key = *b"0123456789abcdef";

    #[test]
    fn session_key_v34_is_ecb_of_xor() {
        let local = [0x11u8; 16];
        let remote = [0x22u8; 16];
        let key = derive_session_key(LocalVersion::V34, &KEY, &local, &remote).unwrap();

        let expected = cipher::ecb_encrypt(&KEY, &[0x33u8; 16], false).unwrap();
        assert_eq!(key.as_slice(), expected.as_slice());
    }

    #[test]
    fn session_key_v35_is_gcm_ciphertext() {
        let local = [0x11u8; 16];
        let remote = [0x22u8; 16];
        let key = derive_session_key(LocalVersion::V35, &KEY, &local, &remote).unwrap();

        let sealed = cipher::gcm_encrypt(&KEY, &[0x11u8; 12], &[], &[0x33u8; 16]).unwrap();
        assert_eq!(key.as_slice(), &sealed[..16]);
        assert_ne!(
            key,
            derive_session_key(LocalVersion::V34, &KEY, &local, &remote).unwrap()
        );
    }

    #[test]
    fn session_key_requires_full_nonces() {
        assert!(derive_session_key(LocalVersion::V34, &KEY, &[0; 8], &[0; 16]).is_err());
    }

    #[test]
    fn eof_maps_to_connection_closed() {
        let err = io_error(std::io::ErrorKind::UnexpectedEof.into());
        assert!(matches!(err, TransportError::ConnectionClosed));

        let err = io_error(std::io::ErrorKind::ConnectionReset.into());
        assert!(matches!(err, TransportError::Io(_)));
    }
}
