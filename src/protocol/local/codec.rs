// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Version-specific payload encryption on top of the frame codec.

use super::cipher::{self, Key};
use super::frame::{self, CommandType, Integrity, Message, PREFIX_6699};
use crate::error::{ProtocolError, Result};
use crate::types::LocalVersion;

/// Length of the version header: `"3.x"` followed by 12 zero bytes.
pub const VERSION_HEADER_LEN: usize = 15;

/// Builds the version header for `version`.
#[must_use]
pub fn version_header(version: LocalVersion) -> [u8; VERSION_HEADER_LEN] {
    let mut header = [0u8; VERSION_HEADER_LEN];
    header[..3].copy_from_slice(version.as_bytes());
    header
}

/// Removes a leading version header, if present.
#[must_use]
pub fn strip_version_header(payload: &[u8], version: LocalVersion) -> &[u8] {
    if payload.len() >= VERSION_HEADER_LEN && payload.starts_with(version.as_bytes()) {
        &payload[VERSION_HEADER_LEN..]
    } else {
        payload
    }
}

/// Client-side encoder/decoder for one session.
///
/// Holds the local key and, once negotiated, the session key.
#[derive(Clone)]
pub struct LocalCodec {
    version: LocalVersion,
    local_key: Key,
    session_key: Option<Key>,
}

impl std::fmt::Debug for LocalCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCodec")
            .field("version", &self.version)
            .field("session_key", &self.session_key.is_some())
            .finish_non_exhaustive()
    }
}

impl LocalCodec {
    /// Creates a codec using only the local key.
    #[must_use]
    pub fn new(version: LocalVersion, local_key: Key) -> Self {
        Self {
            version,
            local_key,
            session_key: None,
        }
    }

    /// Returns the protocol version.
    #[must_use]
    pub fn version(&self) -> LocalVersion {
        self.version
    }

    /// Returns the local key.
    #[must_use]
    pub fn local_key(&self) -> &Key {
        &self.local_key
    }

    /// Switches to a negotiated session key.
    pub fn set_session_key(&mut self, key: Key) {
        self.session_key = Some(key);
    }

    /// Drops the session key, falling back to the local key.
    pub fn clear_session_key(&mut self) {
        self.session_key = None;
    }

    fn key(&self) -> &Key {
        self.session_key.as_ref().unwrap_or(&self.local_key)
    }

    /// Encrypts and frames a plaintext payload.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if encryption fails.
    pub fn encode(&self, seqno: u32, cmd: CommandType, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key();
        let with_header = |body: &[u8]| {
            let mut out = version_header(self.version).to_vec();
            out.extend_from_slice(body);
            out
        };

        let frame = match self.version {
            LocalVersion::V31 => {
                let payload = if cmd == CommandType::Control {
                    let b64 = cipher::base64_encode(&cipher::ecb_encrypt(key, plaintext, true)?);
                    let signature = cipher::sign_v31(key, &b64);
                    format!("3.1{signature}{b64}").into_bytes()
                } else {
                    plaintext.to_vec()
                };
                frame::encode_55aa(&Message::new(seqno, cmd, payload), Integrity::Crc32)
            }
            LocalVersion::V32 | LocalVersion::V33 => {
                let encrypted = cipher::ecb_encrypt(key, plaintext, true)?;
                let payload = if cmd.takes_version_header() {
                    with_header(&encrypted)
                } else {
                    encrypted
                };
                frame::encode_55aa(&Message::new(seqno, cmd, payload), Integrity::Crc32)
            }
            LocalVersion::V34 => {
                let body = if cmd.takes_version_header() {
                    with_header(plaintext)
                } else {
                    plaintext.to_vec()
                };
                let payload = cipher::ecb_encrypt(key, &body, true)?;
                frame::encode_55aa(
                    &Message::new(seqno, cmd, payload),
                    Integrity::HmacSha256(key),
                )
            }
            LocalVersion::V35 => {
                let body = if cmd.takes_version_header() {
                    with_header(plaintext)
                } else {
                    plaintext.to_vec()
                };
                let iv = cipher::random_bytes::<{ cipher::GCM_IV_LEN }>();
                frame::encode_6699(&Message::new(seqno, cmd, body), key, &iv)?
            }
        };
        Ok(frame)
    }

    /// Verifies and decrypts a device frame; the returned message carries
    /// the plaintext payload with any version header removed.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for a malformed frame, a failed integrity
    /// check or a payload that does not decrypt.
    pub fn decode(&self, data: &[u8]) -> Result<Message> {
        let key = self.key();

        let mut message = match self.version {
            LocalVersion::V35 => frame::decode_6699(data, key, true)?,
            LocalVersion::V34 => frame::decode_55aa(data, Integrity::HmacSha256(key), true)
                .map_err(ProtocolError::from)?,
            _ => frame::decode_55aa(data, Integrity::Crc32, true).map_err(ProtocolError::from)?,
        };

        if message.payload.is_empty() {
            return Ok(message);
        }

        message.payload = match self.version {
            LocalVersion::V31 => self.decode_v31(&message.payload)?,
            LocalVersion::V32 | LocalVersion::V33 => {
                let body = strip_version_header(&message.payload, self.version);
                if body.first() == Some(&b'{') {
                    body.to_vec()
                } else {
                    cipher::ecb_decrypt(key, body)?
                }
            }
            LocalVersion::V34 => {
                let plain = cipher::ecb_decrypt(key, &message.payload)?;
                strip_version_header(&plain, self.version).to_vec()
            }
            LocalVersion::V35 => strip_version_header(&message.payload, self.version).to_vec(),
        };
        Ok(message)
    }

    fn decode_v31(&self, payload: &[u8]) -> Result<Vec<u8>> {
        // "3.1" + 16 hex chars of signature + base64 ciphertext
        const SIGNED_PREFIX_LEN: usize = 3 + 16;
        if payload.starts_with(LocalVersion::V31.as_bytes()) && payload.len() > SIGNED_PREFIX_LEN {
            let encrypted = cipher::base64_decode(&payload[SIGNED_PREFIX_LEN..])?;
            return Ok(cipher::ecb_decrypt(&self.local_key, &encrypted)?);
        }
        Ok(payload.to_vec())
    }

    /// Returns the frame prefix this codec produces.
    #[must_use]
    pub fn prefix(&self) -> u32 {
        if self.version == LocalVersion::V35 {
            PREFIX_6699
        } else {
            frame::PREFIX_55AA
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Key = *b"0123456789abcdef";

    fn device_frame_55aa(cmd: CommandType, payload: Vec<u8>, integrity: Integrity<'_>) -> Vec<u8> {
        frame::encode_55aa(&Message::new(1, cmd, payload).with_retcode(0), integrity)
    }

    #[test]
    fn version_header_layout() {
        let header = version_header(LocalVersion::V33);
        assert_eq!(&header[..3], b"3.3");
        assert!(header[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn v33_query_has_no_header() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let data = codec.encode(1, CommandType::DpQuery, b"{}").unwrap();
        let raw = frame::decode_55aa(&data, Integrity::Crc32, false).unwrap();
        assert_eq!(raw.payload.len(), 16);
        assert_eq!(cipher::ecb_decrypt(&KEY, &raw.payload).unwrap(), b"{}");
    }

    #[test]
    fn v33_control_has_plain_header_before_ciphertext() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let data = codec.encode(1, CommandType::Control, b"{}").unwrap();
        let raw = frame::decode_55aa(&data, Integrity::Crc32, false).unwrap();
        assert_eq!(&raw.payload[..3], b"3.3");
        assert_eq!(
            cipher::ecb_decrypt(&KEY, &raw.payload[VERSION_HEADER_LEN..]).unwrap(),
            b"{}"
        );
    }

    #[test]
    fn v33_decodes_encrypted_reply() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let encrypted = cipher::ecb_encrypt(&KEY, br#"{"dps":{"1":true}}"#, true).unwrap();
        let data = device_frame_55aa(CommandType::DpQuery, encrypted, Integrity::Crc32);

        let message = codec.decode(&data).unwrap();
        assert_eq!(message.retcode, Some(0));
        assert_eq!(message.payload, br#"{"dps":{"1":true}}"#);
    }

    #[test]
    fn v33_decodes_reply_with_version_header() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let mut payload = version_header(LocalVersion::V33).to_vec();
        payload.extend(cipher::ecb_encrypt(&KEY, br#"{"dps":{"1":false}}"#, true).unwrap());
        let data = device_frame_55aa(CommandType::Status, payload, Integrity::Crc32);

        assert_eq!(codec.decode(&data).unwrap().payload, br#"{"dps":{"1":false}}"#);
    }

    #[test]
    fn v33_passes_plain_json_through() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let data = device_frame_55aa(
            CommandType::Control,
            b"{\"Error\":\"bad\"}".to_vec(),
            Integrity::Crc32,
        );
        assert_eq!(codec.decode(&data).unwrap().payload, b"{\"Error\":\"bad\"}");
    }

    #[test]
    fn empty_ack_decodes() {
        let codec = LocalCodec::new(LocalVersion::V33, KEY);
        let data = device_frame_55aa(CommandType::Control, Vec::new(), Integrity::Crc32);
        let message = codec.decode(&data).unwrap();
        assert_eq!(message.cmd, CommandType::Control.code());
        assert!(message.payload.is_empty());
    }

    #[test]
    fn v31_control_is_signed_and_base64() {
        let codec = LocalCodec::new(LocalVersion::V31, KEY);
        let data = codec.encode(1, CommandType::Control, b"{}").unwrap();
        let raw = frame::decode_55aa(&data, Integrity::Crc32, false).unwrap();

        assert_eq!(&raw.payload[..3], b"3.1");
        let b64 = std::str::from_utf8(&raw.payload[19..]).unwrap();
        assert_eq!(&raw.payload[3..19], cipher::sign_v31(&KEY, b64).as_bytes());

        // The device echoes the same shape back
        let reply = device_frame_55aa(CommandType::Control, raw.payload, Integrity::Crc32);
        assert_eq!(codec.decode(&reply).unwrap().payload, b"{}");
    }

    #[test]
    fn v31_query_is_plain() {
        let codec = LocalCodec::new(LocalVersion::V31, KEY);
        let data = codec.encode(1, CommandType::DpQuery, b"{}").unwrap();
        let raw = frame::decode_55aa(&data, Integrity::Crc32, false).unwrap();
        assert_eq!(raw.payload, b"{}");
    }

    #[test]
    fn v34_uses_session_key_and_hmac() {
        let session_key = *b"fedcba9876543210";
        let mut codec = LocalCodec::new(LocalVersion::V34, KEY);
        codec.set_session_key(session_key);

        let data = codec.encode(4, CommandType::Control, b"{}").unwrap();
        assert!(frame::decode_55aa(&data, Integrity::HmacSha256(&KEY), false).is_err());
        let raw = frame::decode_55aa(&data, Integrity::HmacSha256(&session_key), false).unwrap();
        let plain = cipher::ecb_decrypt(&session_key, &raw.payload).unwrap();
        assert_eq!(&plain[..3], b"3.4");
        assert_eq!(&plain[VERSION_HEADER_LEN..], b"{}");

        let reply = frame::encode_55aa(
            &Message::new(4, CommandType::Control, plain.clone()).with_retcode(0),
            Integrity::HmacSha256(&session_key),
        );
        // Reply payload must be encrypted; a plaintext body does not decrypt
        assert!(codec.decode(&reply).is_err());

        let encrypted = cipher::ecb_encrypt(&session_key, &plain, true).unwrap();
        let reply = frame::encode_55aa(
            &Message::new(4, CommandType::Control, encrypted).with_retcode(0),
            Integrity::HmacSha256(&session_key),
        );
        assert_eq!(codec.decode(&reply).unwrap().payload, b"{}");
    }

    #[test]
    fn v35_uses_gcm_frames() {
        let mut codec = LocalCodec::new(LocalVersion::V35, KEY);
        codec.set_session_key(*b"fedcba9876543210");
        assert_eq!(codec.prefix(), PREFIX_6699);

        let data = codec.encode(9, CommandType::DpQueryNew, b"{}").unwrap();
        let raw = frame::decode_6699(&data, b"fedcba9876543210", false).unwrap();
        assert_eq!(raw.payload, b"{}");

        codec.clear_session_key();
        assert!(codec.decode(&data).is_err());
    }
}
