// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary frame codec.
//!
//! Versions 3.1 to 3.4 use the `55AA` frame:
//!
//! ```text
//! 000055AA | seqno | cmd | length | [retcode] | payload | crc32 or hmac | 0000AA55
//! ```
//!
//! Version 3.5 uses the `6699` frame, whose body is AES-GCM encrypted with
//! the header (after the prefix) as additional authenticated data:
//!
//! ```text
//! 00006699 | 0000 | seqno | cmd | length | iv | ciphertext | tag | 00009966
//! ```
//!
//! All integers are big-endian. `length` counts every byte after the header
//! for `55AA` and every byte between the header and the suffix for `6699`.

use super::cipher::{self, GCM_IV_LEN, GCM_TAG_LEN, HMAC_LEN, Key};
use crate::error::{FrameError, ProtocolError};

/// Prefix of a `55AA` frame.
pub const PREFIX_55AA: u32 = 0x0000_55AA;
/// Suffix of a `55AA` frame.
pub const SUFFIX_55AA: u32 = 0x0000_AA55;
/// Prefix of a `6699` frame.
pub const PREFIX_6699: u32 = 0x0000_6699;
/// Suffix of a `6699` frame.
pub const SUFFIX_6699: u32 = 0x0000_9966;

/// Header length of a `55AA` frame.
pub const HEADER_LEN_55AA: usize = 16;
/// Header length of a `6699` frame.
pub const HEADER_LEN_6699: usize = 18;

const CRC_LEN: usize = 4;
const SUFFIX_LEN: usize = 4;
const RETCODE_LEN: usize = 4;

/// Command codes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandType {
    /// Session key negotiation, client nonce.
    SessKeyNegStart = 3,
    /// Session key negotiation, device nonce and proof.
    SessKeyNegResp = 4,
    /// Session key negotiation, client proof.
    SessKeyNegFinish = 5,
    /// Set data points (3.1 to 3.3).
    Control = 7,
    /// Unsolicited status push.
    Status = 8,
    /// Keep-alive.
    HeartBeat = 9,
    /// Query data points (3.1 to 3.3).
    DpQuery = 10,
    /// Set data points (3.4 and later).
    ControlNew = 13,
    /// Query data points (3.4 and later).
    DpQueryNew = 16,
}

impl CommandType {
    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            3 => Self::SessKeyNegStart,
            4 => Self::SessKeyNegResp,
            5 => Self::SessKeyNegFinish,
            7 => Self::Control,
            8 => Self::Status,
            9 => Self::HeartBeat,
            10 => Self::DpQuery,
            13 => Self::ControlNew,
            16 => Self::DpQueryNew,
            _ => return None,
        })
    }

    /// Returns true if payloads of this command carry the version header
    /// (`"3.x"` followed by 12 zero bytes) on versions 3.2 and later.
    #[must_use]
    pub const fn takes_version_header(self) -> bool {
        !matches!(
            self,
            Self::DpQuery
                | Self::DpQueryNew
                | Self::HeartBeat
                | Self::SessKeyNegStart
                | Self::SessKeyNegResp
                | Self::SessKeyNegFinish
        )
    }
}

/// A decoded frame.
///
/// `retcode` is only present on device-to-client frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence number.
    pub seqno: u32,
    /// Command code.
    pub cmd: u32,
    /// Return code.
    pub retcode: Option<u32>,
    /// Frame payload (still ECB-encrypted for `55AA` frames).
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a client-to-device message.
    #[must_use]
    pub fn new(seqno: u32, cmd: CommandType, payload: Vec<u8>) -> Self {
        Self {
            seqno,
            cmd: cmd.code(),
            retcode: None,
            payload,
        }
    }

    /// Adds a return code, as devices do.
    #[must_use]
    pub fn with_retcode(mut self, retcode: u32) -> Self {
        self.retcode = Some(retcode);
        self
    }

    /// Returns the command type, if known.
    #[must_use]
    pub fn command(&self) -> Option<CommandType> {
        CommandType::from_code(self.cmd)
    }
}

/// Integrity check of a `55AA` frame.
#[derive(Debug, Clone, Copy)]
pub enum Integrity<'a> {
    /// CRC32 trailer (3.1 to 3.3).
    Crc32,
    /// HMAC-SHA256 trailer keyed with the given key (3.4).
    HmacSha256(&'a [u8]),
}

impl Integrity<'_> {
    const fn trailer_len(&self) -> usize {
        match self {
            Self::Crc32 => CRC_LEN,
            Self::HmacSha256(_) => HMAC_LEN,
        }
    }
}

/// The fixed-size header at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// `PREFIX_55AA` or `PREFIX_6699`.
    pub prefix: u32,
    /// Sequence number.
    pub seqno: u32,
    /// Command code.
    pub cmd: u32,
    /// Declared length.
    pub length: u32,
}

impl FrameHeader {
    /// Parses a header from the start of `buf`.
    ///
    /// `buf` must hold at least [`HEADER_LEN_55AA`] bytes, or
    /// [`HEADER_LEN_6699`] bytes for a `6699` frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::BadPrefix` for an unknown prefix and
    /// `FrameError::Length` if `buf` is too short.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < 4 {
            return Err(FrameError::Length {
                declared: HEADER_LEN_55AA,
                available: buf.len(),
            });
        }
        let prefix = read_u32(buf, 0);
        let offset = match prefix {
            PREFIX_55AA => 4,
            PREFIX_6699 => 6,
            other => return Err(FrameError::BadPrefix(other)),
        };
        let header_len = offset + 12;
        if buf.len() < header_len {
            return Err(FrameError::Length {
                declared: header_len,
                available: buf.len(),
            });
        }
        Ok(Self {
            prefix,
            seqno: read_u32(buf, offset),
            cmd: read_u32(buf, offset + 4),
            length: read_u32(buf, offset + 8),
        })
    }

    /// Returns the header length for this prefix.
    #[must_use]
    pub const fn header_len(&self) -> usize {
        if self.prefix == PREFIX_6699 {
            HEADER_LEN_6699
        } else {
            HEADER_LEN_55AA
        }
    }

    /// Returns the total frame length, header and suffix included.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        let length = self.length as usize;
        if self.prefix == PREFIX_6699 {
            HEADER_LEN_6699 + length + SUFFIX_LEN
        } else {
            HEADER_LEN_55AA + length
        }
    }
}

/// Encodes a `55AA` frame.
#[must_use]
pub fn encode_55aa(message: &Message, integrity: Integrity<'_>) -> Vec<u8> {
    let retcode_len = if message.retcode.is_some() {
        RETCODE_LEN
    } else {
        0
    };
    let length = retcode_len + message.payload.len() + integrity.trailer_len() + SUFFIX_LEN;

    let mut frame = Vec::with_capacity(HEADER_LEN_55AA + length);
    frame.extend_from_slice(&PREFIX_55AA.to_be_bytes());
    frame.extend_from_slice(&message.seqno.to_be_bytes());
    frame.extend_from_slice(&message.cmd.to_be_bytes());
    frame.extend_from_slice(&wire_len(length).to_be_bytes());
    if let Some(retcode) = message.retcode {
        frame.extend_from_slice(&retcode.to_be_bytes());
    }
    frame.extend_from_slice(&message.payload);

    match integrity {
        Integrity::Crc32 => {
            let crc = crc32fast::hash(&frame);
            frame.extend_from_slice(&crc.to_be_bytes());
        }
        Integrity::HmacSha256(key) => {
            let tag = cipher::hmac_sha256(key, &frame);
            frame.extend_from_slice(&tag);
        }
    }
    frame.extend_from_slice(&SUFFIX_55AA.to_be_bytes());
    frame
}

/// Decodes and verifies a `55AA` frame.
///
/// With `expect_retcode`, a leading word whose top three bytes are zero is
/// taken as the device return code.
///
/// # Errors
///
/// Returns `FrameError` for a malformed frame or a failed integrity check.
pub fn decode_55aa(
    frame: &[u8],
    integrity: Integrity<'_>,
    expect_retcode: bool,
) -> Result<Message, FrameError> {
    let header = FrameHeader::parse(frame)?;
    if header.prefix != PREFIX_55AA {
        return Err(FrameError::BadPrefix(header.prefix));
    }
    let total = header.frame_len();
    let trailer = integrity.trailer_len() + SUFFIX_LEN;
    if frame.len() < total || (header.length as usize) < trailer {
        return Err(FrameError::Length {
            declared: total,
            available: frame.len(),
        });
    }

    let suffix = read_u32(frame, total - SUFFIX_LEN);
    if suffix != SUFFIX_55AA {
        return Err(FrameError::BadSuffix(suffix));
    }

    let body_end = total - trailer;
    let signed = &frame[..body_end];
    let check = &frame[body_end..total - SUFFIX_LEN];
    match integrity {
        Integrity::Crc32 => {
            if crc32fast::hash(signed).to_be_bytes() != check {
                return Err(FrameError::Crc);
            }
        }
        Integrity::HmacSha256(key) => {
            if !cipher::verify_hmac(key, signed, check) {
                return Err(FrameError::Tag);
            }
        }
    }

    let (retcode, payload) = split_retcode(&frame[HEADER_LEN_55AA..body_end], expect_retcode);
    Ok(Message {
        seqno: header.seqno,
        cmd: header.cmd,
        retcode,
        payload: payload.to_vec(),
    })
}

/// Encodes a `6699` frame, encrypting return code and payload with `key`.
///
/// # Errors
///
/// Returns `ProtocolError::Decrypt` if encryption fails.
pub fn encode_6699(
    message: &Message,
    key: &Key,
    iv: &[u8; GCM_IV_LEN],
) -> Result<Vec<u8>, ProtocolError> {
    let mut plaintext = Vec::with_capacity(RETCODE_LEN + message.payload.len());
    if let Some(retcode) = message.retcode {
        plaintext.extend_from_slice(&retcode.to_be_bytes());
    }
    plaintext.extend_from_slice(&message.payload);

    let length = GCM_IV_LEN + plaintext.len() + GCM_TAG_LEN;
    let mut frame = Vec::with_capacity(HEADER_LEN_6699 + length + SUFFIX_LEN);
    frame.extend_from_slice(&PREFIX_6699.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&message.seqno.to_be_bytes());
    frame.extend_from_slice(&message.cmd.to_be_bytes());
    frame.extend_from_slice(&wire_len(length).to_be_bytes());

    let sealed = cipher::gcm_encrypt(key, iv, &frame[4..HEADER_LEN_6699], &plaintext)?;
    frame.extend_from_slice(iv);
    frame.extend_from_slice(&sealed);
    frame.extend_from_slice(&SUFFIX_6699.to_be_bytes());
    Ok(frame)
}

/// Decodes, authenticates and decrypts a `6699` frame.
///
/// # Errors
///
/// Returns `ProtocolError::Frame` for a malformed frame or a failed tag check.
pub fn decode_6699(frame: &[u8], key: &Key, expect_retcode: bool) -> Result<Message, ProtocolError> {
    let header = FrameHeader::parse(frame)?;
    if header.prefix != PREFIX_6699 {
        return Err(FrameError::BadPrefix(header.prefix).into());
    }
    let total = header.frame_len();
    if frame.len() < total || (header.length as usize) < GCM_IV_LEN + GCM_TAG_LEN {
        return Err(FrameError::Length {
            declared: total,
            available: frame.len(),
        }
        .into());
    }

    let suffix = read_u32(frame, total - SUFFIX_LEN);
    if suffix != SUFFIX_6699 {
        return Err(FrameError::BadSuffix(suffix).into());
    }

    let mut iv = [0u8; GCM_IV_LEN];
    iv.copy_from_slice(&frame[HEADER_LEN_6699..HEADER_LEN_6699 + GCM_IV_LEN]);
    let sealed = &frame[HEADER_LEN_6699 + GCM_IV_LEN..total - SUFFIX_LEN];
    let plaintext = cipher::gcm_decrypt(key, &iv, &frame[4..HEADER_LEN_6699], sealed)?;

    let (retcode, payload) = split_retcode(&plaintext, expect_retcode);
    Ok(Message {
        seqno: header.seqno,
        cmd: header.cmd,
        retcode,
        payload: payload.to_vec(),
    })
}

fn split_retcode(body: &[u8], expect_retcode: bool) -> (Option<u32>, &[u8]) {
    if expect_retcode && body.len() >= RETCODE_LEN && body[..3] == [0, 0, 0] {
        (Some(read_u32(body, 0)), &body[RETCODE_LEN..])
    } else {
        (None, body)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(word)
}

// Frames are a few hundred bytes at most
#[allow(clippy::cast_possible_truncation)]
const fn wire_len(length: usize) -> u32 {
    length as u32
}
