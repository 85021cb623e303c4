// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic primitives of the encrypted local protocol.
//!
//! All keys are 16 bytes: the device's local key, or the per-session key
//! negotiated by versions 3.4 and 3.5.

use aes::Aes128;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes_gcm::Aes128Gcm;
use aes_gcm::aead::{Aead, Payload};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{ConfigError, FrameError, ProtocolError};

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// A 16-byte AES key.
pub type Key = [u8; KEY_LEN];

/// Length of every key used by the protocol.
pub const KEY_LEN: usize = 16;
/// Length of an HMAC-SHA256 tag.
pub const HMAC_LEN: usize = 32;
/// Length of an AES-GCM nonce.
pub const GCM_IV_LEN: usize = 12;
/// Length of an AES-GCM tag.
pub const GCM_TAG_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Converts the configured local key into key bytes.
///
/// # Errors
///
/// Returns `ConfigError::InvalidLocalKey` unless the key is exactly 16 bytes.
pub fn parse_key(local_key: &str) -> Result<Key, ConfigError> {
    local_key
        .as_bytes()
        .try_into()
        .map_err(|_| ConfigError::InvalidLocalKey(local_key.len()))
}

/// AES-128-ECB encryption, PKCS#7 padded when `pad` is set.
///
/// Without padding, `data` must be a whole number of blocks.
///
/// # Errors
///
/// Returns `ProtocolError::Decrypt` for unpadded input that is not block aligned.
pub fn ecb_encrypt(key: &Key, data: &[u8], pad: bool) -> Result<Vec<u8>, ProtocolError> {
    let cipher = Aes128EcbEnc::new(key.into());
    if pad {
        return Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data));
    }
    if data.len() % BLOCK_LEN != 0 {
        return Err(ProtocolError::Decrypt(format!(
            "{} bytes is not a whole number of blocks",
            data.len()
        )));
    }
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// AES-128-ECB decryption with PKCS#7 unpadding.
///
/// # Errors
///
/// Returns `ProtocolError::Decrypt` if the input is not block aligned or the
/// padding is invalid, which almost always means the wrong key.
pub fn ecb_decrypt(key: &Key, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(ProtocolError::Decrypt(format!(
            "{} bytes is not a whole number of blocks",
            data.len()
        )));
    }
    Aes128EcbDec::new(key.into())
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| ProtocolError::Decrypt("bad padding (wrong local key?)".to_string()))
}

/// AES-128-GCM encryption; returns ciphertext followed by the 16-byte tag.
///
/// # Errors
///
/// Returns `ProtocolError::Decrypt` if the AEAD rejects the input.
pub fn gcm_encrypt(
    key: &Key,
    iv: &[u8; GCM_IV_LEN],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    Aes128Gcm::new(key.into())
        .encrypt(iv.into(), Payload { msg: data, aad })
        .map_err(|_| ProtocolError::Decrypt("AES-GCM encryption failed".to_string()))
}

/// AES-128-GCM decryption of ciphertext followed by its tag.
///
/// # Errors
///
/// Returns `FrameError::Tag` if authentication fails.
pub fn gcm_decrypt(
    key: &Key,
    iv: &[u8; GCM_IV_LEN],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    Aes128Gcm::new(key.into())
        .decrypt(iv.into(), Payload { msg: data, aad })
        .map_err(|_| FrameError::Tag.into())
}

/// HMAC-SHA256 of `data`.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_LEN] {
    let mut tag = [0u8; HMAC_LEN];
    // HMAC takes keys of any length
    if let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) {
        mac.update(data);
        tag.copy_from_slice(&mac.finalize().into_bytes());
    }
    tag
}

/// Verifies an HMAC-SHA256 tag in constant time.
#[must_use]
pub fn verify_hmac(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    <HmacSha256 as Mac>::new_from_slice(key).is_ok_and(|mut mac| {
        mac.update(data);
        mac.verify_slice(tag).is_ok()
    })
}

/// Returns `N` random bytes.
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Encodes bytes as standard base64.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decodes standard base64.
///
/// # Errors
///
/// Returns `ProtocolError::Decrypt` on invalid base64.
pub fn base64_decode(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    BASE64
        .decode(data)
        .map_err(|e| ProtocolError::Decrypt(format!("invalid base64: {e}")))
}

/// Signature of a version 3.1 control payload: characters 8..24 of the
/// hex MD5 of `data=<b64>||lpv=3.1||<key>`.
#[must_use]
pub fn sign_v31(key: &Key, b64: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(b"data=");
    hasher.update(b64.as_bytes());
    hasher.update(b"||lpv=3.1||");
    hasher.update(key);
    let digest = hex::encode(hasher.finalize());
    digest[8..24].to_string()
}
