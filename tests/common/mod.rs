// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A scripted Tuya outlet listening on localhost.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use psucontrol_outlet::protocol::local::cipher::{self, Key};
use psucontrol_outlet::protocol::local::codec::{strip_version_header, version_header};
use psucontrol_outlet::protocol::local::derive_session_key;
use psucontrol_outlet::protocol::local::frame::{
    self, CommandType, FrameHeader, HEADER_LEN_55AA, HEADER_LEN_6699, Integrity, Message,
    PREFIX_6699,
};
use psucontrol_outlet::types::LocalVersion;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const DEVICE_ID: &str = "bf0123456789abcdefgh";
pub const LOCAL_KEY: &str = "0123456789abcdef";

#[derive(Debug, Default)]
struct Script {
    on: bool,
    connections: u32,
    requests: u32,
    drop_connections: u32,
    drop_requests: u32,
    error_reply: Option<String>,
    heartbeat_first: bool,
    last_control: Option<Value>,
}

/// Fake outlet state, shared with the test.
#[derive(Debug, Clone)]
pub struct FakeTuya {
    version: LocalVersion,
    local_key: Key,
    script: Arc<Mutex<Script>>,
}

impl FakeTuya {
    pub fn new(version: LocalVersion) -> Self {
        Self {
            version,
            local_key: cipher::parse_key(LOCAL_KEY).unwrap(),
            script: Arc::default(),
        }
    }

    /// Starts listening and returns the address to connect to.
    pub async fn start(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let device = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                {
                    let mut script = device.script.lock();
                    script.connections += 1;
                    if script.drop_connections > 0 {
                        script.drop_connections -= 1;
                        continue;
                    }
                }
                let device = device.clone();
                tokio::spawn(async move {
                    let _ = device.serve(stream).await;
                });
            }
        });
        addr
    }

    pub fn is_on(&self) -> bool {
        self.script.lock().on
    }

    pub fn set_on(&self, on: bool) {
        self.script.lock().on = on;
    }

    pub fn connections(&self) -> u32 {
        self.script.lock().connections
    }

    pub fn requests(&self) -> u32 {
        self.script.lock().requests
    }

    /// Closes the next `n` connections as soon as they are accepted.
    pub fn drop_connections(&self, n: u32) {
        self.script.lock().drop_connections = n;
    }

    /// Closes the connection instead of answering the next `n` requests.
    pub fn drop_requests(&self, n: u32) {
        self.script.lock().drop_requests = n;
    }

    /// Answers every request with an `Error` field.
    pub fn reply_with_error(&self, message: &str) {
        self.script.lock().error_reply = Some(message.to_string());
    }

    /// Sends a heartbeat before each reply.
    pub fn heartbeat_first(&self) {
        self.script.lock().heartbeat_first = true;
    }

    /// Returns the last control payload received.
    pub fn last_control(&self) -> Option<Value> {
        self.script.lock().last_control.clone()
    }

    async fn serve(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut session_key: Option<Key> = None;
        let mut client_nonce = Vec::new();
        let remote_nonce: [u8; 16] = *b"fedcba9876543210";
        let mut seqno = 0u32;

        loop {
            let raw = read_frame(&mut stream).await?;
            let key = session_key.unwrap_or(self.local_key);
            let Some(request) = self.decode(&raw, &key) else {
                return Ok(());
            };

            let reply = match request.command() {
                Some(CommandType::SessKeyNegStart) => {
                    client_nonce.clone_from(&request.payload);
                    let mut payload = remote_nonce.to_vec();
                    payload.extend_from_slice(&cipher::hmac_sha256(&self.local_key, &client_nonce));
                    Some((CommandType::SessKeyNegResp, payload))
                }
                Some(CommandType::SessKeyNegFinish) => {
                    let expected = cipher::hmac_sha256(&self.local_key, &remote_nonce);
                    if request.payload != expected {
                        return Ok(());
                    }
                    session_key = Some(
                        derive_session_key(self.version, &self.local_key, &client_nonce, &remote_nonce)
                            .unwrap(),
                    );
                    None
                }
                Some(cmd @ (CommandType::DpQuery | CommandType::DpQueryNew)) => {
                    if self.take_dropped_request() {
                        return Ok(());
                    }
                    Some((cmd, self.status_body()))
                }
                Some(cmd @ (CommandType::Control | CommandType::ControlNew)) => {
                    if self.take_dropped_request() {
                        return Ok(());
                    }
                    let body: Value = serde_json::from_slice(&request.payload).unwrap();
                    let dps = body
                        .get("dps")
                        .or_else(|| body.pointer("/data/dps"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    {
                        let mut script = self.script.lock();
                        if let Some(on) = dps.get("1").and_then(Value::as_bool) {
                            script.on = on;
                        }
                        script.last_control = Some(body);
                    }
                    // Older firmwares answer a control command with a status push
                    let reply = if cmd == CommandType::Control {
                        CommandType::Status
                    } else {
                        cmd
                    };
                    Some((reply, self.status_body()))
                }
                _ => None,
            };

            if let Some((cmd, payload)) = reply {
                let heartbeat = self.script.lock().heartbeat_first;
                if heartbeat {
                    seqno += 1;
                    let frame = self.encode(seqno, CommandType::HeartBeat, Vec::new(), &key);
                    stream.write_all(&frame).await?;
                }
                seqno += 1;
                let key = session_key.unwrap_or(self.local_key);
                let frame = self.encode(seqno, cmd, payload, &key);
                stream.write_all(&frame).await?;
            }
        }
    }

    fn take_dropped_request(&self) -> bool {
        let mut script = self.script.lock();
        script.requests += 1;
        if script.drop_requests > 0 {
            script.drop_requests -= 1;
            return true;
        }
        false
    }

    fn status_body(&self) -> Vec<u8> {
        let script = self.script.lock();
        let body = match &script.error_reply {
            Some(message) => json!({ "Error": message, "Err": "900" }),
            None => json!({
                "devId": DEVICE_ID,
                "dps": { "1": script.on, "18": 125, "19": 268, "20": 2304 },
            }),
        };
        serde_json::to_vec(&body).unwrap()
    }

    /// Verifies and decrypts a client frame; `None` if it does not check out.
    fn decode(&self, raw: &[u8], key: &Key) -> Option<Message> {
        let mut message = match self.version {
            LocalVersion::V35 => frame::decode_6699(raw, key, false).ok()?,
            LocalVersion::V34 => frame::decode_55aa(raw, Integrity::HmacSha256(key), false).ok()?,
            _ => frame::decode_55aa(raw, Integrity::Crc32, false).ok()?,
        };
        message.payload = match self.version {
            LocalVersion::V31 => {
                if message.payload.starts_with(b"3.1") {
                    let encrypted = cipher::base64_decode(&message.payload[19..]).ok()?;
                    cipher::ecb_decrypt(key, &encrypted).ok()?
                } else {
                    message.payload
                }
            }
            LocalVersion::V32 | LocalVersion::V33 => {
                let body = strip_version_header(&message.payload, self.version);
                cipher::ecb_decrypt(key, body).ok()?
            }
            LocalVersion::V34 => {
                let plain = cipher::ecb_decrypt(key, &message.payload).ok()?;
                strip_version_header(&plain, self.version).to_vec()
            }
            LocalVersion::V35 => strip_version_header(&message.payload, self.version).to_vec(),
        };
        Some(message)
    }

    fn encode(&self, seqno: u32, cmd: CommandType, payload: Vec<u8>, key: &Key) -> Vec<u8> {
        match self.version {
            LocalVersion::V31 => frame::encode_55aa(
                &Message::new(seqno, cmd, payload).with_retcode(0),
                Integrity::Crc32,
            ),
            LocalVersion::V32 | LocalVersion::V33 => {
                let mut body = Vec::new();
                if cmd == CommandType::Status {
                    body.extend_from_slice(&version_header(self.version));
                }
                body.extend(cipher::ecb_encrypt(key, &payload, true).unwrap());
                frame::encode_55aa(&Message::new(seqno, cmd, body).with_retcode(0), Integrity::Crc32)
            }
            LocalVersion::V34 => {
                let body = if payload.is_empty() {
                    payload
                } else {
                    cipher::ecb_encrypt(key, &payload, true).unwrap()
                };
                frame::encode_55aa(
                    &Message::new(seqno, cmd, body).with_retcode(0),
                    Integrity::HmacSha256(key),
                )
            }
            LocalVersion::V35 => {
                let iv = cipher::random_bytes::<{ cipher::GCM_IV_LEN }>();
                frame::encode_6699(&Message::new(seqno, cmd, payload).with_retcode(0), key, &iv)
                    .unwrap()
            }
        }
    }
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; 4];
    stream.read_exact(&mut buf).await?;
    let prefix = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let header_len = if prefix == PREFIX_6699 {
        HEADER_LEN_6699
    } else {
        HEADER_LEN_55AA
    };
    buf.resize(header_len, 0);
    stream.read_exact(&mut buf[4..]).await?;

    let header = FrameHeader::parse(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    buf.resize(header.frame_len(), 0);
    stream.read_exact(&mut buf[header_len..]).await?;
    Ok(buf)
}
