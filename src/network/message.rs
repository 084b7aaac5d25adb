// src/network/message.rs
//
// Wire protocol of the peer service: one JSON object per line.
// Client sends `RpcRequest`, server answers with `RpcResponse` carrying the same id.

use crate::constants::{
    PUBLIC_KEY_METADATA_KEY, RETRY_COUNT_METADATA_KEY, SESSION_ID_LEN, TIMEOUT_METADATA_KEY,
};
use crate::error::TransportError;
use rand::RngCore;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Opaque per-attempt session identifier, hex on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = vec![0u8; SESSION_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base16ct::lower::encode_string(&self.0))
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        base16ct::mixed::decode_vec(text.as_bytes())
            .map(SessionId)
            .map_err(|e| D::Error::custom(format!("session id is not hex: {}", e)))
    }
}

/// Claims a node makes about itself when opening a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    /// Hex-encoded public key of the sender
    pub public_key: String,
    pub protocol_version: u32,
    pub chain_id: u32,
    /// Port the sender accepts peer connections on
    pub listening_port: u16,
    /// Unix seconds at creation
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub data: HandshakeData,
    pub session_id: SessionId,
    /// Produced by the handshake provider; opaque to the dialer.
    #[serde(default)]
    pub signature: String,
}

impl Handshake {
    /// Digest over the handshake data and session id. The default provider
    /// signs with it; custom providers may use something else entirely.
    pub fn digest(&self) -> String {
        let mut h = Sha256::new();
        h.update(serde_json::to_vec(&self.data).unwrap_or_default());
        h.update(self.session_id.as_bytes());
        base16ct::lower::encode_string(&h.finalize())
    }

    pub fn public_key(&self) -> &str {
        &self.data.public_key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    Ok,
    ProtocolMismatch,
    ChainMismatch,
    WrongSignature,
    InvalidHandshake,
    InvalidKey,
    DuplicateSession,
    Blacklisted,
    ConnectionRefused,
    Unknown,
}

impl HandshakeStatus {
    pub fn is_ok(self) -> bool {
        self == HandshakeStatus::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStatus::Ok => "ok",
            HandshakeStatus::ProtocolMismatch => "protocol_mismatch",
            HandshakeStatus::ChainMismatch => "chain_mismatch",
            HandshakeStatus::WrongSignature => "wrong_signature",
            HandshakeStatus::InvalidHandshake => "invalid_handshake",
            HandshakeStatus::InvalidKey => "invalid_key",
            HandshakeStatus::DuplicateSession => "duplicate_session",
            HandshakeStatus::Blacklisted => "blacklisted",
            HandshakeStatus::ConnectionRefused => "connection_refused",
            HandshakeStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub handshake: Handshake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub status: HandshakeStatus,
    pub handshake: Option<Handshake>,
}

impl HandshakeReply {
    pub fn ok(handshake: Handshake) -> Self {
        Self {
            status: HandshakeStatus::Ok,
            handshake: Some(handshake),
        }
    }

    pub fn rejected(status: HandshakeStatus) -> Self {
        Self {
            status,
            handshake: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {}

/// Metadata attached to every outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Transparent retries allowed for transient transport failures
    #[serde(rename = "retry-count")]
    pub retry_count: u32,
    /// Call deadline in milliseconds
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Hex public key of the caller, set by the auth interceptor
    #[serde(
        rename = "local-public-key",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub local_public_key: Option<String>,
}

impl CallMetadata {
    pub fn new(timeout: Duration, retry_count: u32) -> Self {
        Self {
            retry_count,
            timeout_ms: timeout.as_millis() as u64,
            local_public_key: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Key/value view, in wire key names.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (RETRY_COUNT_METADATA_KEY, self.retry_count.to_string()),
            (TIMEOUT_METADATA_KEY, self.timeout_ms.to_string()),
        ];
        if let Some(key) = &self.local_public_key {
            out.push((PUBLIC_KEY_METADATA_KEY, key.clone()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum RpcCall {
    DoHandshake(HandshakeRequest),
    Ping(PingRequest),
}

impl RpcCall {
    pub fn method(&self) -> &'static str {
        match self {
            RpcCall::DoHandshake(_) => "DoHandshake",
            RpcCall::Ping(_) => "Ping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum RpcReply {
    Handshake(HandshakeReply),
    Pong(PingReply),
    Failed { message: String },
}

impl RpcReply {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcReply::Handshake(_) => "handshake",
            RpcReply::Pong(_) => "pong",
            RpcReply::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub metadata: CallMetadata,
    pub call: RpcCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub reply: RpcReply,
}

/// A call on its way through the interceptor chain to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCall {
    pub metadata: CallMetadata,
    pub call: RpcCall,
}

impl OutboundCall {
    pub fn new(call: RpcCall, metadata: CallMetadata) -> Self {
        Self { metadata, call }
    }

    pub fn method(&self) -> &'static str {
        self.call.method()
    }
}

/// Serialize a frame (JSON + trailing newline), enforcing the send limit.
pub fn encode_frame<T: Serialize>(value: &T, limit: usize) -> Result<Vec<u8>, TransportError> {
    let mut bytes =
        serde_json::to_vec(value).map_err(|e| TransportError::Malformed(e.to_string()))?;
    if bytes.len() > limit {
        return Err(TransportError::MessageTooLarge {
            size: bytes.len(),
            limit,
        });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Read one frame, never buffering more than `limit` bytes of payload.
pub async fn read_frame<R, T>(reader: &mut R, limit: usize) -> Result<T, TransportError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| TransportError::from_io(&e))?;
    if n == 0 {
        return Err(TransportError::Reset("connection closed by peer".into()));
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() > limit {
            return Err(TransportError::MessageTooLarge {
                size: buf.len(),
                limit,
            });
        }
        return Err(TransportError::Reset("truncated frame".into()));
    }
    buf.pop();
    serde_json::from_slice(&buf).map_err(|e| TransportError::Malformed(e.to_string()))
}
