// src/error.rs

use std::time::Duration;
use thiserror::Error;

/// Failure of a single RPC exchange on an authenticated channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("connection reset: {0}")]
    Reset(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("pinned certificate mismatch: {0}")]
    PinMismatch(String),
    #[error("tls failure: {0}")]
    Tls(String),
    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("remote reported failure: {0}")]
    Remote(String),
    #[error("channel is shut down")]
    Closed,
}

impl TransportError {
    /// Transient failures are the only ones the retry interceptor re-issues.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Unavailable(_) | TransportError::Reset(_) | TransportError::Timeout(_)
        )
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable => TransportError::Unavailable(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => TransportError::Reset(err.to_string()),
            ErrorKind::TimedOut => TransportError::Timeout(Duration::ZERO),
            ErrorKind::InvalidData => {
                let text = err.to_string();
                if text.contains("pinned") {
                    TransportError::PinMismatch(text)
                } else {
                    TransportError::Tls(text)
                }
            }
            _ => TransportError::Io(err.to_string()),
        }
    }
}

/// Infrastructure failures of a dial attempt. Protocol rejections are not
/// errors; see [`crate::network::dialer::DialOutcome`].
#[derive(Debug, Error)]
pub enum DialError {
    #[error("certificate retrieval from {address} failed: {reason}")]
    CertificateRetrieval { address: String, reason: String },
    #[error("channel construction failed: {0}")]
    ChannelConstruction(String),
    #[error("local identity unavailable: {0}")]
    LocalIdentity(String),
    #[error("illegal dial transition {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("{method} call failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: TransportError,
    },
}

impl DialError {
    pub fn certificate_retrieval(address: &str, reason: impl Into<String>) -> Self {
        DialError::CertificateRetrieval {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_certificate_retrieval(&self) -> bool {
        matches!(self, DialError::CertificateRetrieval { .. })
    }
}
