//! peerlink public prelude.
//! Import with: `use peerlink::prelude::*;`
//!
//! Covers what a node needs to dial peers and serve the peer RPCs. Lower
//! level pieces (transport, verifiers, wire frames) stay behind their modules.

pub use crate::config::{Config, DialSettings, RetryPolicy};
pub use crate::error::{DialError, TransportError};
pub use crate::network::{
    BasicHandshakeProvider, BasicHandshakeValidator, DialOutcome, Direction, Handshake,
    HandshakeProvider, HandshakeService, HandshakeStatus, HandshakeValidator, LocalKeyProvider,
    Peer, PeerConnectionInfo, PeerDialer, PeerListener, Rejection, StaticKeyProvider,
};
pub use crate::security::{crypto_provider, TlsIdentity};
