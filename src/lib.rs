//! # peerlink
//!
//! Peer-connection layer for blockchain nodes: dials remote nodes, pins their
//! self-signed TLS certificates and performs the application handshake before
//! any consensus or gossip traffic is allowed on the link.
//!
//! ## Design Principles
//! * Async-first: every network step is a Tokio future with an explicit timeout.
//! * Trust-on-first-use: certificates are harvested by a probe connection and
//!   pinned byte-for-byte on the authenticated channel. No CA chain.
//! * Cross-cutting call behaviour (auth metadata, transport retry) lives in an
//!   interceptor chain, not in the protocol code.
//! * Protocol rejections are values; infrastructure failures are errors.
//! * Event-driven instrumentation (JSON line audit log + console).
//!
//! ## Key Modules
//! * `config` – Runtime configuration (TOML) and effective dial settings.
//! * `security` – Certificate harvesting, ephemeral identities, pinning verifiers.
//! * `network` – RPC wire messages, interceptors, channel factory, handshake
//!   engine, dialer and the peer service listener.
//! * `events` – Structured logging/events dispatcher.
//!
//! ## Dial flow
//! ```text
//! dial_outbound: probe cert -> pinned channel -> DoHandshake -> validate -> Peer
//! dial_back:     probe cert -> pinned channel -> Ping                -> Peer
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod network;
pub mod prelude;
pub mod security;

pub use error::{DialError, TransportError};
