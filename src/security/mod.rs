//! Certificate material and TLS trust plumbing.
//!
//! * `certificate` – harvested remote certificates and SPKI fingerprints.
//! * `identity` – self-signed TLS identities (ephemeral per dial, or the node's own).
//! * `verifier` – rustls verifiers: harvesting (accept any), pinned, client recording.
//! * `exchange` – the probe connection that harvests a remote certificate.

pub mod certificate;
pub mod exchange;
pub mod identity;
pub mod verifier;

pub use certificate::{spki_fingerprint, RemoteCertificate};
pub use exchange::{CertificateExchange, TlsCertificateExchange};
pub use identity::TlsIdentity;

use rustls::crypto::CryptoProvider;
use std::sync::Arc;

/// Crypto provider shared by every rustls config this crate builds.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
