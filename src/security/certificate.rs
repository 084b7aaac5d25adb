// src/security/certificate.rs

use base16ct::lower::encode_string;
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};

/// Leaf certificate presented by a remote node during a probe. It is not
/// validated against any authority; its exact bytes become the pin for the
/// authenticated channel of the same dial attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCertificate {
    der: CertificateDer<'static>,
    fingerprint: String,
}

impl RemoteCertificate {
    pub fn new(der: CertificateDer<'static>) -> Self {
        let fingerprint = spki_fingerprint(&der);
        Self { der, fingerprint }
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// SHA-256 of the SubjectPublicKeyInfo, lowercase hex.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Parse the certificate and return its subject DN. Fails on material that
    /// is not a structurally valid X.509 certificate.
    pub fn subject(&self) -> Result<String, String> {
        x509_parser::parse_x509_certificate(self.der.as_ref())
            .map(|(_, parsed)| parsed.tbs_certificate.subject.to_string())
            .map_err(|e| format!("unparseable certificate: {}", e))
    }

    pub fn matches(&self, presented: &CertificateDer<'_>) -> bool {
        self.der.as_ref() == presented.as_ref()
    }
}

/// Extract SHA-256 fingerprint of certificate SubjectPublicKeyInfo (SPKI).
/// Falls back to hashing the full DER when the certificate cannot be parsed so
/// that every certificate still has a stable identifier for logs.
pub fn spki_fingerprint(cert: &CertificateDer<'_>) -> String {
    let der = cert.as_ref();
    let mut h = Sha256::new();
    match x509_parser::parse_x509_certificate(der) {
        Ok((_, parsed)) => h.update(parsed.tbs_certificate.subject_pki.raw),
        Err(_) => h.update(der),
    }
    encode_string(&h.finalize())
}
