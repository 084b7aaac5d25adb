// src/security/identity.rs

use crate::constants::PINNED_SERVER_NAME;
use crate::security::certificate::spki_fingerprint;
use anyhow::{anyhow, Context, Result};
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use std::io::BufReader;
use std::path::Path;

/// A certificate chain and its private key, ready to hand to rustls.
///
/// Dialers issue a fresh ephemeral identity for every attempt and drop it with
/// the channel. The listener uses one identity for its lifetime, either loaded
/// from PEM files or issued at startup.
#[derive(Debug)]
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Generate a new ECDSA P-256 key pair and a self-signed certificate whose
    /// subject CN and SAN are the fixed pinning name. Holds no shared state.
    pub fn issue_ephemeral() -> Result<Self> {
        let (cert, key_pair) = self_signed()?;
        Ok(Self {
            cert_chain: vec![cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }

    /// Same certificate shape as [`TlsIdentity::issue_ephemeral`], serialized
    /// as (certificate PEM, PKCS#8 key PEM) for a long-lived listener identity.
    pub fn issue_pem() -> Result<(String, String)> {
        let (cert, key_pair) = self_signed()?;
        Ok((cert.pem(), key_pair.serialize_pem()))
    }

    /// Load a PEM certificate chain and a PKCS#8 (or RSA) private key.
    pub fn load_pem<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        let cert_file = std::fs::File::open(cert_path)
            .with_context(|| format!("failed to open certificate {}", cert_path.display()))?;
        let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_file))
            .context("failed to parse certificate PEM")?
            .into_iter()
            .map(CertificateDer::from)
            .collect();
        if cert_chain.is_empty() {
            return Err(anyhow!("no certificate in {}", cert_path.display()));
        }

        let key_bytes = std::fs::read(key_path)
            .with_context(|| format!("failed to read private key {}", key_path.display()))?;
        let key = match pkcs8_private_keys(&mut key_bytes.as_slice())
            .context("failed to parse key PEM")?
            .pop()
        {
            Some(k) => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(k)),
            None => {
                let k = rsa_private_keys(&mut key_bytes.as_slice())
                    .context("failed to parse key PEM")?
                    .pop()
                    .ok_or_else(|| anyhow!("no private key in {}", key_path.display()))?;
                PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(k))
            }
        };
        Ok(Self { cert_chain, key })
    }

    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }

    pub fn fingerprint(&self) -> String {
        spki_fingerprint(self.certificate())
    }

    pub fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.cert_chain, self.key)
    }
}

fn self_signed() -> Result<(Certificate, KeyPair)> {
    let key_pair = KeyPair::generate().context("key generation failed")?;
    let mut params = CertificateParams::new(vec![PINNED_SERVER_NAME.to_string()])
        .context("invalid certificate parameters")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, PINNED_SERVER_NAME);
    params.distinguished_name = dn;
    let cert = params
        .self_signed(&key_pair)
        .context("self-signing failed")?;
    Ok((cert, key_pair))
}

/// Generate a throwaway hex public key, used when no account key is configured.
pub fn generate_node_public_key() -> Result<String> {
    let key_pair = KeyPair::generate().context("key generation failed")?;
    Ok(base16ct::lower::encode_string(key_pair.public_key_raw()))
}
