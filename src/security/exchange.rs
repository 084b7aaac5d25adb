// src/security/exchange.rs

use crate::config::DialSettings;
use crate::constants::PINNED_SERVER_NAME;
use crate::error::DialError;
use crate::events::model::LogLevel;
use crate::network::events::emit_certificate_event;
use crate::security::certificate::RemoteCertificate;
use crate::security::verifier::HarvestingVerifier;
use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// First phase of a dial: obtain the certificate a remote presents.
#[async_trait]
pub trait CertificateExchange: Send + Sync {
    async fn retrieve(&self, address: &str) -> Result<RemoteCertificate, DialError>;
}

/// Probe over a throwaway TLS connection. The connection accepts any
/// certificate, reads the leaf, and is closed before returning. Nothing is
/// cached between calls, so every dial pins what the remote presents now.
pub struct TlsCertificateExchange {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsCertificateExchange {
    pub fn new(settings: &DialSettings, provider: Arc<CryptoProvider>) -> Result<Self, DialError> {
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| DialError::ChannelConstruction(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(HarvestingVerifier::new(provider)))
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout: settings.dial_timeout,
        })
    }

    async fn probe(&self, address: &str) -> Result<CertificateDer<'static>, String> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| format!("connect: {}", e))?;
        let server_name = ServerName::try_from(PINNED_SERVER_NAME)
            .map_err(|e| format!("server name: {}", e))?;
        let mut tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| format!("tls handshake: {}", e))?;
        let leaf = tls
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|c| c.clone().into_owned());
        // Probe is done either way; a failed close_notify is irrelevant.
        let _ = tls.shutdown().await;
        leaf.ok_or_else(|| "remote presented no certificate".to_string())
    }
}

#[async_trait]
impl CertificateExchange for TlsCertificateExchange {
    async fn retrieve(&self, address: &str) -> Result<RemoteCertificate, DialError> {
        let outcome = match tokio::time::timeout(self.timeout, self.probe(address)).await {
            Ok(result) => result,
            Err(_) => Err(format!("probe timed out after {:?}", self.timeout)),
        };
        match outcome {
            Ok(der) => {
                let cert = RemoteCertificate::new(der);
                emit_certificate_event(
                    LogLevel::Info,
                    address,
                    "harvested",
                    Some(cert.fingerprint().to_string()),
                    cert.subject().ok(),
                );
                Ok(cert)
            }
            Err(reason) => {
                emit_certificate_event(
                    LogLevel::Warn,
                    address,
                    "harvest_failed",
                    None,
                    Some(reason.clone()),
                );
                Err(DialError::certificate_retrieval(address, reason))
            }
        }
    }
}
