// src/network/channel.rs

use crate::config::DialSettings;
use crate::error::DialError;
use crate::events::model::LogLevel;
use crate::network::client::PeerClient;
use crate::network::events::emit_certificate_event;
use crate::network::interceptor::default_chain;
use crate::network::transport::{MessageLimits, TlsTransport};
use crate::security::certificate::RemoteCertificate;
use crate::security::identity::TlsIdentity;
use crate::security::verifier::PinnedCertVerifier;
use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Source of the local node's long-lived public identity (hex public key).
#[async_trait]
pub trait LocalKeyProvider: Send + Sync {
    async fn local_public_key(&self) -> anyhow::Result<String>;
}

/// Key known up front (config, or generated once at startup).
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    public_key: String,
}

impl StaticKeyProvider {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl LocalKeyProvider for StaticKeyProvider {
    async fn local_public_key(&self) -> anyhow::Result<String> {
        Ok(self.public_key.clone())
    }
}

/// Second phase of a dial: turn a harvested certificate into a ready client.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn create(
        &self,
        address: &str,
        remote: &RemoteCertificate,
    ) -> Result<PeerClient, DialError>;
}

/// Builds pinned TLS channels: fresh client identity per call, server
/// certificate pinned to the harvested bytes, fixed server name, message
/// limits, and the auth + retry interceptor chain.
pub struct TlsChannelFactory {
    settings: DialSettings,
    keys: Arc<dyn LocalKeyProvider>,
    provider: Arc<CryptoProvider>,
}

impl TlsChannelFactory {
    pub fn new(
        settings: DialSettings,
        keys: Arc<dyn LocalKeyProvider>,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            settings,
            keys,
            provider,
        }
    }

    fn client_config(
        &self,
        remote: &RemoteCertificate,
        identity: TlsIdentity,
    ) -> Result<ClientConfig, DialError> {
        let (chain, key) = identity.into_parts();
        let verifier = PinnedCertVerifier::new(remote.clone(), self.provider.clone());
        ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| DialError::ChannelConstruction(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_auth_cert(chain, key)
            .map_err(|e| DialError::ChannelConstruction(format!("client identity: {}", e)))
    }
}

#[async_trait]
impl ChannelFactory for TlsChannelFactory {
    async fn create(
        &self,
        address: &str,
        remote: &RemoteCertificate,
    ) -> Result<PeerClient, DialError> {
        let subject = remote.subject().map_err(DialError::ChannelConstruction)?;
        let identity = TlsIdentity::issue_ephemeral()
            .map_err(|e| DialError::ChannelConstruction(format!("ephemeral identity: {}", e)))?;
        let config = self.client_config(remote, identity)?;
        let transport = TlsTransport::new(
            address,
            TlsConnector::from(Arc::new(config)),
            MessageLimits {
                max_send: self.settings.max_send_message_bytes,
                max_receive: self.settings.max_receive_message_bytes,
            },
        );
        let public_key = self
            .keys
            .local_public_key()
            .await
            .map_err(|e| DialError::LocalIdentity(e.to_string()))?;
        emit_certificate_event(
            LogLevel::Debug,
            address,
            "pinned",
            Some(remote.fingerprint().to_string()),
            Some(subject),
        );
        Ok(PeerClient::new(
            address,
            Arc::new(transport),
            default_chain(&public_key, self.settings.retry),
        ))
    }
}
