// src/network/dialer.rs

use crate::config::DialSettings;
use crate::error::DialError;
use crate::network::channel::{ChannelFactory, LocalKeyProvider, TlsChannelFactory};
use crate::network::client::PeerClient;
use crate::network::handshake::{
    DialAttempt, DialState, HandshakeEngine, HandshakeProvider, HandshakeValidator,
};
use crate::network::message::{Handshake, HandshakeStatus};
use crate::network::peer::Peer;
use crate::security::exchange::{CertificateExchange, TlsCertificateExchange};
use rustls::crypto::CryptoProvider;
use std::fmt;
use std::sync::Arc;

/// Why a dial that reached the application layer produced no peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The remote answered DoHandshake with a non-ok status.
    Refused(HandshakeStatus),
    /// The remote's handshake failed local validation.
    Invalid(HandshakeStatus),
}

impl Rejection {
    pub fn status(&self) -> HandshakeStatus {
        match self {
            Rejection::Refused(s) | Rejection::Invalid(s) => *s,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Refused(s) => write!(f, "refused by remote: {}", s),
            Rejection::Invalid(s) => write!(f, "remote handshake invalid: {}", s),
        }
    }
}

#[derive(Debug)]
pub enum DialOutcome {
    Established(Peer),
    Rejected(Rejection),
}

impl DialOutcome {
    pub fn is_established(&self) -> bool {
        matches!(self, DialOutcome::Established(_))
    }

    pub fn into_peer(self) -> Option<Peer> {
        match self {
            DialOutcome::Established(peer) => Some(peer),
            DialOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            DialOutcome::Established(_) => None,
            DialOutcome::Rejected(r) => Some(*r),
        }
    }
}

/// Entry point for connecting to other nodes.
///
/// Each dial harvests the remote certificate, builds a channel pinned to it
/// and then either runs the outbound handshake or confirms an inbound one.
/// Cloning is cheap; clones share the same read-only collaborators, so dials
/// may run concurrently from as many tasks as needed.
#[derive(Clone)]
pub struct PeerDialer {
    exchange: Arc<dyn CertificateExchange>,
    channels: Arc<dyn ChannelFactory>,
    engine: Arc<HandshakeEngine>,
}

impl PeerDialer {
    pub fn new(
        exchange: Arc<dyn CertificateExchange>,
        channels: Arc<dyn ChannelFactory>,
        engine: Arc<HandshakeEngine>,
    ) -> Self {
        Self {
            exchange,
            channels,
            engine,
        }
    }

    /// Dialer over real TLS connections.
    pub fn from_settings(
        settings: &DialSettings,
        keys: Arc<dyn LocalKeyProvider>,
        provider: Arc<dyn HandshakeProvider>,
        validator: Arc<dyn HandshakeValidator>,
        crypto: Arc<CryptoProvider>,
    ) -> Result<Self, DialError> {
        let exchange = TlsCertificateExchange::new(settings, crypto.clone())?;
        let channels = TlsChannelFactory::new(settings.clone(), keys, crypto);
        let engine = HandshakeEngine::new(provider, validator, settings.clone());
        Ok(Self::new(
            Arc::new(exchange),
            Arc::new(channels),
            Arc::new(engine),
        ))
    }

    /// Connect to a remote this node is initiating a link with.
    pub async fn dial_outbound(&self, address: &str) -> Result<DialOutcome, DialError> {
        let mut attempt = DialAttempt::new(address);
        let client = self.open_channel(&mut attempt).await?;
        if let Err(e) = attempt.advance(DialState::ChannelReady) {
            client.shutdown().await;
            return Err(e);
        }
        self.engine.outbound(&mut attempt, client).await
    }

    /// Connect back to a remote that handshaked with us, to check it is
    /// reachable at `address`. The supplied handshake is recorded as received.
    pub async fn dial_back(
        &self,
        address: &str,
        handshake: Handshake,
    ) -> Result<DialOutcome, DialError> {
        let mut attempt = DialAttempt::new(address);
        let client = self.open_channel(&mut attempt).await?;
        if let Err(e) = attempt.advance(DialState::ChannelReady) {
            client.shutdown().await;
            return Err(e);
        }
        self.engine
            .confirm_inbound(&mut attempt, client, handshake)
            .await
    }

    async fn open_channel(&self, attempt: &mut DialAttempt) -> Result<PeerClient, DialError> {
        let address = attempt.address().to_string();
        let remote = match self.exchange.retrieve(&address).await {
            Ok(cert) => cert,
            Err(e) => {
                attempt.abort(&e.to_string());
                return Err(e);
            }
        };
        attempt.advance(DialState::CertificateRetrieved)?;
        match self.channels.create(&address, &remote).await {
            Ok(client) => Ok(client),
            Err(e) => {
                attempt.abort(&e.to_string());
                Err(e)
            }
        }
    }
}
