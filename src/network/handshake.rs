// src/network/handshake.rs

use crate::config::DialSettings;
use crate::constants::{PROTOCOL_VERSION, SESSION_ID_LEN};
use crate::error::DialError;
use crate::events::dispatcher;
use crate::events::model::LogLevel;
use crate::network::channel::LocalKeyProvider;
use crate::network::client::PeerClient;
use crate::network::dialer::{DialOutcome, Rejection};
use crate::network::events::{emit_dial_event, emit_handshake_event};
use crate::network::message::{Handshake, HandshakeData, HandshakeStatus, SessionId};
use crate::network::peer::{Direction, Peer, PeerConnectionInfo};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces the handshake this node sends.
#[async_trait]
pub trait HandshakeProvider: Send + Sync {
    async fn produce_handshake(&self) -> anyhow::Result<Handshake>;
}

/// Judges a handshake received from a remote.
#[async_trait]
pub trait HandshakeValidator: Send + Sync {
    async fn validate_handshake(&self, handshake: &Handshake) -> HandshakeStatus;
}

/// Builds handshakes from the local key, protocol version and chain id, with
/// a fresh random session id each time. The signature is the handshake digest.
pub struct BasicHandshakeProvider {
    keys: Arc<dyn LocalKeyProvider>,
    chain_id: u32,
    listening_port: u16,
}

impl BasicHandshakeProvider {
    pub fn new(keys: Arc<dyn LocalKeyProvider>, chain_id: u32, listening_port: u16) -> Self {
        Self {
            keys,
            chain_id,
            listening_port,
        }
    }
}

#[async_trait]
impl HandshakeProvider for BasicHandshakeProvider {
    async fn produce_handshake(&self) -> anyhow::Result<Handshake> {
        let public_key = self.keys.local_public_key().await?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut handshake = Handshake {
            data: HandshakeData {
                public_key,
                protocol_version: PROTOCOL_VERSION,
                chain_id: self.chain_id,
                listening_port: self.listening_port,
                timestamp,
            },
            session_id: SessionId::random(),
            signature: String::new(),
        };
        handshake.signature = handshake.digest();
        Ok(handshake)
    }
}

/// Structural checks matching [`BasicHandshakeProvider`].
pub struct BasicHandshakeValidator {
    chain_id: u32,
}

impl BasicHandshakeValidator {
    pub fn new(chain_id: u32) -> Self {
        Self { chain_id }
    }
}

#[async_trait]
impl HandshakeValidator for BasicHandshakeValidator {
    async fn validate_handshake(&self, handshake: &Handshake) -> HandshakeStatus {
        let data = &handshake.data;
        if data.protocol_version != PROTOCOL_VERSION {
            return HandshakeStatus::ProtocolMismatch;
        }
        if data.chain_id != self.chain_id {
            return HandshakeStatus::ChainMismatch;
        }
        if data.public_key.is_empty()
            || base16ct::mixed::decode_vec(data.public_key.as_bytes()).is_err()
        {
            return HandshakeStatus::InvalidKey;
        }
        if handshake.session_id.len() != SESSION_ID_LEN {
            return HandshakeStatus::InvalidHandshake;
        }
        if handshake.signature != handshake.digest() {
            return HandshakeStatus::WrongSignature;
        }
        HandshakeStatus::Ok
    }
}

/// Per-attempt dial state. Transitions only move forward; any state may abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DialState {
    Init,
    CertificateRetrieved,
    ChannelReady,
    HandshakeSent,
    ReplyReceived,
    Validated,
    ProbeSent,
    ProbeAcked,
    PeerEstablished,
    Aborted,
}

impl DialState {
    pub fn can_advance_to(self, next: DialState) -> bool {
        use DialState::*;
        match (self, next) {
            (PeerEstablished | Aborted, _) => false,
            (_, Aborted) => true,
            (Init, CertificateRetrieved)
            | (CertificateRetrieved, ChannelReady)
            | (ChannelReady, HandshakeSent)
            | (HandshakeSent, ReplyReceived)
            | (ReplyReceived, Validated)
            | (Validated, PeerEstablished)
            | (ChannelReady, ProbeSent)
            | (ProbeSent, ProbeAcked)
            | (ProbeAcked, PeerEstablished) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DialState::PeerEstablished | DialState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DialState::Init => "init",
            DialState::CertificateRetrieved => "certificate_retrieved",
            DialState::ChannelReady => "channel_ready",
            DialState::HandshakeSent => "handshake_sent",
            DialState::ReplyReceived => "reply_received",
            DialState::Validated => "validated",
            DialState::ProbeSent => "probe_sent",
            DialState::ProbeAcked => "probe_acked",
            DialState::PeerEstablished => "peer_established",
            DialState::Aborted => "aborted",
        }
    }
}

/// One run of the dial state machine. A new attempt starts from `Init`.
#[derive(Debug)]
pub struct DialAttempt {
    address: String,
    corr_id: String,
    state: DialState,
    history: Vec<DialState>,
}

impl DialAttempt {
    pub fn new(address: &str) -> Self {
        let attempt = Self {
            address: address.to_string(),
            corr_id: dispatcher::correlation_id(),
            state: DialState::Init,
            history: vec![DialState::Init],
        };
        emit_dial_event(
            LogLevel::Debug,
            &attempt.corr_id,
            address,
            DialState::Init.as_str(),
            None,
        );
        attempt
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> DialState {
        self.state
    }

    pub fn history(&self) -> &[DialState] {
        &self.history
    }

    /// Move to `next`. An illegal transition aborts the attempt and fails.
    pub fn advance(&mut self, next: DialState) -> Result<(), DialError> {
        if !self.state.can_advance_to(next) {
            let err = DialError::IllegalTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            };
            self.abort(&err.to_string());
            return Err(err);
        }
        self.state = next;
        self.history.push(next);
        let level = if next == DialState::PeerEstablished {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };
        emit_dial_event(level, &self.corr_id, &self.address, next.as_str(), None);
        Ok(())
    }

    pub fn abort(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        self.state = DialState::Aborted;
        self.history.push(DialState::Aborted);
        emit_dial_event(
            LogLevel::Warn,
            &self.corr_id,
            &self.address,
            DialState::Aborted.as_str(),
            Some(reason.to_string()),
        );
    }
}

/// Application-level handshake over a ready channel.
pub struct HandshakeEngine {
    provider: Arc<dyn HandshakeProvider>,
    validator: Arc<dyn HandshakeValidator>,
    settings: DialSettings,
}

impl HandshakeEngine {
    pub fn new(
        provider: Arc<dyn HandshakeProvider>,
        validator: Arc<dyn HandshakeValidator>,
        settings: DialSettings,
    ) -> Self {
        Self {
            provider,
            validator,
            settings,
        }
    }

    /// Send our handshake, read theirs, validate it. Rejections shut the
    /// channel down and resolve to `DialOutcome::Rejected`.
    pub async fn outbound(
        &self,
        attempt: &mut DialAttempt,
        client: PeerClient,
    ) -> Result<DialOutcome, DialError> {
        let sent = match self.provider.produce_handshake().await {
            Ok(h) => h,
            Err(e) => {
                abort(attempt, &client, &format!("produce handshake: {}", e)).await;
                return Err(DialError::LocalIdentity(e.to_string()));
            }
        };
        advance(attempt, &client, DialState::HandshakeSent).await?;

        let reply = match client
            .do_handshake(sent.clone(), self.settings.handshake_timeout())
            .await
        {
            Ok(reply) => reply,
            Err(source) => {
                abort(attempt, &client, &format!("DoHandshake: {}", source)).await;
                return Err(DialError::Transport {
                    method: "DoHandshake",
                    source,
                });
            }
        };
        advance(attempt, &client, DialState::ReplyReceived).await?;

        if !reply.status.is_ok() {
            emit_handshake_event(
                LogLevel::Warn,
                Direction::Outbound,
                attempt.address(),
                reply.status.as_str(),
                Some(&sent.session_id),
                None,
            );
            abort(attempt, &client, &format!("remote refused: {}", reply.status)).await;
            return Ok(DialOutcome::Rejected(Rejection::Refused(reply.status)));
        }
        let Some(received) = reply.handshake else {
            abort(attempt, &client, "ok reply without handshake").await;
            return Ok(DialOutcome::Rejected(Rejection::Invalid(
                HandshakeStatus::InvalidHandshake,
            )));
        };

        let verdict = self.validator.validate_handshake(&received).await;
        if !verdict.is_ok() {
            emit_handshake_event(
                LogLevel::Warn,
                Direction::Outbound,
                attempt.address(),
                verdict.as_str(),
                Some(&received.session_id),
                Some(received.public_key()),
            );
            abort(attempt, &client, &format!("invalid handshake: {}", verdict)).await;
            return Ok(DialOutcome::Rejected(Rejection::Invalid(verdict)));
        }
        advance(attempt, &client, DialState::Validated).await?;

        let info = PeerConnectionInfo::new(
            received.data.public_key.clone(),
            SystemTime::now(),
            received.data.protocol_version,
            received.session_id.clone(),
            Direction::Outbound,
        );
        let inbound_session_id = sent.session_id.clone();
        emit_handshake_event(
            LogLevel::Info,
            Direction::Outbound,
            attempt.address(),
            HandshakeStatus::Ok.as_str(),
            Some(&received.session_id),
            Some(received.public_key()),
        );
        let peer = Peer::new(client, info, Some(sent), received, Some(inbound_session_id));
        advance(attempt, peer.client(), DialState::PeerEstablished).await?;
        Ok(DialOutcome::Established(peer))
    }

    /// Confirm reachability of a remote that already handshaked with us. One
    /// Ping, no handshake RPC; the supplied handshake becomes the received one.
    pub async fn confirm_inbound(
        &self,
        attempt: &mut DialAttempt,
        client: PeerClient,
        handshake: Handshake,
    ) -> Result<DialOutcome, DialError> {
        advance(attempt, &client, DialState::ProbeSent).await?;
        if let Err(source) = client.ping(self.settings.ping_timeout()).await {
            abort(attempt, &client, &format!("Ping: {}", source)).await;
            return Err(DialError::Transport {
                method: "Ping",
                source,
            });
        }
        advance(attempt, &client, DialState::ProbeAcked).await?;

        let info = PeerConnectionInfo::new(
            handshake.data.public_key.clone(),
            SystemTime::now(),
            handshake.data.protocol_version,
            handshake.session_id.clone(),
            Direction::Inbound,
        );
        emit_handshake_event(
            LogLevel::Info,
            Direction::Inbound,
            attempt.address(),
            "reachable",
            Some(&handshake.session_id),
            Some(handshake.public_key()),
        );
        let peer = Peer::new(client, info, None, handshake, None);
        advance(attempt, peer.client(), DialState::PeerEstablished).await?;
        Ok(DialOutcome::Established(peer))
    }
}

async fn advance(
    attempt: &mut DialAttempt,
    client: &PeerClient,
    next: DialState,
) -> Result<(), DialError> {
    if let Err(e) = attempt.advance(next) {
        client.shutdown().await;
        return Err(e);
    }
    Ok(())
}

async fn abort(attempt: &mut DialAttempt, client: &PeerClient, reason: &str) {
    attempt.abort(reason);
    client.shutdown().await;
}
