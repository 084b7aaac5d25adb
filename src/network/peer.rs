// src/network/peer.rs

use crate::network::client::PeerClient;
use crate::network::message::{Handshake, SessionId};
use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote connected to us; we dialed back to confirm reachability.
    Inbound,
    /// We initiated the link.
    Outbound,
}

/// Snapshot taken when the link was accepted. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnectionInfo {
    public_key: String,
    connected_at: SystemTime,
    protocol_version: u32,
    session_id: SessionId,
    direction: Direction,
}

impl PeerConnectionInfo {
    pub fn new(
        public_key: String,
        connected_at: SystemTime,
        protocol_version: u32,
        session_id: SessionId,
        direction: Direction,
    ) -> Self {
        Self {
            public_key,
            connected_at,
            protocol_version,
            session_id,
            direction,
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }
}

/// An established, authenticated link.
#[derive(Debug)]
pub struct Peer {
    client: PeerClient,
    info: PeerConnectionInfo,
    last_sent_handshake: Option<Handshake>,
    last_received_handshake: Handshake,
    inbound_session_id: Option<SessionId>,
}

impl Peer {
    pub(crate) fn new(
        client: PeerClient,
        info: PeerConnectionInfo,
        last_sent_handshake: Option<Handshake>,
        last_received_handshake: Handshake,
        inbound_session_id: Option<SessionId>,
    ) -> Self {
        Self {
            client,
            info,
            last_sent_handshake,
            last_received_handshake,
            inbound_session_id,
        }
    }

    pub fn address(&self) -> &str {
        self.client.address()
    }

    pub fn client(&self) -> &PeerClient {
        &self.client
    }

    pub fn connection_info(&self) -> &PeerConnectionInfo {
        &self.info
    }

    pub fn is_inbound(&self) -> bool {
        self.info.is_inbound()
    }

    /// Handshake this node sent; `None` for peers confirmed by dial-back.
    pub fn last_sent_handshake(&self) -> Option<&Handshake> {
        self.last_sent_handshake.as_ref()
    }

    pub fn last_received_handshake(&self) -> &Handshake {
        &self.last_received_handshake
    }

    /// Session id to expect if this remote later connects to us.
    pub fn inbound_session_id(&self) -> Option<&SessionId> {
        self.inbound_session_id.as_ref()
    }

    pub async fn disconnect(&self) {
        self.client.shutdown().await;
    }

    pub fn display(&self) -> String {
        format!(
            "Peer[pubkey: {}, address: {}, direction: {:?}]",
            self.info.public_key,
            self.address(),
            self.info.direction
        )
    }
}
