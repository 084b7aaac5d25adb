// tests/common/mod.rs
// Scripted collaborators shared by the dialer/handshake integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use peerlink::config::{DialSettings, RetryPolicy};
use peerlink::error::{DialError, TransportError};
use peerlink::network::channel::ChannelFactory;
use peerlink::network::client::PeerClient;
use peerlink::network::handshake::{HandshakeEngine, HandshakeProvider, HandshakeValidator};
use peerlink::network::interceptor::default_chain;
use peerlink::network::message::{
    Handshake, HandshakeData, HandshakeReply, HandshakeStatus, OutboundCall, PingReply, RpcReply,
    SessionId,
};
use peerlink::network::transport::CallTransport;
use peerlink::network::PeerDialer;
use peerlink::security::{CertificateExchange, RemoteCertificate, TlsIdentity};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const LOCAL_KEY: &str = "0a0b0c";

pub fn handshake(public_key: &str, session: &[u8]) -> Handshake {
    Handshake {
        data: HandshakeData {
            public_key: public_key.to_string(),
            protocol_version: peerlink::constants::PROTOCOL_VERSION,
            chain_id: peerlink::constants::DEFAULT_CHAIN_ID,
            listening_port: 9090,
            timestamp: 1_700_000_000,
        },
        session_id: SessionId::from_bytes(session.to_vec()),
        signature: "sig".to_string(),
    }
}

pub fn fresh_certificate() -> RemoteCertificate {
    let identity = TlsIdentity::issue_ephemeral().expect("issue identity");
    RemoteCertificate::new(identity.certificate().clone())
}

pub fn test_settings() -> DialSettings {
    DialSettings {
        dial_timeout: Duration::from_millis(500),
        retry: RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
        ..DialSettings::default()
    }
}

pub fn ok_reply(remote: Handshake) -> Result<RpcReply, TransportError> {
    Ok(RpcReply::Handshake(HandshakeReply::ok(remote)))
}

pub fn rejected_reply(status: HandshakeStatus) -> Result<RpcReply, TransportError> {
    Ok(RpcReply::Handshake(HandshakeReply::rejected(status)))
}

pub fn pong() -> Result<RpcReply, TransportError> {
    Ok(RpcReply::Pong(PingReply::default()))
}

/// Transport answering from a script and recording every call it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RpcReply, TransportError>>>,
    calls: Mutex<Vec<OutboundCall>>,
    shutdown_calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RpcReply, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|c| c.method()).collect()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallTransport for ScriptedTransport {
    async fn invoke(&self, call: &OutboundCall) -> Result<RpcReply, TransportError> {
        self.calls.lock().push(call.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Err(TransportError::Closed))
    }

    async fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.shut_down.store(true, Ordering::SeqCst);
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

/// Serves one certificate per attempt, in order; the last one repeats.
pub struct MockExchange {
    certs: Mutex<VecDeque<RemoteCertificate>>,
    fail: bool,
    pub addresses: Mutex<Vec<String>>,
}

impl MockExchange {
    pub fn serving(certs: Vec<RemoteCertificate>) -> Arc<Self> {
        Arc::new(Self {
            certs: Mutex::new(certs.into()),
            fail: false,
            addresses: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            certs: Mutex::new(VecDeque::new()),
            fail: true,
            addresses: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CertificateExchange for MockExchange {
    async fn retrieve(&self, address: &str) -> Result<RemoteCertificate, DialError> {
        self.addresses.lock().push(address.to_string());
        if self.fail {
            return Err(DialError::certificate_retrieval(address, "connection refused"));
        }
        let mut certs = self.certs.lock();
        let cert = if certs.len() > 1 {
            certs.pop_front()
        } else {
            certs.front().cloned()
        };
        cert.ok_or_else(|| DialError::certificate_retrieval(address, "no certificate scripted"))
    }
}

/// Hands out scripted transports behind the real interceptor chain and
/// records which certificate each channel was pinned to.
pub struct MockChannelFactory {
    transports: Mutex<VecDeque<Arc<ScriptedTransport>>>,
    retry: RetryPolicy,
    fail: bool,
    pub pinned: Mutex<Vec<RemoteCertificate>>,
}

impl MockChannelFactory {
    pub fn new(transports: Vec<Arc<ScriptedTransport>>) -> Arc<Self> {
        Arc::new(Self {
            transports: Mutex::new(transports.into()),
            retry: test_settings().retry,
            fail: false,
            pinned: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            transports: Mutex::new(VecDeque::new()),
            retry: test_settings().retry,
            fail: true,
            pinned: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> usize {
        self.pinned.lock().len()
    }
}

#[async_trait]
impl ChannelFactory for MockChannelFactory {
    async fn create(
        &self,
        address: &str,
        remote: &RemoteCertificate,
    ) -> Result<PeerClient, DialError> {
        if self.fail {
            return Err(DialError::ChannelConstruction("unparseable certificate".into()));
        }
        self.pinned.lock().push(remote.clone());
        let transport = self
            .transports
            .lock()
            .pop_front()
            .ok_or_else(|| DialError::ChannelConstruction("no transport scripted".into()))?;
        Ok(PeerClient::new(
            address,
            transport,
            default_chain(LOCAL_KEY, self.retry),
        ))
    }
}

/// Provider returning the same handshake every time.
pub struct FixedProvider {
    handshake: Handshake,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(handshake: Handshake) -> Arc<Self> {
        Arc::new(Self {
            handshake,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandshakeProvider for FixedProvider {
    async fn produce_handshake(&self) -> anyhow::Result<Handshake> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.handshake.clone())
    }
}

/// Validator returning a fixed verdict and recording what it was shown.
pub struct FixedValidator {
    verdict: HandshakeStatus,
    pub seen: Mutex<Vec<Handshake>>,
}

impl FixedValidator {
    pub fn new(verdict: HandshakeStatus) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl HandshakeValidator for FixedValidator {
    async fn validate_handshake(&self, handshake: &Handshake) -> HandshakeStatus {
        self.seen.lock().push(handshake.clone());
        self.verdict
    }
}

pub fn dialer(
    exchange: Arc<MockExchange>,
    factory: Arc<MockChannelFactory>,
    provider: Arc<FixedProvider>,
    validator: Arc<FixedValidator>,
) -> PeerDialer {
    let engine = HandshakeEngine::new(provider, validator, test_settings());
    PeerDialer::new(exchange, factory, Arc::new(engine))
}
