// src/network/listener.rs

use crate::config::DialSettings;
use crate::constants::{LISTENER_IDLE_TIMEOUT, SESSION_WINDOW_CAPACITY, SESSION_WINDOW_TTL};
use crate::error::TransportError;
use crate::events::model::LogLevel;
use crate::network::events::{emit_handshake_event, emit_system_event};
use crate::network::handshake::{HandshakeProvider, HandshakeValidator};
use crate::network::message::{
    encode_frame, read_frame, CallMetadata, Handshake, HandshakeReply, HandshakeRequest,
    HandshakeStatus, PingReply, PingRequest, RpcCall, RpcReply, RpcRequest, RpcResponse,
    SessionId,
};
use crate::network::peer::Direction;
use crate::network::transport::MessageLimits;
use crate::security::certificate::spki_fingerprint;
use crate::security::crypto_provider;
use crate::security::identity::TlsIdentity;
use crate::security::verifier::SelfSignedClientVerifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustls::ServerConfig;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

fn log_listener_event(level: LogLevel, action: &str, detail: Option<String>) {
    emit_system_event("listener", level, action, detail);
}

/// What the server knows about a caller when a request arrives.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub remote_addr: SocketAddr,
    pub metadata: CallMetadata,
    /// SPKI fingerprint of the caller's TLS client certificate
    pub client_fingerprint: String,
}

/// Server half of the peer RPCs.
#[async_trait]
pub trait PeerService: Send + Sync {
    async fn do_handshake(&self, request: HandshakeRequest, ctx: &CallContext) -> HandshakeReply;

    async fn ping(&self, request: PingRequest, ctx: &CallContext) -> PingReply;
}

/// Recently accepted inbound session ids. Entries expire after `ttl`, and
/// the oldest are dropped once `capacity` is reached.
struct SessionWindow {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<SessionId, Instant>,
    order: VecDeque<(Instant, SessionId)>,
}

impl SessionWindow {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `id`; false if it is still inside the window.
    fn insert(&mut self, id: &SessionId, now: Instant) -> bool {
        self.prune(now);
        if self.seen.contains_key(id) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            if !self.pop_oldest() {
                break;
            }
        }
        self.seen.insert(id.clone(), now);
        self.order.push_back((now, id.clone()));
        true
    }

    fn remove(&mut self, id: &SessionId) -> bool {
        self.seen.remove(id).is_some()
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.order.front() {
            if now.saturating_duration_since(*at) < self.ttl {
                break;
            }
            self.pop_oldest();
        }
    }

    // `order` may hold ids already removed or re-inserted; only a matching
    // timestamp evicts from `seen`.
    fn pop_oldest(&mut self) -> bool {
        let Some((at, id)) = self.order.pop_front() else {
            return false;
        };
        if self.seen.get(&id) == Some(&at) {
            self.seen.remove(&id);
        }
        true
    }

    fn len(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.seen.len()
    }
}

/// Default peer service. Refuses blacklisted keys, handshakes whose key
/// differs from the caller's `local-public-key` metadata, handshakes the
/// validator rejects and session ids reused within the replay window. Accepted
/// handshakes are answered with a fresh one from the provider.
pub struct HandshakeService {
    provider: Arc<dyn HandshakeProvider>,
    validator: Arc<dyn HandshakeValidator>,
    sessions: Mutex<SessionWindow>,
    blacklist: RwLock<HashSet<String>>,
    accepted: Option<mpsc::UnboundedSender<(SocketAddr, Handshake)>>,
}

impl HandshakeService {
    pub fn new(provider: Arc<dyn HandshakeProvider>, validator: Arc<dyn HandshakeValidator>) -> Self {
        Self {
            provider,
            validator,
            sessions: Mutex::new(SessionWindow::new(
                SESSION_WINDOW_TTL,
                SESSION_WINDOW_CAPACITY,
            )),
            blacklist: RwLock::new(HashSet::new()),
            accepted: None,
        }
    }

    /// Report every accepted inbound handshake on `tx`, so the node can dial
    /// back and confirm the caller is reachable.
    pub fn with_accept_notifier(mut self, tx: mpsc::UnboundedSender<(SocketAddr, Handshake)>) -> Self {
        self.accepted = Some(tx);
        self
    }

    /// Bound the replay window: session ids are refused as duplicates for
    /// `ttl` after acceptance, and at most `capacity` are remembered.
    pub fn with_session_window(mut self, ttl: Duration, capacity: usize) -> Self {
        self.sessions = Mutex::new(SessionWindow::new(ttl, capacity));
        self
    }

    pub fn blacklist(&self, public_key: impl Into<String>) {
        self.blacklist.write().insert(public_key.into());
    }

    pub fn is_blacklisted(&self, public_key: &str) -> bool {
        self.blacklist.read().contains(public_key)
    }

    /// Drop a session id so the same remote may handshake with it again.
    pub fn forget_session(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().remove(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len(Instant::now())
    }

    async fn evaluate(&self, handshake: &Handshake, ctx: &CallContext) -> HandshakeStatus {
        let key = handshake.public_key();
        if self.is_blacklisted(key) {
            return HandshakeStatus::Blacklisted;
        }
        if ctx.metadata.local_public_key.as_deref() != Some(key) {
            return HandshakeStatus::InvalidKey;
        }
        let verdict = self.validator.validate_handshake(handshake).await;
        if !verdict.is_ok() {
            return verdict;
        }
        if !self.sessions.lock().insert(&handshake.session_id, Instant::now()) {
            return HandshakeStatus::DuplicateSession;
        }
        HandshakeStatus::Ok
    }
}

#[async_trait]
impl PeerService for HandshakeService {
    async fn do_handshake(&self, request: HandshakeRequest, ctx: &CallContext) -> HandshakeReply {
        let received = request.handshake;
        let address = ctx.remote_addr.to_string();
        let status = self.evaluate(&received, ctx).await;
        if !status.is_ok() {
            emit_handshake_event(
                LogLevel::Warn,
                Direction::Inbound,
                &address,
                status.as_str(),
                Some(&received.session_id),
                Some(received.public_key()),
            );
            return HandshakeReply::rejected(status);
        }

        let ours = match self.provider.produce_handshake().await {
            Ok(h) => h,
            Err(e) => {
                self.forget_session(&received.session_id);
                log_listener_event(
                    LogLevel::Error,
                    "produce_handshake_failed",
                    Some(e.to_string()),
                );
                return HandshakeReply::rejected(HandshakeStatus::Unknown);
            }
        };
        emit_handshake_event(
            LogLevel::Info,
            Direction::Inbound,
            &address,
            HandshakeStatus::Ok.as_str(),
            Some(&received.session_id),
            Some(received.public_key()),
        );
        if let Some(tx) = &self.accepted {
            // Receiver gone means nobody dials back; the handshake still stands.
            let _ = tx.send((ctx.remote_addr, received));
        }
        HandshakeReply::ok(ours)
    }

    async fn ping(&self, _request: PingRequest, _ctx: &CallContext) -> PingReply {
        PingReply::default()
    }
}

/// TLS listener serving the peer RPCs with the node's own identity.
pub struct PeerListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    service: Arc<dyn PeerService>,
    limits: MessageLimits,
    accept_timeout: Duration,
}

impl PeerListener {
    pub async fn bind(
        addr: &str,
        identity: TlsIdentity,
        service: Arc<dyn PeerService>,
        settings: &DialSettings,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        Self::from_listener(listener, identity, service, settings)
    }

    pub fn from_listener(
        listener: TcpListener,
        identity: TlsIdentity,
        service: Arc<dyn PeerService>,
        settings: &DialSettings,
    ) -> Result<Self> {
        let provider = crypto_provider();
        let fingerprint = identity.fingerprint();
        let (chain, key) = identity.into_parts();
        let config = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .context("unsupported protocol versions")?
            .with_client_cert_verifier(Arc::new(SelfSignedClientVerifier::new(provider)))
            .with_single_cert(chain, key)
            .context("invalid listener certificate/key")?;
        log_listener_event(
            LogLevel::Info,
            "listener_bind",
            Some(format!(
                "addr={} fingerprint={}",
                listener
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                fingerprint
            )),
        );
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(config)),
            service,
            limits: MessageLimits {
                // Replies are what we send, requests what we receive.
                max_send: settings.max_send_message_bytes,
                max_receive: settings.max_receive_message_bytes,
            },
            accept_timeout: settings.dial_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, remote_addr)) => {
                    log_listener_event(
                        LogLevel::Debug,
                        "incoming_connection",
                        Some(remote_addr.to_string()),
                    );
                    tokio::spawn(handle_connection(
                        stream,
                        remote_addr,
                        self.acceptor.clone(),
                        self.service.clone(),
                        self.limits,
                        self.accept_timeout,
                    ));
                }
                Err(e) => {
                    log_listener_event(LogLevel::Error, "accept_failed", Some(e.to_string()));
                }
            }
        }
    }
}

/// Bind on all interfaces and serve forever.
pub async fn start_listener(
    port: u16,
    identity: TlsIdentity,
    service: Arc<dyn PeerService>,
    settings: &DialSettings,
) -> Result<()> {
    let listener = PeerListener::bind(&format!("0.0.0.0:{}", port), identity, service, settings)
        .await?;
    listener.run().await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    acceptor: TlsAcceptor,
    service: Arc<dyn PeerService>,
    limits: MessageLimits,
    accept_timeout: Duration,
) {
    let tls = match tokio::time::timeout(accept_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            log_listener_event(
                LogLevel::Debug,
                "tls_accept_failed",
                Some(format!("addr={} err={}", remote_addr, e)),
            );
            return;
        }
        Err(_) => {
            log_listener_event(
                LogLevel::Debug,
                "tls_accept_timeout",
                Some(remote_addr.to_string()),
            );
            return;
        }
    };
    let client_fingerprint = tls
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(spki_fingerprint);

    let (r, mut writer) = tokio::io::split(tls);
    let mut reader = BufReader::new(r);
    loop {
        let request: RpcRequest =
            match tokio::time::timeout(LISTENER_IDLE_TIMEOUT, read_frame(&mut reader, limits.max_receive))
                .await
            {
                Ok(Ok(request)) => request,
                // Closed, including certificate probes that never send a request.
                Ok(Err(TransportError::Reset(_))) => break,
                Ok(Err(e)) => {
                    log_listener_event(
                        LogLevel::Warn,
                        "bad_request",
                        Some(format!("addr={} err={}", remote_addr, e)),
                    );
                    break;
                }
                Err(_) => {
                    log_listener_event(LogLevel::Debug, "idle_close", Some(remote_addr.to_string()));
                    break;
                }
            };

        let id = request.id;
        let reply = dispatch(
            service.as_ref(),
            request,
            remote_addr,
            client_fingerprint.as_deref(),
        )
        .await;
        let frame = match encode_frame(&RpcResponse { id, reply }, limits.max_send) {
            Ok(frame) => frame,
            Err(e) => {
                let failed = RpcResponse {
                    id,
                    reply: RpcReply::Failed {
                        message: e.to_string(),
                    },
                };
                match encode_frame(&failed, limits.max_send) {
                    Ok(frame) => frame,
                    Err(_) => break,
                }
            }
        };
        if writer.write_all(&frame).await.is_err() || writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn dispatch(
    service: &dyn PeerService,
    request: RpcRequest,
    remote_addr: SocketAddr,
    client_fingerprint: Option<&str>,
) -> RpcReply {
    let Some(fingerprint) = client_fingerprint else {
        return RpcReply::Failed {
            message: "client certificate required".to_string(),
        };
    };
    let ctx = CallContext {
        remote_addr,
        metadata: request.metadata,
        client_fingerprint: fingerprint.to_string(),
    };
    match request.call {
        RpcCall::DoHandshake(req) => RpcReply::Handshake(service.do_handshake(req, &ctx).await),
        RpcCall::Ping(req) => RpcReply::Pong(service.ping(req, &ctx).await),
    }
}
