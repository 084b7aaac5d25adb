// tests/tls_dial.rs
// End-to-end over loopback: real listener, real probe, real pinned channel.

use async_trait::async_trait;
use peerlink::config::DialSettings;
use peerlink::constants::DEFAULT_CHAIN_ID;
use peerlink::error::TransportError;
use peerlink::network::listener::{CallContext, PeerService};
use peerlink::network::message::{
    CallMetadata, Handshake, HandshakeReply, HandshakeRequest, HandshakeStatus, OutboundCall,
    PingReply, PingRequest, RpcCall,
};
use peerlink::network::transport::{CallTransport, MessageLimits, TlsTransport};
use peerlink::network::{
    BasicHandshakeProvider, BasicHandshakeValidator, ChannelFactory, DialOutcome, Direction,
    HandshakeProvider, HandshakeService, PeerDialer, PeerListener, Rejection, StaticKeyProvider,
    TlsChannelFactory,
};
use peerlink::security::identity::generate_node_public_key;
use peerlink::security::verifier::HarvestingVerifier;
use peerlink::security::{
    crypto_provider, CertificateExchange, RemoteCertificate, TlsCertificateExchange, TlsIdentity,
};
use rustls::ClientConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_rustls::TlsConnector;

fn settings() -> DialSettings {
    DialSettings {
        dial_timeout: Duration::from_secs(2),
        ..DialSettings::default()
    }
}

/// Start a node's peer service on an ephemeral loopback port.
async fn spawn_node(public_key: &str) -> (SocketAddr, Arc<HandshakeService>, String) {
    let keys = Arc::new(StaticKeyProvider::new(public_key));
    let service = Arc::new(HandshakeService::new(
        Arc::new(BasicHandshakeProvider::new(keys, DEFAULT_CHAIN_ID, 0)),
        Arc::new(BasicHandshakeValidator::new(DEFAULT_CHAIN_ID)),
    ));
    let identity = TlsIdentity::issue_ephemeral().unwrap();
    let fingerprint = identity.fingerprint();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener =
        PeerListener::from_listener(tcp, identity, service.clone(), &settings()).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    (addr, service, fingerprint)
}

fn dialer_with(public_key: &str, provider: Arc<dyn HandshakeProvider>) -> PeerDialer {
    let keys = Arc::new(StaticKeyProvider::new(public_key));
    PeerDialer::from_settings(
        &settings(),
        keys,
        provider,
        Arc::new(BasicHandshakeValidator::new(DEFAULT_CHAIN_ID)),
        crypto_provider(),
    )
    .unwrap()
}

fn basic_dialer(public_key: &str) -> PeerDialer {
    let keys = Arc::new(StaticKeyProvider::new(public_key));
    dialer_with(
        public_key,
        Arc::new(BasicHandshakeProvider::new(keys, DEFAULT_CHAIN_ID, 0)),
    )
}

/// Completes TLS, then never answers a request.
struct StalledService;

#[async_trait]
impl PeerService for StalledService {
    async fn do_handshake(&self, _request: HandshakeRequest, _ctx: &CallContext) -> HandshakeReply {
        std::future::pending().await
    }

    async fn ping(&self, _request: PingRequest, _ctx: &CallContext) -> PingReply {
        std::future::pending().await
    }
}

/// Replays one pre-built handshake, so every dial reuses its session id.
struct ReplayProvider(Handshake);

#[async_trait]
impl HandshakeProvider for ReplayProvider {
    async fn produce_handshake(&self) -> anyhow::Result<Handshake> {
        Ok(self.0.clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outbound_then_dial_back_over_loopback() {
    let server_key = generate_node_public_key().unwrap();
    let client_key = generate_node_public_key().unwrap();
    let (addr, service, _) = spawn_node(&server_key).await;
    let dialer = basic_dialer(&client_key);

    let peer = dialer
        .dial_outbound(&addr.to_string())
        .await
        .expect("dial should not fail")
        .into_peer()
        .expect("handshake should be accepted");
    assert_eq!(peer.connection_info().public_key(), server_key);
    assert_eq!(peer.connection_info().direction(), Direction::Outbound);
    assert_eq!(service.session_count(), 1);

    // Established channel keeps answering.
    peer.client().ping(Duration::from_secs(1)).await.unwrap();

    let received = peer.last_received_handshake().clone();
    let back = dialer
        .dial_back(&addr.to_string(), received.clone())
        .await
        .unwrap()
        .into_peer()
        .expect("remote is reachable");
    assert!(back.is_inbound());
    assert_eq!(back.last_received_handshake(), &received);

    peer.disconnect().await;
    back.disconnect().await;
    assert!(peer.client().is_shut_down());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reused_session_id_is_refused_as_duplicate() {
    let server_key = generate_node_public_key().unwrap();
    let client_key = generate_node_public_key().unwrap();
    let (addr, _service, _) = spawn_node(&server_key).await;

    let keys = Arc::new(StaticKeyProvider::new(client_key.clone()));
    let fixed = BasicHandshakeProvider::new(keys, DEFAULT_CHAIN_ID, 0)
        .produce_handshake()
        .await
        .unwrap();
    let dialer = dialer_with(&client_key, Arc::new(ReplayProvider(fixed)));

    let first = dialer.dial_outbound(&addr.to_string()).await.unwrap();
    assert!(first.is_established());

    let second = dialer.dial_outbound(&addr.to_string()).await.unwrap();
    assert_eq!(
        second.rejection(),
        Some(Rejection::Refused(HandshakeStatus::DuplicateSession))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blacklisted_key_is_refused() {
    let server_key = generate_node_public_key().unwrap();
    let client_key = generate_node_public_key().unwrap();
    let (addr, service, _) = spawn_node(&server_key).await;
    service.blacklist(client_key.clone());

    let outcome = basic_dialer(&client_key)
        .dial_outbound(&addr.to_string())
        .await
        .unwrap();

    match outcome {
        DialOutcome::Rejected(r) => assert_eq!(r.status(), HandshakeStatus::Blacklisted),
        DialOutcome::Established(p) => panic!("blacklisted key got a peer: {}", p.display()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_harvests_the_listener_certificate() {
    let (addr, _service, fingerprint) = spawn_node(&generate_node_public_key().unwrap()).await;
    let exchange = TlsCertificateExchange::new(&settings(), crypto_provider()).unwrap();

    let cert = exchange.retrieve(&addr.to_string()).await.unwrap();

    assert_eq!(cert.fingerprint(), fingerprint);
}

#[tokio::test]
async fn no_listener_is_a_certificate_retrieval_error() {
    let addr = {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        tcp.local_addr().unwrap()
    };

    let err = basic_dialer(&generate_node_public_key().unwrap())
        .dial_outbound(&addr.to_string())
        .await
        .unwrap_err();

    assert!(err.is_certificate_retrieval(), "got {:?}", err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_pinned_to_another_certificate_fails_tls() {
    let (addr, _service, _) = spawn_node(&generate_node_public_key().unwrap()).await;
    let impostor = RemoteCertificate::new(TlsIdentity::issue_ephemeral().unwrap().certificate().clone());
    let factory = TlsChannelFactory::new(
        settings(),
        Arc::new(StaticKeyProvider::new("0a0b0c")),
        crypto_provider(),
    );

    let client = factory.create(&addr.to_string(), &impostor).await.unwrap();
    let err = client.ping(Duration::from_secs(1)).await.unwrap_err();

    assert!(
        matches!(err, TransportError::PinMismatch(_) | TransportError::Tls(_)),
        "got {:?}",
        err
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rpc_without_client_certificate_is_refused() {
    let (addr, _service, _) = spawn_node(&generate_node_public_key().unwrap()).await;
    let provider = crypto_provider();
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(HarvestingVerifier::new(provider)))
        .with_no_client_auth();
    let transport = TlsTransport::new(
        &addr.to_string(),
        TlsConnector::from(Arc::new(config)),
        MessageLimits {
            max_send: 1024,
            max_receive: 1024,
        },
    );

    let call = OutboundCall::new(
        RpcCall::Ping(PingRequest::default()),
        CallMetadata::new(Duration::from_secs(1), 0),
    );
    let err = transport.invoke(&call).await.unwrap_err();

    assert_eq!(
        err,
        TransportError::Remote("client certificate required".into())
    );
}

#[tokio::test]
async fn transport_shutdown_is_idempotent() {
    let provider = crypto_provider();
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(HarvestingVerifier::new(provider)))
        .with_no_client_auth();
    let transport = TlsTransport::new(
        "127.0.0.1:1",
        TlsConnector::from(Arc::new(config)),
        MessageLimits {
            max_send: 1024,
            max_receive: 1024,
        },
    );

    transport.shutdown().await;
    transport.shutdown().await;
    assert!(transport.is_shut_down());

    let call = OutboundCall::new(
        RpcCall::Ping(PingRequest::default()),
        CallMetadata::new(Duration::from_secs(1), 0),
    );
    assert_eq!(transport.invoke(&call).await, Err(TransportError::Closed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn certificate_retrieval_from_a_silent_listener_times_out() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    // Accept and hold connections without ever speaking TLS.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = tcp.accept().await {
            held.push(stream);
        }
    });
    let settings = DialSettings {
        dial_timeout: Duration::from_millis(300),
        ..DialSettings::default()
    };
    let exchange = TlsCertificateExchange::new(&settings, crypto_provider()).unwrap();

    let started = Instant::now();
    let err = exchange.retrieve(&addr.to_string()).await.unwrap_err();

    assert!(err.is_certificate_retrieval(), "got {:?}", err);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "retrieval took {:?}",
        started.elapsed()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_to_an_unresponsive_node_times_out() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = PeerListener::from_listener(
        tcp,
        TlsIdentity::issue_ephemeral().unwrap(),
        Arc::new(StalledService),
        &settings(),
    )
    .unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(listener.run());

    let cert = TlsCertificateExchange::new(&settings(), crypto_provider())
        .unwrap()
        .retrieve(&addr)
        .await
        .unwrap();
    let factory = TlsChannelFactory::new(
        settings(),
        Arc::new(StaticKeyProvider::new("0a0b0c")),
        crypto_provider(),
    );
    let client = factory.create(&addr, &cert).await.unwrap();

    let started = Instant::now();
    let err = client.ping(Duration::from_millis(300)).await.unwrap_err();

    assert_eq!(err, TransportError::Timeout(Duration::from_millis(300)));
    assert!(started.elapsed() < Duration::from_secs(2));
    client.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dials_pin_their_own_remotes() {
    let keys: Vec<String> = (0..3).map(|_| generate_node_public_key().unwrap()).collect();
    let (addr_a, svc_a, _) = spawn_node(&keys[0]).await;
    let (addr_b, svc_b, _) = spawn_node(&keys[1]).await;
    let (addr_c, svc_c, _) = spawn_node(&keys[2]).await;
    let dialer = basic_dialer(&generate_node_public_key().unwrap());

    let (addr_a, addr_b, addr_c) = (addr_a.to_string(), addr_b.to_string(), addr_c.to_string());
    let (a, b, c) = tokio::join!(
        dialer.dial_outbound(&addr_a),
        dialer.dial_outbound(&addr_b),
        dialer.dial_outbound(&addr_c),
    );

    // A channel pinned to the wrong node's certificate could not have
    // completed the handshake with that node's key.
    for (outcome, key) in [a, b, c].into_iter().zip(&keys) {
        let peer = outcome
            .expect("dial should not fail")
            .into_peer()
            .expect("handshake should be accepted");
        assert_eq!(peer.connection_info().public_key(), key.as_str());
        peer.disconnect().await;
    }
    for svc in [svc_a, svc_b, svc_c] {
        assert_eq!(svc.session_count(), 1);
    }
}
