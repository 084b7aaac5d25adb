use clap::Parser;
use parking_lot::Mutex;
use peerlink::{
    config::{Config, DialSettings},
    constants::*,
    events::{
        dispatcher,
        init_events_from_config,
        model::{LogEvent, LogLevel, SystemEvent},
    },
    network::{
        BasicHandshakeProvider, BasicHandshakeValidator, DialOutcome, HandshakeService, Peer,
        PeerDialer, PeerListener, StaticKeyProvider,
    },
    security::{crypto_provider, identity::generate_node_public_key, TlsIdentity},
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about = "peerlink node: authenticated peer links")]
struct Args {
    /// Optional path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listening port from the config
    #[arg(short, long)]
    port: Option<u16>,

    /// Peer address to dial on startup (repeatable), e.g. 10.0.0.5:9090
    #[arg(long = "dial")]
    dial: Vec<String>,
}

fn emit_node_event(action: &str, detail: Option<String>) {
    let mut meta = dispatcher::meta("node", LogLevel::Info);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::System(SystemEvent {
        meta,
        action: action.into(),
        detail,
    }));
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());
    let mut config = if std::path::Path::new(&config_path).exists() {
        match Config::load(&config_path) {
            Ok(cfg) => {
                println!("{}Loaded config from: {}", ICON_PLACEHOLDER, config_path);
                cfg
            }
            Err(err) => {
                eprintln!("❌ {:#}", err);
                std::process::exit(1);
            }
        }
    } else {
        println!(
            "⚠️ No config file found at '{}', falling back to default config.",
            config_path
        );
        Config::default()
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    // Events first so every later step is recorded.
    init_events_from_config(config.logging.as_ref(), None).await;

    let node = config.node.clone().unwrap_or_default();
    let public_key = match node.public_key.clone() {
        Some(key) => key,
        None => match generate_node_public_key() {
            Ok(key) => key,
            Err(e) => {
                eprintln!("❌ Failed to generate node key: {:#}", e);
                std::process::exit(1);
            }
        },
    };
    println!("{}Node public key: {}", ICON_PLACEHOLDER, public_key);
    emit_node_event(
        "identity_resolved",
        Some(format!("public_key={} chain_id={}", public_key, node.chain_id())),
    );

    let identity = match (&node.own_certificate, &node.own_private_key) {
        (Some(cert), Some(key)) => TlsIdentity::load_pem(cert, key),
        _ => TlsIdentity::issue_ephemeral(),
    };
    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("❌ Failed to prepare listener identity: {:#}", e);
            std::process::exit(1);
        }
    };

    let settings = DialSettings::from_config(&config);
    let keys = Arc::new(StaticKeyProvider::new(public_key));
    let provider = Arc::new(BasicHandshakeProvider::new(
        keys.clone(),
        node.chain_id(),
        config.port,
    ));
    let validator = Arc::new(BasicHandshakeValidator::new(node.chain_id()));

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let service = Arc::new(
        HandshakeService::new(provider.clone(), validator.clone()).with_accept_notifier(accepted_tx),
    );
    let listener = match PeerListener::bind(
        &format!("0.0.0.0:{}", config.port),
        identity,
        service,
        &settings,
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Listener error: {:#}", e);
            std::process::exit(1);
        }
    };
    tokio::spawn(listener.run());

    let dialer = match PeerDialer::from_settings(
        &settings,
        keys,
        provider,
        validator,
        crypto_provider(),
    ) {
        Ok(dialer) => dialer,
        Err(e) => {
            eprintln!("❌ Failed to build dialer: {}", e);
            std::process::exit(1);
        }
    };

    // Established links stay open until shutdown.
    let peers: Arc<Mutex<Vec<Peer>>> = Arc::new(Mutex::new(Vec::new()));

    // Confirm every inbound peer is reachable on the port it announced.
    let back_dialer = dialer.clone();
    let back_peers = peers.clone();
    tokio::spawn(async move {
        while let Some((remote, handshake)) = accepted_rx.recv().await {
            let address = format!("{}:{}", remote.ip(), handshake.data.listening_port);
            let dialer = back_dialer.clone();
            let peers = back_peers.clone();
            tokio::spawn(async move {
                if let Some(peer) = report(&address, dialer.dial_back(&address, handshake).await) {
                    peers.lock().push(peer);
                }
            });
        }
    });

    for address in args.dial {
        let dialer = dialer.clone();
        let peers = peers.clone();
        tokio::spawn(async move {
            if let Some(peer) = report(&address, dialer.dial_outbound(&address).await) {
                peers.lock().push(peer);
            }
        });
    }

    println!(
        "🟢 {} {} is running on port {}. Press Ctrl+C to shut down...",
        DEFAULT_APP_NAME,
        full_version(),
        config.port
    );
    if let Err(e) = signal::ctrl_c().await {
        eprintln!("❌ Failed to listen for shutdown signal: {}", e);
    }
    println!("🛑 {} shutting down gracefully.", DEFAULT_APP_NAME);
    let open: Vec<Peer> = std::mem::take(&mut *peers.lock());
    for peer in open {
        peer.disconnect().await;
    }
}

fn report(address: &str, result: Result<DialOutcome, peerlink::DialError>) -> Option<Peer> {
    match result {
        Ok(DialOutcome::Established(peer)) => {
            println!("{}Connected: {}", ICON_PLACEHOLDER, peer.display());
            Some(peer)
        }
        Ok(DialOutcome::Rejected(rejection)) => {
            println!("⚠️ Peer {} rejected: {}", address, rejection);
            None
        }
        Err(e) => {
            eprintln!("❌ Dial {} failed: {}", address, e);
            None
        }
    }
}
