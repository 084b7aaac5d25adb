use clap::{ArgAction, Parser, Subcommand};
use peerlink::config::{Config, DialSettings};
use peerlink::network::{
    BasicHandshakeProvider, BasicHandshakeValidator, DialOutcome, PeerDialer, StaticKeyProvider,
};
use peerlink::security::identity::generate_node_public_key;
use peerlink::security::{
    crypto_provider, spki_fingerprint, CertificateExchange, RemoteCertificate,
    TlsCertificateExchange, TlsIdentity,
};
use rustls::pki_types::CertificateDer;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// peerlink-ctl: operator CLI for certificates and ad-hoc dials.
///
/// Works without a running node. Dial settings and chain id come from the
/// config file when it exists, defaults otherwise.
#[derive(Parser, Debug)]
#[command(
    name = "peerlink-ctl",
    version,
    about = "Operator CLI for peerlink (certs, probes, dials)"
)]
struct Cli {
    /// Path to peerlink config file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the certificate a remote presents and print its fingerprint
    Probe { address: String },
    /// Dial a remote and run the outbound handshake
    Dial {
        address: String,
        /// Hex public key to announce (generated when absent)
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Certificate operations on this node's own identity
    Cert {
        #[command(subcommand)]
        cmd: CertCmd,
    },
}

#[derive(Subcommand, Debug)]
enum CertCmd {
    /// Generate a self-signed listener certificate and key
    Generate {
        #[arg(long, default_value = "pki/own/cert.pem")]
        out_cert: PathBuf,
        #[arg(long, default_value = "pki/own/key.pem")]
        out_key: PathBuf,
        /// Overwrite output files if they exist
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
    /// Show the SPKI SHA-256 fingerprint of a PEM certificate
    Fingerprint {
        /// Defaults to [node].own_certificate or pki/own/cert.pem
        #[arg(long)]
        cert: Option<PathBuf>,
    },
}

fn load_config(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match Config::load(path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            std::process::exit(2);
        }
    }
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists; use --force to overwrite", path.display()),
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = File::create(path)?;
    f.write_all(contents)?;
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

fn fingerprint_from_pem_file(path: &Path) -> anyhow::Result<String> {
    let file = File::open(path)?;
    let der = rustls_pemfile::certs(&mut BufReader::new(file))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no certificate in {}", path.display()))?;
    Ok(spki_fingerprint(&CertificateDer::from(der)))
}

fn print_certificate(cert: &RemoteCertificate) {
    println!("Fingerprint (spki_sha256): {}", cert.fingerprint());
    match cert.subject() {
        Ok(subject) => println!("Subject: {}", subject),
        Err(e) => println!("Subject: <{}>", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    let settings = DialSettings::from_config(&config);
    let node = config.node.clone().unwrap_or_default();

    match cli.command {
        Commands::Probe { address } => {
            let exchange = match TlsCertificateExchange::new(&settings, crypto_provider()) {
                Ok(exchange) => exchange,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            };
            match exchange.retrieve(&address).await {
                Ok(cert) => print_certificate(&cert),
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Dial {
            address,
            public_key,
        } => {
            let public_key = match public_key.or(node.public_key.clone()) {
                Some(key) => key,
                None => match generate_node_public_key() {
                    Ok(key) => key,
                    Err(e) => {
                        eprintln!("❌ {:#}", e);
                        std::process::exit(1);
                    }
                },
            };
            let keys = Arc::new(StaticKeyProvider::new(public_key));
            let provider = Arc::new(BasicHandshakeProvider::new(
                keys.clone(),
                node.chain_id(),
                config.port,
            ));
            let validator = Arc::new(BasicHandshakeValidator::new(node.chain_id()));
            let dialer = match PeerDialer::from_settings(
                &settings,
                keys,
                provider,
                validator,
                crypto_provider(),
            ) {
                Ok(dialer) => dialer,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            };
            match dialer.dial_outbound(&address).await {
                Ok(DialOutcome::Established(peer)) => {
                    let info = peer.connection_info();
                    println!("✅ {}", peer.display());
                    println!("  protocol_version: {}", info.protocol_version());
                    println!("  session_id: {}", info.session_id());
                    peer.disconnect().await;
                }
                Ok(DialOutcome::Rejected(rejection)) => {
                    println!("⚠️ {}", rejection);
                    std::process::exit(3);
                }
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Cert { cmd } => match cmd {
            CertCmd::Generate {
                out_cert,
                out_key,
                force,
            } => {
                let (cert_pem, key_pem) = match TlsIdentity::issue_pem() {
                    Ok(pair) => pair,
                    Err(e) => {
                        eprintln!("❌ {:#}", e);
                        std::process::exit(1);
                    }
                };
                let written = write_file(&out_cert, cert_pem.as_bytes(), 0o644, force)
                    .and_then(|_| write_file(&out_key, key_pem.as_bytes(), 0o600, force));
                if let Err(e) = written {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
                println!("✅ Generated cert and key");
                println!("  cert: {}", out_cert.display());
                println!("  key:  {}", out_key.display());
                println!(
                    "\nAdd to config.toml:\n[node]\nown_certificate = \"{}\"\nown_private_key = \"{}\"",
                    out_cert.display(),
                    out_key.display()
                );
            }
            CertCmd::Fingerprint { cert } => {
                let cert_path = cert
                    .or_else(|| node.own_certificate.clone().map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("pki/own/cert.pem"));
                match fingerprint_from_pem_file(&cert_path) {
                    Ok(fp) => {
                        println!("Fingerprint (spki_sha256): {}", fp);
                        println!("Source: {}", cert_path.display());
                    }
                    Err(err) => {
                        eprintln!(
                            "❌ Failed to compute fingerprint from {}: {}",
                            cert_path.display(),
                            err
                        );
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
