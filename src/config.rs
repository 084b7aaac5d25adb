use crate::constants::{
    DEFAULT_CHAIN_ID, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_BACKOFF,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the peer service listens on
    pub port: u16,
    /// Node identity configuration
    pub node: Option<NodeConfig>,
    /// Outbound dial tuning (timeouts, message limits, retry)
    pub dial: Option<DialConfig>,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 6800,
            node: Some(NodeConfig::default()),
            dial: Some(DialConfig::default()),
            logging: None,
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    /// Hex public key announced to peers. Generated per run when absent.
    pub public_key: Option<String>,
    /// Chain id carried in handshakes; peers on other chains are rejected
    pub chain_id: Option<u32>,
    /// PEM certificate served by the listener. Generated when absent.
    pub own_certificate: Option<String>,
    /// PEM (PKCS#8 or RSA) private key matching `own_certificate`
    pub own_private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialConfig {
    /// Baseline dial timeout in milliseconds (probe, Ping). DoHandshake uses twice this.
    pub timeout_ms: Option<u64>,
    /// Largest request this node will send
    pub max_send_message_bytes: Option<usize>,
    /// Largest reply this node will accept
    pub max_receive_message_bytes: Option<usize>,
    pub retry: Option<RetryConfig>,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(DEFAULT_DIAL_TIMEOUT.as_millis() as u64),
            max_send_message_bytes: Some(DEFAULT_MAX_MESSAGE_BYTES),
            max_receive_message_bytes: Some(DEFAULT_MAX_MESSAGE_BYTES),
            retry: Some(RetryConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Upper bound on transparent retries for transient transport failures
    pub max_retries: Option<u32>,
    /// Fixed pause between retries in milliseconds
    pub backoff_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            backoff_ms: Some(DEFAULT_RETRY_BACKOFF.as_millis() as u64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Path to JSON line event log (rotated). If unset, defaults to logs/peerlink.jsonl
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
}

/// Retry policy applied by the retry interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Parsed + normalized dial settings derived from configuration. Read-only and
/// shared by every concurrent dial attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialSettings {
    pub dial_timeout: Duration,
    pub max_send_message_bytes: usize,
    pub max_receive_message_bytes: usize,
    pub retry: RetryPolicy,
}

impl Default for DialSettings {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            max_send_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_receive_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

impl DialSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let Some(dial) = &cfg.dial else {
            return Self::default();
        };
        let retry = dial
            .retry
            .as_ref()
            .map(|r| RetryPolicy {
                max_retries: r.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                backoff: r
                    .backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RETRY_BACKOFF),
            })
            .unwrap_or_default();
        Self {
            dial_timeout: dial
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DIAL_TIMEOUT),
            max_send_message_bytes: dial
                .max_send_message_bytes
                .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
            max_receive_message_bytes: dial
                .max_receive_message_bytes
                .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
            retry,
        }
    }

    /// DoHandshake deadline: the handshake pays an extra round trip on top of
    /// the pinned channel setup, so it gets twice the baseline.
    pub fn handshake_timeout(&self) -> Duration {
        self.dial_timeout * 2
    }

    pub fn ping_timeout(&self) -> Duration {
        self.dial_timeout
    }
}

impl NodeConfig {
    pub fn chain_id(&self) -> u32 {
        self.chain_id.unwrap_or(DEFAULT_CHAIN_ID)
    }
}
