//! Central place for protocol constants and default values.

use std::time::Duration;

/// Default application name used in logs.
pub const DEFAULT_APP_NAME: &str = "peerlink";

/// Left padding used to align console log lines.
pub const ICON_PLACEHOLDER: &str = "   ";

/// Protocol version advertised in handshakes (bump when the handshake changes).
pub const PROTOCOL_VERSION: u32 = 1;

/// Default chain id when none is configured.
pub const DEFAULT_CHAIN_ID: u32 = 9992731;

/// Fixed TLS server name / certificate common name. Certificates are self-signed
/// and never bound to a network address, so every node uses this name.
pub const PINNED_SERVER_NAME: &str = "peerlink";

/// Baseline dial timeout (certificate probe, Ping).
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(3000);

/// Message size limit applied to both directions unless configured.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Transparent transport retries allowed by the retry interceptor.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Fixed pause between transparent retries.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Inbound connections with no request for this long are closed.
pub const LISTENER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an accepted inbound session id keeps blocking replays.
pub const SESSION_WINDOW_TTL: Duration = Duration::from_secs(600);

/// Most inbound session ids remembered at once; the oldest go first.
pub const SESSION_WINDOW_CAPACITY: usize = 4096;

/// Length in bytes of a generated session id.
pub const SESSION_ID_LEN: usize = 16;

/// Call metadata key: transparent retry budget for transient failures.
pub const RETRY_COUNT_METADATA_KEY: &str = "retry-count";
/// Call metadata key: call deadline in milliseconds.
pub const TIMEOUT_METADATA_KEY: &str = "timeout";
/// Call metadata key: hex public key of the calling node.
pub const PUBLIC_KEY_METADATA_KEY: &str = "local-public-key";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!("v{} (protocol={})", APP_VERSION, PROTOCOL_VERSION)
}
