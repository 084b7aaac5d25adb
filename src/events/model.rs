use crate::network::peer::Direction;
use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn rank(self) -> u8 {
        match self {
            LogLevel::Trace => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warn => 3,
            LogLevel::Error => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub ts: SystemTime,
    pub level: LogLevel,
    pub corr_id: Option<String>,
    pub session_id: String,
    pub component: &'static str,
    pub suppress_console: bool,
}

/// State transition of a single dial attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DialEvent {
    pub meta: EventMeta,
    pub address: String,
    pub state: String,
    pub detail: Option<String>,
}

/// Certificate harvested by a probe or pinned onto a channel.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateEvent {
    pub meta: EventMeta,
    pub address: String,
    pub action: String,
    pub fingerprint: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeEvent {
    pub meta: EventMeta,
    pub direction: Direction,
    pub address: String,
    pub status: String,
    pub session_id: Option<String>,
    pub public_key: Option<String>,
}

/// One attempt of an RPC issued through the interceptor chain.
#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    pub meta: EventMeta,
    pub method: String,
    pub attempt: u32,
    pub outcome: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Dial(DialEvent),
    Certificate(CertificateEvent),
    Handshake(HandshakeEvent),
    Call(CallEvent),
    System(SystemEvent),
}

impl LogEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            LogEvent::Dial(e) => &e.meta,
            LogEvent::Certificate(e) => &e.meta,
            LogEvent::Handshake(e) => &e.meta,
            LogEvent::Call(e) => &e.meta,
            LogEvent::System(e) => &e.meta,
        }
    }
}
