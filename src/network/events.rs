use crate::events::{
    dispatcher,
    model::{CallEvent, CertificateEvent, DialEvent, HandshakeEvent, LogEvent, LogLevel, SystemEvent},
};
use crate::network::message::SessionId;
use crate::network::peer::Direction;

pub(crate) fn emit_dial_event(
    level: LogLevel,
    corr_id: &str,
    address: &str,
    state: &str,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta("dialer", level);
    meta.corr_id = Some(corr_id.to_string());
    dispatcher::emit(LogEvent::Dial(DialEvent {
        meta,
        address: address.to_string(),
        state: state.to_string(),
        detail,
    }));
}

pub(crate) fn emit_certificate_event(
    level: LogLevel,
    address: &str,
    action: &str,
    fingerprint: Option<String>,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta("certificate", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Certificate(CertificateEvent {
        meta,
        address: address.to_string(),
        action: action.to_string(),
        fingerprint,
        detail,
    }));
}

pub(crate) fn emit_handshake_event(
    level: LogLevel,
    direction: Direction,
    address: &str,
    status: &str,
    session_id: Option<&SessionId>,
    public_key: Option<&str>,
) {
    let mut meta = dispatcher::meta("handshake", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Handshake(HandshakeEvent {
        meta,
        direction,
        address: address.to_string(),
        status: status.to_string(),
        session_id: session_id.map(|s| s.to_string()),
        public_key: public_key.map(str::to_string),
    }));
}

pub(crate) fn emit_call_event(
    level: LogLevel,
    method: &str,
    attempt: u32,
    outcome: &str,
    detail: Option<String>,
) {
    let meta = dispatcher::meta("rpc", level);
    dispatcher::emit(LogEvent::Call(CallEvent {
        meta,
        method: method.to_string(),
        attempt,
        outcome: outcome.to_string(),
        detail,
    }));
}

pub(crate) fn emit_system_event(
    component: &'static str,
    level: LogLevel,
    action: &str,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta(component, level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::System(SystemEvent {
        meta,
        action: action.to_string(),
        detail,
    }));
}
