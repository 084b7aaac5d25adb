pub mod channel;
pub mod client;
pub mod dialer;
pub(crate) mod events;
pub mod handshake;
pub mod interceptor;
pub mod listener;
pub mod message;
pub mod peer;
pub mod transport;

pub use channel::{ChannelFactory, LocalKeyProvider, StaticKeyProvider, TlsChannelFactory};
pub use client::PeerClient;
pub use dialer::{DialOutcome, PeerDialer, Rejection};
pub use handshake::{
    BasicHandshakeProvider, BasicHandshakeValidator, DialAttempt, DialState, HandshakeEngine,
    HandshakeProvider, HandshakeValidator,
};
pub use interceptor::{AuthInterceptor, CallInterceptor, Next, RetryInterceptor};
pub use listener::{start_listener, CallContext, HandshakeService, PeerListener, PeerService};
pub use message::{Handshake, HandshakeData, HandshakeReply, HandshakeStatus, SessionId};
pub use peer::{Direction, Peer, PeerConnectionInfo};
pub use transport::{CallTransport, MessageLimits, TlsTransport};
