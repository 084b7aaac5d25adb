// src/network/client.rs

use crate::error::TransportError;
use crate::network::interceptor::{CallInterceptor, Next};
use crate::network::message::{
    CallMetadata, Handshake, HandshakeReply, HandshakeRequest, OutboundCall, PingReply,
    PingRequest, RpcCall, RpcReply,
};
use crate::network::transport::CallTransport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// RPC client bound to one authenticated channel. Every call goes through the
/// interceptor chain the channel was built with.
#[derive(Clone)]
pub struct PeerClient {
    address: String,
    transport: Arc<dyn CallTransport>,
    interceptors: Arc<[Arc<dyn CallInterceptor>]>,
}

impl PeerClient {
    pub fn new(
        address: &str,
        transport: Arc<dyn CallTransport>,
        interceptors: Vec<Arc<dyn CallInterceptor>>,
    ) -> Self {
        Self {
            address: address.to_string(),
            transport,
            interceptors: interceptors.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn call(&self, call: OutboundCall) -> Result<RpcReply, TransportError> {
        Next::new(self.transport.as_ref(), &self.interceptors)
            .run(call)
            .await
    }

    /// Not idempotent across attempts (fresh session ids), so no transport retry.
    pub async fn do_handshake(
        &self,
        handshake: Handshake,
        timeout: Duration,
    ) -> Result<HandshakeReply, TransportError> {
        let call = OutboundCall::new(
            RpcCall::DoHandshake(HandshakeRequest { handshake }),
            CallMetadata::new(timeout, 0),
        );
        match self.call(call).await? {
            RpcReply::Handshake(reply) => Ok(reply),
            other => Err(TransportError::Malformed(format!(
                "unexpected {} reply to DoHandshake",
                other.kind()
            ))),
        }
    }

    pub async fn ping(&self, timeout: Duration) -> Result<PingReply, TransportError> {
        let call = OutboundCall::new(
            RpcCall::Ping(PingRequest::default()),
            CallMetadata::new(timeout, 0),
        );
        match self.call(call).await? {
            RpcReply::Pong(reply) => Ok(reply),
            other => Err(TransportError::Malformed(format!(
                "unexpected {} reply to Ping",
                other.kind()
            ))),
        }
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.transport.is_shut_down()
    }
}

impl fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerClient")
            .field("address", &self.address)
            .field("interceptors", &self.interceptors.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
