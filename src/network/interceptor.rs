// src/network/interceptor.rs
//
// Decorators around every outbound call. The chain is fixed when the channel
// is built: auth metadata first, then transport retry, then the transport.

use crate::config::RetryPolicy;
use crate::error::TransportError;
use crate::events::model::LogLevel;
use crate::network::events::emit_call_event;
use crate::network::message::{OutboundCall, RpcReply};
use crate::network::transport::CallTransport;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CallInterceptor: Send + Sync {
    async fn intercept(
        &self,
        call: OutboundCall,
        next: Next<'_>,
    ) -> Result<RpcReply, TransportError>;
}

/// Remainder of the chain below the current interceptor. `Copy`, so an
/// interceptor may run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn CallTransport,
    chain: &'a [Arc<dyn CallInterceptor>],
}

impl<'a> Next<'a> {
    pub fn new(transport: &'a dyn CallTransport, chain: &'a [Arc<dyn CallInterceptor>]) -> Self {
        Self { transport, chain }
    }

    pub async fn run(self, call: OutboundCall) -> Result<RpcReply, TransportError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.intercept(call, Next::new(self.transport, rest))
                    .await
            }
            None => self.transport.invoke(&call).await,
        }
    }
}

/// Stamps the local node's public key onto the call metadata so the remote can
/// tie the TLS identity to an application identity before any handshake.
pub struct AuthInterceptor {
    public_key: String,
}

impl AuthInterceptor {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl CallInterceptor for AuthInterceptor {
    async fn intercept(
        &self,
        mut call: OutboundCall,
        next: Next<'_>,
    ) -> Result<RpcReply, TransportError> {
        call.metadata.local_public_key = Some(self.public_key.clone());
        next.run(call).await
    }
}

/// Re-issues a call after transient transport failures. The budget is the
/// call's `retry-count` metadata capped by the policy; non-transient errors
/// and every reply the remote actually sent pass straight through.
pub struct RetryInterceptor {
    policy: RetryPolicy,
}

impl RetryInterceptor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl CallInterceptor for RetryInterceptor {
    async fn intercept(
        &self,
        call: OutboundCall,
        next: Next<'_>,
    ) -> Result<RpcReply, TransportError> {
        let budget = call.metadata.retry_count.min(self.policy.max_retries);
        let method = call.method();
        let mut retries = 0u32;
        loop {
            match next.run(call.clone()).await {
                Err(err) if err.is_transient() && retries < budget => {
                    retries += 1;
                    emit_call_event(
                        LogLevel::Debug,
                        method,
                        retries,
                        "retry",
                        Some(err.to_string()),
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(err) => {
                    if retries > 0 {
                        emit_call_event(
                            LogLevel::Warn,
                            method,
                            retries,
                            "retries_exhausted",
                            Some(err.to_string()),
                        );
                    }
                    return Err(err);
                }
                Ok(reply) => return Ok(reply),
            }
        }
    }
}

/// The chain every authenticated channel carries, in call order.
pub fn default_chain(public_key: &str, retry: RetryPolicy) -> Vec<Arc<dyn CallInterceptor>> {
    vec![
        Arc::new(AuthInterceptor::new(public_key)),
        Arc::new(RetryInterceptor::new(retry)),
    ]
}
