// src/network/transport.rs

use crate::constants::PINNED_SERVER_NAME;
use crate::error::TransportError;
use crate::events::model::LogLevel;
use crate::network::events::emit_system_event;
use crate::network::message::{
    encode_frame, read_frame, OutboundCall, RpcReply, RpcRequest, RpcResponse,
};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Bottom of the interceptor chain: moves one call to the remote and back.
#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn invoke(&self, call: &OutboundCall) -> Result<RpcReply, TransportError>;

    /// Release the connection. Idempotent; never fails the caller.
    async fn shutdown(&self);

    fn is_shut_down(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub max_send: usize,
    pub max_receive: usize,
}

struct Connection {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
}

/// Pinned TLS channel to one remote address. Connects lazily on the first
/// call and reconnects after a transport failure, so a retried call gets a
/// fresh connection. Calls on one channel are serialized.
pub struct TlsTransport {
    address: String,
    connector: TlsConnector,
    limits: MessageLimits,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    conn: Mutex<Option<Connection>>,
}

impl TlsTransport {
    pub fn new(address: &str, connector: TlsConnector, limits: MessageLimits) -> Self {
        Self {
            address: address.to_string(),
            connector,
            limits,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            conn: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        let server_name = ServerName::try_from(PINNED_SERVER_NAME)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        let (r, w) = tokio::io::split(tls);
        Ok(Connection {
            reader: BufReader::new(r),
            writer: w,
        })
    }

    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        frame: &[u8],
        id: u64,
    ) -> Result<RpcReply, TransportError> {
        if slot.is_none() {
            *slot = Some(self.connect().await?);
        }
        let conn = slot.as_mut().ok_or(TransportError::Closed)?;
        conn.writer
            .write_all(frame)
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        conn.writer
            .flush()
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        let response: RpcResponse = read_frame(&mut conn.reader, self.limits.max_receive).await?;
        if response.id != id {
            return Err(TransportError::Malformed(format!(
                "reply id {} does not match request id {}",
                response.id, id
            )));
        }
        match response.reply {
            RpcReply::Failed { message } => Err(TransportError::Remote(message)),
            reply => Ok(reply),
        }
    }
}

#[async_trait]
impl CallTransport for TlsTransport {
    async fn invoke(&self, call: &OutboundCall) -> Result<RpcReply, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            metadata: call.metadata.clone(),
            call: call.call.clone(),
        };
        let frame = encode_frame(&request, self.limits.max_send)?;
        let timeout = call.metadata.timeout();

        let mut slot = self.conn.lock().await;
        let result = match tokio::time::timeout(timeout, self.exchange(&mut *slot, &frame, id)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        if result.is_err() {
            // Stream state is unknown after a failure; the next call reconnects.
            *slot = None;
        }
        result
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let conn = self.conn.lock().await.take();
        if let Some(mut conn) = conn {
            if let Err(e) = conn.writer.shutdown().await {
                emit_system_event(
                    "transport",
                    LogLevel::Debug,
                    "channel_shutdown_error",
                    Some(format!("addr={} err={}", self.address, e)),
                );
            }
        }
        emit_system_event(
            "transport",
            LogLevel::Debug,
            "channel_shutdown",
            Some(format!("addr={}", self.address)),
        );
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
