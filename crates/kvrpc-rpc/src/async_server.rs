//! Tokio flavor of the RPC server.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use kvrpc_frame::{decode_payload, encode_payload, FrameCodec, FrameError};
use kvrpc_transport::TransportError;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::datastore::Datastore;
use crate::dispatch::Dispatcher;
use crate::error::{Result, RpcError};
use crate::message::{MessageKind, Request};
use crate::server::ServerConfig;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// RPC server running one tokio task per connection.
pub struct AsyncRpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    token: CancellationToken,
}

impl AsyncRpcServer {
    pub async fn bind<A>(addr: A, store: Arc<dyn Datastore>) -> Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        Self::bind_with_config(addr, store, ServerConfig::default()).await
    }

    pub async fn bind_with_config<A>(
        addr: A,
        store: Arc<dyn Datastore>,
        config: ServerConfig,
    ) -> Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let label = addr.to_string();
        let bind_err = |source: io::Error| TransportError::Bind {
            addr: label.clone(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(&bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(addr = %local_addr, "listening on tcp (async)");

        Ok(Self {
            listener,
            local_addr,
            dispatcher: Arc::new(Dispatcher::new(store)),
            config,
            token: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops [`AsyncRpcServer::serve`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Accept connections until the shutdown token is cancelled.
    ///
    /// Connection tasks already running are left to finish on their own.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.local_addr, "server started");
        let mut next_conn_id = 1u64;

        loop {
            let accepted = tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let conn_id = next_conn_id;
            next_conn_id += 1;
            info!(conn = conn_id, %peer, "client connected");

            let dispatcher = Arc::clone(&self.dispatcher);
            let config = self.config.clone();
            tokio::spawn(async move {
                match serve_connection(stream, &dispatcher, &config).await {
                    Ok(served) => debug!(conn = conn_id, %peer, served, "client disconnected"),
                    Err(err) => warn!(conn = conn_id, %peer, error = %err, "connection dropped"),
                }
            });
        }

        info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for AsyncRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRpcServer")
            .field("addr", &self.local_addr)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn serve_connection(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    config: &ServerConfig,
) -> Result<u64> {
    stream
        .set_nodelay(config.nodelay)
        .map_err(TransportError::Io)?;
    let codec = FrameCodec::with_max_payload(config.frame.max_payload_size);
    let mut framed = Framed::new(stream, codec);

    let mut served = 0u64;
    loop {
        let payload = match deadline(config.frame.read_timeout, framed.next()).await? {
            Some(payload) => payload?,
            None => return Ok(served),
        };

        let request: Request = decode_payload(&payload)?;
        if request.kind != MessageKind::Request {
            return Err(RpcError::MalformedRequest(format!(
                "expected message type \"request\", got \"{}\"",
                request.kind
            )));
        }

        let response = dispatcher.dispatch(&request);
        let encoded = Bytes::from(encode_payload(&response)?);
        deadline(config.frame.write_timeout, framed.send(encoded)).await??;
        served += 1;
    }
}

async fn deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            RpcError::Frame(FrameError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "socket operation timed out",
            )))
        }),
        None => Ok(fut.await),
    }
}
