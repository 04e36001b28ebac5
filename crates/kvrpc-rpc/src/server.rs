use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kvrpc_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use kvrpc_transport::{tcp, RpcStream, TcpEndpoint, TransportError};
use tracing::{debug, info, warn};

use crate::datastore::Datastore;
use crate::dispatch::Dispatcher;
use crate::error::{Result, RpcError};
use crate::message::{MessageKind, Request};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Server behavior configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Framing limits and per-connection socket timeouts.
    pub frame: FrameConfig,
    /// Disable Nagle's algorithm on accepted connections.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            nodelay: true,
        }
    }
}

/// Blocking RPC server: one thread per connection.
pub struct RpcServer {
    endpoint: TcpEndpoint,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    shutdown: Arc<AtomicBool>,
    next_conn_id: AtomicU64,
}

impl RpcServer {
    /// Bind `addr` and serve `store` with default configuration.
    pub fn bind<A>(addr: A, store: Arc<dyn Datastore>) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        Self::bind_with_config(addr, store, ServerConfig::default())
    }

    /// Bind `addr` with explicit configuration.
    pub fn bind_with_config<A>(addr: A, store: Arc<dyn Datastore>, config: ServerConfig) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let endpoint = TcpEndpoint::bind(addr)?;
        Ok(Self {
            endpoint,
            dispatcher: Arc::new(Dispatcher::new(store)),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Bind then serve on the calling thread until stopped.
    pub fn start<A>(addr: A, store: Arc<dyn Datastore>) -> Result<()>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        Self::bind(addr, store)?.serve()
    }

    /// Bound address. Reports the real port when bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Handle that can stop this server from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            wake_addr: self.endpoint.connectable_addr(),
        }
    }

    /// Accept and serve connections until [`ServerHandle::stop`] is called.
    ///
    /// Accept failures are logged and the loop keeps going. Connections that
    /// are already being served keep running after this returns; the
    /// listening socket is released.
    pub fn serve(self) -> Result<()> {
        info!(addr = %self.local_addr(), "server started");

        while !self.shutdown.load(Ordering::Acquire) {
            let stream = match self.endpoint.accept() {
                Ok(stream) => stream,
                Err(err) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    warn!(error = %err, "accept failed");
                    thread::sleep(ACCEPT_BACKOFF);
                    continue;
                }
            };

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            self.spawn_handler(stream);
        }

        info!(addr = %self.local_addr(), "server stopped");
        Ok(())
    }

    /// Run [`RpcServer::serve`] on a background thread.
    pub fn spawn(self) -> Result<RunningServer> {
        let handle = self.handle();
        let local_addr = self.local_addr();
        let thread = thread::Builder::new()
            .name("kvrpc-accept".to_string())
            .spawn(move || self.serve())
            .map_err(TransportError::Io)?;

        Ok(RunningServer {
            handle,
            local_addr,
            thread: Some(thread),
        })
    }

    fn spawn_handler(&self, stream: RpcStream) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let peer = stream.peer_addr();
        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();

        info!(conn = conn_id, peer = ?peer, "client connected");

        let spawned = thread::Builder::new()
            .name(format!("kvrpc-conn-{conn_id}"))
            .spawn(move || match serve_connection(stream, &dispatcher, &config) {
                Ok(served) => {
                    debug!(conn = conn_id, peer = ?peer, served, "client disconnected");
                }
                Err(err) => {
                    warn!(conn = conn_id, peer = ?peer, error = %err, "connection dropped");
                }
            });

        if let Err(err) = spawned {
            warn!(conn = conn_id, peer = ?peer, error = %err, "failed to spawn handler thread");
        }
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("addr", &self.local_addr())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Serve requests on one connection until the peer goes away.
///
/// Returns the number of requests answered when the peer closes cleanly
/// between messages. Any other failure ends the connection with an error.
pub fn serve_connection(
    stream: RpcStream,
    dispatcher: &Dispatcher,
    config: &ServerConfig,
) -> Result<u64> {
    stream.set_nodelay(config.nodelay)?;
    let reader_stream = stream.try_clone()?;
    let mut reader = FrameReader::with_config_stream(reader_stream, config.frame.clone())?;
    let mut writer = FrameWriter::with_config_stream(stream, config.frame.clone())?;

    let mut served = 0u64;
    loop {
        let request: Request = match reader.read_message() {
            Ok(request) => request,
            Err(FrameError::ConnectionClosed) => return Ok(served),
            Err(err) => return Err(err.into()),
        };

        if request.kind != MessageKind::Request {
            return Err(RpcError::MalformedRequest(format!(
                "expected message type \"request\", got \"{}\"",
                request.kind
            )));
        }

        let response = dispatcher.dispatch(&request);
        writer.write_message(&response)?;
        served += 1;
    }
}

/// Cloneable stop switch for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ServerHandle {
    /// Ask the server to stop accepting connections.
    ///
    /// Wakes the blocked `accept` with a throwaway loopback connection.
    /// Calling this more than once has no further effect.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(addr = %self.wake_addr, "stopping server");
        if let Err(err) = TcpEndpoint::connect_timeout(self.wake_addr, WAKE_TIMEOUT) {
            debug!(error = %err, "wake connection failed");
        }
    }

    /// True once [`ServerHandle::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// A server running on a background thread.
///
/// Dropping it stops the server and waits for the accept loop to exit.
pub struct RunningServer {
    handle: ServerHandle,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<Result<()>>>,
}

impl RunningServer {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address a local client should connect to.
    pub fn connect_addr(&self) -> SocketAddr {
        tcp::connectable(self.local_addr)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Wait for the accept loop to finish.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RpcError::ServerPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.stop();
            if let Err(err) = self.join_inner() {
                warn!(error = %err, "server exited with error");
            }
        }
    }
}

impl fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningServer")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.handle.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;

    use serde_json::{json, Value};

    use super::*;
    use crate::client::DatastoreClient;
    use crate::datastore::MemoryDatastore;
    use crate::message::Response;

    fn spawn_server() -> (RunningServer, Arc<MemoryDatastore>) {
        let store = Arc::new(MemoryDatastore::new());
        let server = RpcServer::bind("127.0.0.1:0", store.clone())
            .expect("server should bind")
            .spawn()
            .expect("server should spawn");
        (server, store)
    }

    fn raw_connect(server: &RunningServer) -> (FrameReader<TcpStream>, FrameWriter<TcpStream>) {
        let stream = TcpStream::connect(server.connect_addr()).expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout should apply");
        let reader = FrameReader::new(stream.try_clone().expect("stream should clone"));
        (reader, FrameWriter::new(stream))
    }

    #[test]
    fn answers_requests_in_order() {
        let (server, store) = spawn_server();
        let (mut reader, mut writer) = raw_connect(&server);

        writer
            .write_message(&Request::positional(0, "write", vec![json!(3), json!("abc")]))
            .unwrap();
        let resp: Response = reader.read_message().unwrap();
        assert_eq!(resp, Response::success(0, Value::Null));

        writer
            .write_message(&Request::positional(1, "read", vec![json!(3)]))
            .unwrap();
        let resp: Response = reader.read_message().unwrap();
        assert_eq!(resp, Response::success(1, json!("abc")));

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn client_hangup_ends_handler_cleanly() {
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").expect("endpoint should bind");
        let addr = endpoint.connectable_addr();
        let handler = thread::spawn(move || {
            let stream = endpoint.accept().expect("client should connect");
            let dispatcher = Dispatcher::new(Arc::new(MemoryDatastore::new()));
            serve_connection(stream, &dispatcher, &ServerConfig::default())
        });

        let mut client = DatastoreClient::new(addr.to_string());
        client.write(0, "x").expect("write should succeed");
        drop(client);

        let served = handler.join().expect("handler should not panic");
        assert_eq!(served.expect("clean close is not an error"), 1);
    }

    #[test]
    fn wrong_message_type_closes_connection() {
        let (server, _) = spawn_server();
        let (mut reader, mut writer) = raw_connect(&server);

        writer
            .write_message(&Response::success(0, Value::Null))
            .unwrap();
        let err = reader.read_message::<Response>().unwrap_err();
        assert!(err.is_clean_close(), "unexpected error: {err}");
    }

    #[test]
    fn garbage_payload_does_not_affect_other_clients() {
        let (server, _) = spawn_server();

        let mut bad = TcpStream::connect(server.connect_addr()).unwrap();
        bad.write_all(&[0, 0, 0, 3, b'{', b'{', b'{']).unwrap();

        let (mut reader, mut writer) = raw_connect(&server);
        writer
            .write_message(&Request::positional(0, "write", vec![json!(1), json!("ok")]))
            .unwrap();
        let resp: Response = reader.read_message().unwrap();
        assert!(resp.is_success());
    }

    #[test]
    fn stop_releases_listener() {
        let (server, _) = spawn_server();
        let addr = server.local_addr();
        let handle = server.handle();

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        server.join().expect("accept loop should exit cleanly");

        let rebound = TcpEndpoint::bind(addr).expect("port should be free after stop");
        assert_eq!(rebound.local_addr(), addr);
    }

    #[test]
    fn drop_stops_server() {
        let (server, _) = spawn_server();
        let handle = server.handle();
        drop(server);
        assert!(handle.is_stopped());
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.nodelay);
        assert!(config.frame.read_timeout.is_none());
    }
}
