use std::fmt;
use std::time::Duration;

use kvrpc_frame::{FrameConfig, FrameReader, FrameWriter};
use kvrpc_transport::{RpcStream, TcpEndpoint};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::message::{MessageKind, Outcome, Request, Response};

/// Client behavior configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Give up connecting after this long. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Framing limits and socket read/write timeouts.
    pub frame: FrameConfig,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            frame: FrameConfig::default(),
            nodelay: true,
        }
    }
}

struct Connection {
    reader: FrameReader<RpcStream>,
    writer: FrameWriter<RpcStream>,
}

impl Connection {
    fn open(addr: &str, config: &ClientConfig) -> ClientResult<Self> {
        let stream = match config.connect_timeout {
            Some(timeout) => TcpEndpoint::connect_timeout(addr, timeout),
            None => TcpEndpoint::connect(addr),
        }
        .map_err(ClientError::Connect)?;

        stream.set_nodelay(config.nodelay).map_err(ClientError::Connect)?;
        let reader_stream = stream.try_clone().map_err(ClientError::Connect)?;
        let reader = FrameReader::with_config_stream(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_stream(stream, config.frame.clone())?;
        Ok(Self { reader, writer })
    }
}

/// Synchronous RPC client stub.
///
/// Connects lazily on the first call and keeps the connection open between
/// calls. A network failure drops the connection; the next call reconnects.
/// Request ids keep counting across reconnects.
pub struct RpcClient {
    addr: String,
    config: ClientConfig,
    conn: Option<Connection>,
    next_request_id: u64,
}

impl RpcClient {
    /// Create a client for `addr` (`host:port`). Performs no I/O.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            conn: None,
            next_request_id: 0,
        }
    }

    /// Server address this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Establish the connection if it is not already open.
    pub fn connect(&mut self) -> ClientResult<()> {
        self.connection().map(|_| ())
    }

    /// True while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Id the next request will carry.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id
    }

    /// Invoke `method` with positional arguments.
    pub fn call(&mut self, method: &str, args: Vec<Value>) -> ClientResult<Value> {
        self.call_with_kwargs(method, args, Map::new())
    }

    /// Invoke `method` with positional and named arguments.
    ///
    /// Returns the `result` of a success response. An error response becomes
    /// [`ClientError::Remote`].
    pub fn call_with_kwargs(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> ClientResult<Value> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let request = Request::new(request_id, method, args, kwargs);

        let raw = match self.exchange(&request) {
            Ok(raw) => raw,
            Err(err) => {
                if err.is_network() {
                    self.drop_connection();
                }
                return Err(err);
            }
        };

        let response = match parse_response(raw, request_id) {
            Ok(response) => response,
            Err(err) => {
                // The stream can no longer be trusted to line up with our requests.
                warn!(addr = %self.addr, request_id, error = %err, "invalid response");
                self.drop_connection();
                return Err(err);
            }
        };

        match response.outcome {
            Outcome::Success { result } => Ok(result),
            Outcome::Error { error, message } => {
                debug!(request_id, method, kind = %error, "remote error");
                Err(ClientError::Remote {
                    kind: error,
                    message,
                })
            }
        }
    }

    /// Close the connection. Safe to call at any time, any number of times.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.writer.get_ref().shutdown() {
                debug!(addr = %self.addr, error = %err, "shutdown failed");
            }
            debug!(addr = %self.addr, "connection closed");
        }
    }

    fn exchange(&mut self, request: &Request) -> ClientResult<Value> {
        let conn = self.connection()?;
        conn.writer.write_message(request)?;
        Ok(conn.reader.read_message::<Value>()?)
    }

    fn connection(&mut self) -> ClientResult<&mut Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = Connection::open(&self.addr, &self.config)?;
                debug!(addr = %self.addr, "connected");
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn drop_connection(&mut self) {
        if self.conn.take().is_some() {
            debug!(addr = %self.addr, "dropping connection after failure");
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}

fn parse_response(raw: Value, request_id: u64) -> ClientResult<Response> {
    // `Outcome` is flattened, so serde cannot reject the other variant's fields.
    let foreign: &[&str] = match raw.get("status").and_then(Value::as_str) {
        Some("success") => &["error", "message"],
        Some("error") => &["result"],
        _ => &[],
    };
    if let Some(key) = foreign.iter().find(|key| raw.get(**key).is_some()) {
        return Err(ClientError::InvalidResponse(format!(
            "\"{key}\" is not allowed in a {} response",
            raw["status"]
        )));
    }

    let response: Response = serde_json::from_value(raw)
        .map_err(|err| ClientError::InvalidResponse(err.to_string()))?;

    if response.kind != MessageKind::Response {
        return Err(ClientError::InvalidResponse(format!(
            "expected message type \"response\", got \"{}\"",
            response.kind
        )));
    }
    if response.request_id != request_id {
        return Err(ClientError::InvalidResponse(format!(
            "response id {} does not match request id {request_id}",
            response.request_id
        )));
    }
    Ok(response)
}

/// Typed stub for the datastore methods.
#[derive(Debug)]
pub struct DatastoreClient {
    client: RpcClient,
}

impl DatastoreClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::from_client(RpcClient::new(addr))
    }

    pub fn from_client(client: RpcClient) -> Self {
        Self { client }
    }

    /// Store `data` at `index` on the server.
    pub fn write(&mut self, index: u64, data: &str) -> ClientResult<()> {
        self.client
            .call("write", vec![Value::from(index), Value::from(data)])?;
        Ok(())
    }

    /// Value stored at `index` on the server.
    pub fn read(&mut self, index: u64) -> ClientResult<String> {
        match self.client.call("read", vec![Value::from(index)])? {
            Value::String(data) => Ok(data),
            other => Err(ClientError::InvalidResponse(format!(
                "read returned {other}, expected a string"
            ))),
        }
    }

    pub fn client_mut(&mut self) -> &mut RpcClient {
        &mut self.client
    }

    pub fn into_inner(self) -> RpcClient {
        self.client
    }
}
