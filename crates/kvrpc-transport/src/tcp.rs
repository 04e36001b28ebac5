use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RpcStream;

/// TCP listening endpoint.
///
/// Provides bind/accept on the server side and connect on the client side.
/// The listening socket is released when the endpoint is dropped.
pub struct TcpEndpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on the first address `addr` resolves to.
    ///
    /// Port `0` asks the OS for an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let label = addr.to_string();
        let candidates = resolve(&addr, &label)?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpListener::bind(candidate) {
                Ok(listener) => {
                    let addr = listener
                        .local_addr()
                        .map_err(|source| TransportError::Bind {
                            addr: label.clone(),
                            source,
                        })?;
                    info!(%addr, "listening on tcp");
                    return Ok(Self { listener, addr });
                }
                Err(err) => {
                    debug!(%candidate, error = %err, "bind attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Bind {
            addr: label,
            source: last_err.unwrap_or_else(|| std::io::Error::other("no address to bind")),
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<RpcStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(RpcStream::from(stream))
    }

    /// Connect to a listening endpoint (blocking, OS default timeout).
    pub fn connect<A>(addr: A) -> Result<RpcStream>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        Self::connect_inner(addr, None)
    }

    /// Connect to a listening endpoint, giving up on each candidate address
    /// after `timeout`.
    pub fn connect_timeout<A>(addr: A, timeout: Duration) -> Result<RpcStream>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        Self::connect_inner(addr, Some(timeout))
    }

    fn connect_inner<A>(addr: A, timeout: Option<Duration>) -> Result<RpcStream>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let label = addr.to_string();
        let candidates = resolve(&addr, &label)?;

        let mut last_err = None;
        for candidate in candidates {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    debug!(peer = %candidate, "connected over tcp");
                    return Ok(RpcStream::from(stream));
                }
                Err(err) => {
                    debug!(%candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            addr: label,
            source: last_err.unwrap_or_else(|| std::io::Error::other("no address to connect")),
        })
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// An address a local client can connect to.
    ///
    /// Wildcard binds (`0.0.0.0`, `::`) are mapped onto the matching loopback
    /// address.
    pub fn connectable_addr(&self) -> SocketAddr {
        connectable(self.addr)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("addr", &self.addr)
            .finish()
    }
}

/// Map a wildcard address onto loopback, keeping the port.
pub fn connectable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

fn resolve<A: ToSocketAddrs>(addr: &A, label: &str) -> Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|_| TransportError::Resolve {
            addr: label.to_string(),
        })?
        .collect();
    if candidates.is_empty() {
        return Err(TransportError::Resolve {
            addr: label.to_string(),
        });
    }
    Ok(candidates)
}
