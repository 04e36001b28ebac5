//! TCP transport for kvrpc.
//!
//! This is the lowest layer of kvrpc. It owns sockets and nothing else:
//! binding and accepting on the server side, connecting on the client side.
//! Everything else builds on top of the [`RpcStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::RpcStream;
pub use tcp::TcpEndpoint;
