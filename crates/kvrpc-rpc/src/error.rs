use kvrpc_frame::{ErrorCategory, FrameError};
use kvrpc_transport::TransportError;

use crate::message::RemoteErrorKind;

/// Errors that can occur on the server side of a connection.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A well-formed frame that is not a request.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The server thread panicked.
    #[error("server thread panicked")]
    ServerPanicked,
}

impl RpcError {
    /// True when the peer closed the connection between messages.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Frame(err) if err.is_clean_close())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors returned by the client stub.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection could not be established.
    #[error("network error: {0}")]
    Connect(#[source] TransportError),

    /// Sending the request or receiving the response failed.
    #[error("network error: {0}")]
    Network(#[from] FrameError),

    /// The server processed the request and the operation failed.
    #[error("remote error: {kind}: {message}")]
    Remote { kind: String, message: String },

    /// The server answered with something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Connection establishment or I/O failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Network(_))
    }

    /// Failure reported by, or attributable to, the server.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::InvalidResponse(_))
    }

    /// Error kind reported by the server, if it is one this crate knows.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => kind.parse().ok(),
            _ => None,
        }
    }

    /// Frame error category for network failures.
    pub fn frame_category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Network(err) => Some(err.category()),
            _ => None,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
