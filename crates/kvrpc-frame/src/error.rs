/// Coarse classification of a [`FrameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The peer ended the stream on a frame boundary.
    Closed,
    /// Malformed or oversized framing on the wire.
    Framing,
    /// The message could not be serialized.
    Encoding,
    /// The payload was not UTF-8 JSON of the expected shape.
    Decoding,
    /// The underlying socket failed.
    Io,
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A complete frame buffer was shorter than the length header.
    #[error("incomplete frame header ({len} bytes, need 4)")]
    IncompleteHeader { len: usize },

    /// The declared payload length disagrees with the bytes supplied.
    #[error("frame length mismatch (header says {declared} bytes, got {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed mid-frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },

    /// The connection was closed before any byte of the next frame arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be serialized to JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload is not valid JSON for the expected message type.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

impl FrameError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionClosed => ErrorCategory::Closed,
            Self::IncompleteHeader { .. }
            | Self::LengthMismatch { .. }
            | Self::PayloadTooLarge { .. }
            | Self::Truncated { .. } => ErrorCategory::Framing,
            Self::Encode(_) => ErrorCategory::Encoding,
            Self::InvalidUtf8(_) | Self::Decode(_) => ErrorCategory::Decoding,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// True when the peer closed the stream cleanly between frames.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
