//! Length-prefixed JSON message framing for kvrpc.
//!
//! Every message on the wire is framed as:
//! - A 4-byte big-endian payload length
//! - The payload: one UTF-8 JSON document
//!
//! No partial reads, no buffer management in user code.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{ErrorCategory, FrameError, Result};
pub use message::{decode_message, decode_payload, encode_message, encode_payload};
pub use reader::FrameReader;
pub use writer::FrameWriter;
