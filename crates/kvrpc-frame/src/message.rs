//! JSON messages on top of length-prefixed frames.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{encode_frame, peek_length, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Serialize `message` to JSON and prefix it with its length.
pub fn encode_message<T: Serialize + ?Sized>(message: &T) -> Result<Bytes> {
    let payload = encode_payload(message)?;
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(&payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one complete framed message.
///
/// `bytes` must hold exactly one frame: the header and the number of payload
/// bytes it declares.
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let declared = peek_length(bytes).ok_or(FrameError::IncompleteHeader { len: bytes.len() })?;
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != declared {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    decode_payload(payload)
}

/// Serialize a message body (no header).
pub fn encode_payload<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(FrameError::Encode)
}

/// Deserialize a message body (no header).
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(payload)?;
    serde_json::from_str(text).map_err(FrameError::Decode)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::ErrorCategory;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
        values: Vec<u32>,
    }

    #[test]
    fn length_prefix_matches_payload() {
        let msg = json!({"type": "request", "method": "read", "args": [5]});
        let bytes = encode_message(&msg).unwrap();

        let declared = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, bytes.len() - HEADER_SIZE);

        let decoded: Value = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn typed_message_decodes() {
        let probe = Probe {
            name: "päyload ✓".to_string(),
            values: vec![1, 2, 3],
        };
        let bytes = encode_message(&probe).unwrap();
        let decoded: Probe = decode_message(&bytes).unwrap();
        assert_eq!(decoded, probe);
    }

    #[test]
    fn non_ascii_text_is_sent_as_utf8() {
        let bytes = encode_message(&json!("héllo")).unwrap();
        assert!(std::str::from_utf8(&bytes[HEADER_SIZE..])
            .unwrap()
            .contains("héllo"));
    }

    #[test]
    fn short_buffer_is_framing_error() {
        let err = decode_message::<Value>(&[0, 0]).unwrap_err();
        assert!(matches!(err, FrameError::IncompleteHeader { len: 2 }));
        assert_eq!(err.category(), ErrorCategory::Framing);
    }

    #[test]
    fn length_mismatch_is_framing_error() {
        let mut bytes = encode_message(&json!({"a": 1})).unwrap().to_vec();
        bytes.pop();
        let err = decode_message::<Value>(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
        assert_eq!(err.category(), ErrorCategory::Framing);
    }

    #[test]
    fn invalid_json_is_decoding_error() {
        let mut wire = BytesMut::new();
        encode_frame(b"{not json", &mut wire).unwrap();
        let err = decode_message::<Value>(&wire).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
        assert_eq!(err.category(), ErrorCategory::Decoding);
    }

    #[test]
    fn invalid_utf8_is_decoding_error() {
        let mut wire = BytesMut::new();
        encode_frame(&[b'"', 0xFF, 0xFE, b'"'], &mut wire).unwrap();
        let err = decode_message::<Value>(&wire).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
        assert_eq!(err.category(), ErrorCategory::Decoding);
    }

    #[test]
    fn wrong_shape_is_decoding_error() {
        let bytes = encode_message(&json!({"name": 7})).unwrap();
        let err = decode_message::<Probe>(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn unrepresentable_message_is_encoding_error() {
        // JSON object keys must be strings.
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "x");
        let err = encode_message(&map).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
        assert_eq!(err.category(), ErrorCategory::Encoding);
    }
}
