use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

const JSON_CONTENT_TYPE: &str = "application/json";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Failed to encode payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload is empty")]
    Empty,
}

/// Opaque bytes fanned out to every connection.
///
/// Cloning shares the underlying buffer, so one encoded payload serves every
/// delivery attempt of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Bytes,
    content_type: &'static str,
}

impl Payload {
    /// Encode a message as JSON.
    pub fn json<T: Serialize + ?Sized>(message: &T) -> Result<Self, PayloadError> {
        let encoded = serde_json::to_vec(message)?;
        Self::with_content_type(Bytes::from(encoded), JSON_CONTENT_TYPE)
    }

    /// Wrap already-encoded bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, PayloadError> {
        Self::with_content_type(bytes.into(), BINARY_CONTENT_TYPE)
    }

    fn with_content_type(bytes: Bytes, content_type: &'static str) -> Result<Self, PayloadError> {
        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(Self {
            bytes,
            content_type,
        })
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("reading unavailable"))
        }
    }

    #[test]
    fn test_json_payload() {
        let payload = Payload::json(&json!({"type": "weather", "data": {"temp_c": 21.5}})).unwrap();
        assert_eq!(payload.content_type(), "application/json");
        let decoded: serde_json::Value = serde_json::from_slice(payload.as_slice()).unwrap();
        assert_eq!(decoded["data"]["temp_c"], 21.5);
    }

    #[test]
    fn test_encoding_failure() {
        let result = Payload::json(&Unencodable);
        assert!(matches!(result, Err(PayloadError::Serialization(_))));
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(matches!(Payload::from_bytes(Vec::<u8>::new()), Err(PayloadError::Empty)));
        let payload = Payload::from_bytes(&b"raw"[..]).unwrap();
        assert_eq!(payload.len(), 3);
        assert_eq!(payload.content_type(), "application/octet-stream");
    }
}
