//! The unit of data passed through `write`.

use crate::error::Result;
use serde_json::Value;
use std::fmt;

/// An opaque unit of data travelling through a pipeline.
///
/// Stages never look inside a chunk. The only exception is `Transform`,
/// which skips forwarding a produced chunk when [`Chunk::is_empty`] holds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Chunk {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A structured value.
    Value(Value),
}

impl Chunk {
    /// Returns `true` for chunks that carry nothing worth forwarding:
    /// empty text, empty bytes, `null`, `false`, zero and the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Chunk::Text(text) => text.is_empty(),
            Chunk::Bytes(bytes) => bytes.is_empty(),
            Chunk::Value(value) => match value {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::Number(n) => n.as_f64() == Some(0.0),
                Value::String(s) => s.is_empty(),
                Value::Array(_) | Value::Object(_) => false,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Chunk::Text(text) => Some(text),
            Chunk::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Chunk::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Serializes the chunk as JSON text.
    ///
    /// Text is quoted, bytes become an array of numbers and structured
    /// values are written compactly (`{"is":42}`).
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Chunk::Text(text) => serde_json::to_string(text)?,
            Chunk::Bytes(bytes) => serde_json::to_string(bytes)?,
            Chunk::Value(value) => serde_json::to_string(value)?,
        };
        Ok(json)
    }

    /// Consumes the chunk, returning its byte representation.
    /// Structured values are encoded as compact JSON.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Chunk::Text(text) => Ok(text.into_bytes()),
            Chunk::Bytes(bytes) => Ok(bytes),
            Chunk::Value(value) => Ok(serde_json::to_vec(&value)?),
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Text(text) => f.write_str(text),
            Chunk::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Chunk::Value(Value::String(s)) => f.write_str(s),
            Chunk::Value(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string())
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Chunk::Bytes(bytes.to_vec())
    }
}

impl From<Value> for Chunk {
    fn from(value: Value) -> Self {
        Chunk::Value(value)
    }
}

/// An optional tag describing how a chunk is encoded.
///
/// Passed through unchanged to processing functions and downstream
/// writes; nothing in this crate interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Encoding(String);

impl Encoding {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Encoding {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_chunks() {
        assert!(Chunk::from("").is_empty());
        assert!(Chunk::from(Vec::new()).is_empty());
        assert!(Chunk::from(json!(null)).is_empty());
        assert!(Chunk::from(json!(false)).is_empty());
        assert!(Chunk::from(json!(0)).is_empty());
        assert!(Chunk::from(json!("")).is_empty());

        assert!(!Chunk::from("a").is_empty());
        assert!(!Chunk::from(json!({})).is_empty());
        assert!(!Chunk::from(json!([])).is_empty());
        assert!(!Chunk::from(json!(1.5)).is_empty());
    }

    #[test]
    fn json_text() {
        assert_eq!(Chunk::from(json!({"is": 42})).to_json().unwrap(), r#"{"is":42}"#);
        assert_eq!(Chunk::from("hello").to_json().unwrap(), r#""hello""#);
        assert_eq!(Chunk::from(vec![1u8, 2]).to_json().unwrap(), "[1,2]");
    }

    #[test]
    fn display_matches_string_conversion() {
        assert_eq!(Chunk::from("hello").to_string(), "hello");
        assert_eq!(Chunk::from(b"hi".as_slice()).to_string(), "hi");
        assert_eq!(Chunk::from(json!("inner")).to_string(), "inner");
        assert_eq!(Chunk::from(json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn into_bytes() {
        assert_eq!(Chunk::from("ab").into_bytes().unwrap(), b"ab");
        assert_eq!(Chunk::from(json!([1])).into_bytes().unwrap(), b"[1]");
    }

    #[test]
    fn encoding_is_opaque() {
        let enc = Encoding::from("utf8");
        assert_eq!(enc.as_str(), "utf8");
        assert_eq!(enc.to_string(), "utf8");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_derives_roundtrip() {
        let chunks = vec![
            Chunk::from("text"),
            Chunk::from(vec![0u8, 255]),
            Chunk::from(json!({"is": 42})),
        ];
        let encoded = serde_json::to_string(&chunks).unwrap();
        let decoded: Vec<Chunk> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, chunks);

        let enc = Encoding::from("utf8");
        let decoded: Encoding =
            serde_json::from_str(&serde_json::to_string(&enc).unwrap()).unwrap();
        assert_eq!(decoded, enc);
    }
}
