//! Message payloads and inbound text decoding
//!
//! Payloads are opaque to resock: a message is either text or binary and is
//! passed through without inspection. The only interpretation happening here
//! is the decoding of inbound text frames, controlled by [`TextEncoding`].

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single WebSocket message
///
/// Exactly one variant is populated; messages are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Message {
    /// UTF-8 text payload
    Text(String),
    /// Raw binary payload
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Create a binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// True for text messages
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// True for binary messages
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Borrow the text payload, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    /// Borrow the payload bytes regardless of variant
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True when the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label used in logs and metric attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Message::Binary(data.to_vec())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(text) => write!(f, "{}", text),
            Message::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// How inbound text payloads are decoded
///
/// Text frames are UTF-8 on the wire. `Utf8` rejects malformed payloads,
/// which are then reported as a transport error and dropped; `Utf8Lossy`
/// replaces invalid sequences with U+FFFD and always delivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Strict UTF-8
    #[default]
    Utf8,
    /// UTF-8 with replacement of invalid sequences
    Utf8Lossy,
}

impl TextEncoding {
    /// Decode raw text frame bytes into a string
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String, TransportError> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes).map_err(|e| TransportError::InvalidPayload(e.to_string()))
            }
            TextEncoding::Utf8Lossy => match String::from_utf8(bytes) {
                Ok(text) => Ok(text),
                Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            },
        }
    }
}
