//! Inbound WebSocket frame decoding.
//!
//! Clients send `{"type": "...", "value": "..."}`. `value` is normally a
//! string; a JSON object or array is accepted too and kept as its compact
//! JSON text, so typed payloads may be sent either pre-encoded or inline.

use serde::{Deserialize, Deserializer};

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientFrame {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload as text. Empty when absent or `null`.
    #[serde(default, deserialize_with = "value_as_text")]
    pub value: String,
}

impl ClientFrame {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a JSON object with a string `type`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Returns `true` for an `auth_retro` frame carrying `secret`.
    #[must_use]
    pub fn is_auth_with(&self, secret: &str) -> bool {
        self.is_auth() && self.value == secret
    }

    /// Returns `true` for any `auth_retro` frame.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == "auth_retro"
    }
}

fn value_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}
