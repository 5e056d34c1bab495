//! Error types for the protocol layer.
//!
//! Each crate in Rallypoint defines its own error enum. A `ProtocolError`
//! always means the problem is in turning bytes into events (or back), or
//! in a value that fails the protocol's own validation rules: never in
//! networking or room state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or an
    /// unknown event `type`.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A value passed decoding but violates a protocol rule, such as a
    /// join code with a confusable glyph in it.
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// A stored or transmitted string did not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    /// What was being parsed (e.g. "role").
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
