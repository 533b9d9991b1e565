//! Error types for the protocol layer.
//!
//! Each crate in rtchat defines its own error enum. A `ProtocolError`
//! always means the bytes arrived fine but their *shape* was wrong: bad
//! JSON, a missing field, or a response that carries no user record.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or wrong
    /// data types.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The response decoded as JSON but does not have the shape we need.
    ///
    /// For example an auth response with neither a `user` object nor a
    /// bare user record.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
