//! Decoding of auth responses and error bodies.
//!
//! The chat backend has shipped several response shapes for signup and
//! login over time:
//!
//! ```text
//! { "token": "...", "user": { "_id": ... } }
//! { "data": { "token": "...", "user": { "_id": ... } } }
//! { "token": "...", "data": { "_id": ... } }
//! { "_id": ..., "fullName": ... }            ← bare user, cookie auth
//! ```
//!
//! [`AuthOutcome::decode`] accepts all of them and produces one strict
//! type, so nothing above the transport boundary ever probes for fields.

use serde::Deserialize;
use serde_json::Value;

use crate::{ProtocolError, User};

/// The decoded result of a successful signup or login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// The authenticated user.
    pub user: User,

    /// A bearer credential to persist, if the server issued one.
    ///
    /// Servers that authenticate with a cookie return no token.
    pub token: Option<String>,
}

impl AuthOutcome {
    /// Decodes a raw response body.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] if the body isn't JSON.
    /// - [`ProtocolError::MalformedResponse`] if no user record can be
    ///   found in any of the tolerated shapes.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_slice(body).map_err(ProtocolError::Decode)?;
        Self::from_value(&value)
    }

    /// Decodes an already-parsed JSON response.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedResponse`] if no user record can
    /// be found.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let nested = value.get("data").filter(|data| data.is_object());

        // An empty string is not a credential.
        let token = value
            .get("token")
            .or_else(|| nested.and_then(|data| data.get("token")))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_owned);

        let user_value = value
            .get("user")
            .or_else(|| nested.and_then(|data| data.get("user")))
            .or(nested)
            .unwrap_or(value);

        if !user_value.is_object() {
            return Err(ProtocolError::MalformedResponse(
                "response carries no user record".into(),
            ));
        }

        let user = User::deserialize(user_value)
            .map_err(|e| ProtocolError::MalformedResponse(e.to_string()))?;
        Ok(Self { user, token })
    }
}

/// Extracts the server-provided `message` from an error response body.
///
/// Returns `None` for empty bodies, non-JSON bodies, bodies without a
/// string `message` field, and empty messages. Never panics, whatever the
/// server sent.
///
/// ```rust
/// use rtchat_protocol::error_message;
///
/// assert_eq!(
///     error_message(br#"{"message":"Invalid credentials"}"#).as_deref(),
///     Some("Invalid credentials"),
/// );
/// assert_eq!(error_message(b""), None);
/// assert_eq!(error_message(b"<html>502</html>"), None);
/// ```
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}

// =========================================================================
// Tests
// =========================================================================
