//! Unified error type for the rtchat client.

use rtchat_protocol::ProtocolError;
use rtchat_session::SessionError;
use rtchat_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `rtchat` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RtchatError {
    /// A transport-level error (HTTP, WebSocket, credential storage).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed response).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth API, lifecycle transition).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The client configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
