//! Error types for the session layer.

use rtchat_protocol::ProtocolError;
use rtchat_transport::TransportError;

/// Errors that can occur while talking to the auth API or changing the
/// session phase.
///
/// Store operations never return these to their caller; they are turned
/// into a [`Notification`](crate::Notification) at the operation boundary.
/// They surface directly only from [`AuthApi`](crate::AuthApi)
/// implementations and [`SessionPhase::transition`](crate::SessionPhase::transition).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request failed or was rejected by the server.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered, but the body had the wrong shape.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lifecycle change that the session state machine forbids, such as
    /// going back to `Checking` after the session has been resolved.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl SessionError {
    /// The human-readable message the server attached to a rejection.
    ///
    /// `None` for network failures, malformed responses, and rejections
    /// whose body had no usable `message`.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Transport(e) => e.server_message(),
            Self::Protocol(_) | Self::InvalidTransition { .. } => None,
        }
    }

    /// Returns `true` if the server rejected our credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_unauthorized())
    }
}
