/// Errors that can occur in the transport layer.
///
/// Covers both halves of the client's networking: REST requests and the
/// live WebSocket connection, plus access to the persisted credential.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening a live connection failed (bad URL, refused, handshake error).
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The HTTP request could not be completed: DNS, refused connection,
    /// timeout, or an unreadable response body.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected our credential (HTTP 401).
    ///
    /// By the time this is returned the persisted credential has already
    /// been cleared.
    #[error("authentication rejected")]
    Unauthorized { message: Option<String> },

    /// The server answered with any other non-success status.
    #[error("request rejected with status {status}")]
    Rejected { status: u16, message: Option<String> },

    /// Reading or writing the persisted credential failed.
    #[error("credential storage failed: {0}")]
    Credential(#[source] std::io::Error),
}

impl TransportError {
    /// The human-readable message the server attached to a rejection, if
    /// it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message } | Self::Rejected { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    /// Returns `true` if the server rejected our credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
