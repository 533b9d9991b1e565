//! Live presence connection: how it is opened and what state it is in.

use std::future::Future;

use reqwest::Url;
use rtchat_protocol::UserId;
use rtchat_transport::{Connection, ConnectionId, TransportError, WebSocketConnection};
use tokio::sync::oneshot;

/// Opens live connections for a user.
///
/// Production uses [`WebSocketConnector`]; tests substitute an in-memory
/// connector.
pub trait LiveConnector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection tagged with `user_id`.
    fn connect(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// LiveStatus / LiveState
// ---------------------------------------------------------------------------

/// Public view of the live connection, published in every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LiveStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected(ConnectionId),
}

/// The store's own record of the live connection.
///
/// `attempt` numbers each open, so a reader task or a slow connect that
/// belongs to an earlier attempt can recognise it has been superseded.
/// Dropping `close` (by replacing `Connected`) also stops the reader.
#[derive(Debug, Default)]
pub(crate) enum LiveState {
    #[default]
    Disconnected,
    Connecting {
        attempt: u64,
        user_id: UserId,
    },
    Connected {
        attempt: u64,
        user_id: UserId,
        id: ConnectionId,
        close: oneshot::Sender<()>,
    },
}

impl LiveState {
    pub(crate) fn status(&self) -> LiveStatus {
        match self {
            Self::Disconnected => LiveStatus::Disconnected,
            Self::Connecting { .. } => LiveStatus::Connecting,
            Self::Connected { id, .. } => LiveStatus::Connected(*id),
        }
    }

    pub(crate) fn attempt(&self) -> Option<u64> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { attempt, .. } | Self::Connected { attempt, .. } => Some(*attempt),
        }
    }

    /// The user this connection was opened for.
    pub(crate) fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { user_id, .. } | Self::Connected { user_id, .. } => Some(user_id),
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocketConnector
// ---------------------------------------------------------------------------

/// Opens presence WebSockets at `<live url>?userId=<id>`.
///
/// The live URL may be given with an `http(s)` scheme (the same origin as
/// the REST API); it is switched to `ws(s)` when connecting.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    live_url: String,
}

impl WebSocketConnector {
    pub fn new(live_url: impl Into<String>) -> Self {
        Self {
            live_url: live_url.into(),
        }
    }

    /// Builds the connection URL for `user_id`.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectFailed`] if the live URL can't be
    /// parsed or uses a scheme we can't map to a WebSocket.
    pub fn url_for(&self, user_id: &UserId) -> Result<String, TransportError> {
        let mut url = Url::parse(&self.live_url).map_err(|e| {
            TransportError::ConnectFailed(format!("invalid live url {}: {e}", self.live_url))
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::ConnectFailed(format!(
                    "unsupported live url scheme {other}"
                )));
            }
        };
        url.set_scheme(scheme).map_err(|()| {
            TransportError::ConnectFailed(format!("cannot use scheme {scheme}"))
        })?;

        url.query_pairs_mut().append_pair("userId", user_id.as_str());
        Ok(url.into())
    }
}

impl LiveConnector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self, user_id: &UserId) -> Result<WebSocketConnection, TransportError> {
        let url = self.url_for(user_id)?;
        tracing::debug!(%user_id, %url, "opening live connection");
        WebSocketConnection::connect(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(base: &str, id: &str) -> Result<String, TransportError> {
        WebSocketConnector::new(base).url_for(&UserId::from(id))
    }

    #[test]
    fn test_url_for_http_becomes_ws_with_user_query() {
        assert_eq!(
            url("http://localhost:5001", "65f0c1").unwrap(),
            "ws://localhost:5001/?userId=65f0c1"
        );
    }

    #[test]
    fn test_url_for_https_becomes_wss() {
        assert!(url("https://chat.example.com", "1").unwrap().starts_with("wss://chat.example.com"));
    }

    #[test]
    fn test_url_for_keeps_ws_scheme_and_path() {
        assert_eq!(
            url("ws://127.0.0.1:9000/live", "1").unwrap(),
            "ws://127.0.0.1:9000/live?userId=1"
        );
    }

    #[test]
    fn test_url_for_escapes_user_id() {
        assert!(url("ws://host", "a b&c").unwrap().ends_with("userId=a+b%26c"));
    }

    #[test]
    fn test_url_for_rejects_garbage() {
        assert!(matches!(url("not a url", "1"), Err(TransportError::ConnectFailed(_))));
    }

    #[test]
    fn test_url_for_rejects_unknown_scheme() {
        assert!(matches!(url("ftp://host", "1"), Err(TransportError::ConnectFailed(_))));
    }

    #[test]
    fn test_live_state_status_mirrors_variant() {
        assert_eq!(LiveState::Disconnected.status(), LiveStatus::Disconnected);
        let connecting = LiveState::Connecting {
            attempt: 3,
            user_id: UserId::from("u"),
        };
        assert_eq!(connecting.status(), LiveStatus::Connecting);
        assert_eq!(connecting.attempt(), Some(3));
        assert_eq!(connecting.user_id(), Some(&UserId::from("u")));
    }
}
