//! Transport layer for rtchat.
//!
//! Everything that touches the network or the disk lives here:
//!
//! - [`HttpClient`]: REST client that attaches the bearer credential and
//!   clears it when the server rejects it.
//! - [`CredentialStore`]: where the credential is persisted
//!   ([`FileCredentialStore`], [`MemoryCredentialStore`]).
//! - [`Connection`]: a live bidirectional channel, implemented by
//!   [`WebSocketConnection`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): live connections via `tokio-tungstenite`

mod credential;
mod error;
mod http;
#[cfg(feature = "websocket")]
mod websocket;

pub use credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::TransportError;
pub use http::{HttpClient, HttpConfig};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single live connection that can send and receive frames.
///
/// The returned futures are `Send` so a connection can be driven from a
/// spawned Tokio task.
pub trait Connection: Send + Sync + 'static {
    /// Sends a frame to the server.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
