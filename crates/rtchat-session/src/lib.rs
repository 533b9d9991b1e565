//! Client session management for rtchat.
//!
//! This crate owns everything the UI needs to know about "who am I and who
//! else is online":
//!
//! 1. **Auth API**: talking to the backend's auth endpoints
//!    ([`AuthApi`] trait, [`HttpAuthApi`])
//! 2. **Session state**: the authenticated user, loading flags, and the
//!    lifecycle phase ([`SessionSnapshot`], [`SessionPhase`])
//! 3. **Live presence**: one WebSocket per session that keeps the set of
//!    online users current ([`LiveConnector`], [`WebSocketConnector`])
//!
//! [`SessionStore`] ties the three together and is the only writer of
//! session state. Readers subscribe to snapshots.
//!
//! # How it fits in the stack
//!
//! ```text
//! UI (above)  ← subscribes to snapshots, calls store operations
//!     ↕
//! Session Layer (this crate)  ← session lifecycle, presence, notifications
//!     ↕
//! Transport + Protocol (below)  ← HTTP, WebSocket, credential, wire types
//! ```

mod api;
mod error;
mod live;
mod session;
mod store;

pub use api::{AuthApi, HttpAuthApi, paths};
pub use error::SessionError;
pub use live::{LiveConnector, LiveStatus, WebSocketConnector};
pub use session::{
    Notification, NotificationLevel, OperationFlags, SessionPhase, SessionSnapshot,
};
pub use store::{SessionStore, messages};
