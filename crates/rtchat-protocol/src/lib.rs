//! Wire protocol for rtchat.
//!
//! This crate defines the shapes that travel between the chat client and
//! the chat backend:
//!
//! - **Types** ([`User`], [`Message`], request bodies): the records the
//!   REST API sends and receives.
//! - **Response decoding** ([`AuthOutcome`], [`error_message`]): the one
//!   place where loosely-shaped server responses become strict Rust types.
//! - **Live events** ([`LiveFrame`], [`ServerEvent`]): what the presence
//!   WebSocket pushes.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how live frames are
//!   converted to/from bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (HTTP bodies, WebSocket
//! frames) and the session store. It never performs I/O.
//!
//! ```text
//! Transport (bytes) → Protocol (User, AuthOutcome, ServerEvent) → Session
//! ```

mod auth;
mod codec;
mod error;
mod live;
mod types;

pub use auth::{AuthOutcome, error_message};
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use live::{LiveFrame, ServerEvent, ONLINE_USERS_EVENT};
pub use types::{
    LoginRequest, Message, MessageId, ProfileUpdate, SignupRequest, User,
    UserId,
};
