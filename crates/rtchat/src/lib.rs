//! # rtchat
//!
//! Client library for the rtchat real-time chat backend.
//!
//! rtchat keeps track of who you are and who else is online: it restores a
//! persisted session on start-up, signs users up and in, keeps a live
//! presence connection open while signed in, and publishes all of it as
//! snapshots a UI can subscribe to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtchat::prelude::*;
//!
//! # async fn run() -> Result<(), RtchatError> {
//! rtchat::telemetry::init_tracing();
//!
//! let client = ChatClient::from_env()?;
//! let session = client.session();
//!
//! session.bootstrap_session().await;
//! if !session.snapshot().is_authenticated() {
//!     session
//!         .log_in(&LoginRequest {
//!             email: "ada@example.com".into(),
//!             password: "hunter22".into(),
//!         })
//!         .await;
//! }
//!
//! let mut snapshots = session.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     println!("{} online", snapshots.borrow().online_users.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod telemetry;

pub use client::{ChatClient, ChatClientBuilder, ChatSession};
pub use config::{ClientConfig, ConfigError, DEVELOPMENT_API_URL, Mode, PRODUCTION_API_URL};
pub use error::RtchatError;

pub use rtchat_protocol as protocol;
pub use rtchat_session as session;
pub use rtchat_thread as thread;
pub use rtchat_transport as transport;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::{ChatClient, ChatClientBuilder, ChatSession, ClientConfig, Mode, RtchatError};

    pub use rtchat_protocol::{
        LoginRequest, Message, MessageId, ProfileUpdate, SignupRequest, User, UserId,
    };
    pub use rtchat_session::{
        LiveStatus, Notification, NotificationLevel, OperationFlags, SessionPhase,
        SessionSnapshot, SessionStore,
    };
    pub use rtchat_thread::{MessageRow, Side, ThreadView};
    pub use rtchat_transport::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
}
