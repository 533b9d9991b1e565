//! Frames pushed by the server over the live presence connection.
//!
//! Every frame is a named event with an arbitrary payload:
//!
//! ```text
//! { "event": "getOnlineUsers", "data": ["65f0c1", "65f0c2"] }
//! ```
//!
//! Only the presence event is part of the client's contract. Anything else
//! decodes to [`ServerEvent::Unknown`] so a newer server can't break an
//! older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::UserId;

/// Event name of the presence update.
pub const ONLINE_USERS_EVENT: &str = "getOnlineUsers";

/// A raw live frame: event name plus untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveFrame {
    pub event: String,

    #[serde(default)]
    pub data: Value,
}

impl LiveFrame {
    /// Builds a presence frame carrying the full list of online users.
    pub fn online_users(ids: &[UserId]) -> Self {
        Self {
            event: ONLINE_USERS_EVENT.to_owned(),
            data: Value::Array(
                ids.iter().map(|id| Value::String(id.0.clone())).collect(),
            ),
        }
    }

    /// Interprets the frame.
    ///
    /// A presence frame whose payload isn't a list of strings is treated
    /// as unknown rather than as an empty presence set.
    pub fn into_event(self) -> ServerEvent {
        match self.event.as_str() {
            ONLINE_USERS_EVENT => match serde_json::from_value(self.data) {
                Ok(ids) => ServerEvent::OnlineUsers(ids),
                Err(_) => ServerEvent::Unknown(self.event),
            },
            _ => ServerEvent::Unknown(self.event),
        }
    }
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The complete current list of online users. Replaces, never merges.
    OnlineUsers(Vec<UserId>),

    /// An event outside the client's contract, carrying its name.
    Unknown(String),
}
