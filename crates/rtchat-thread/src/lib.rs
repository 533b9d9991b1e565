//! Presentation model for one conversation thread.
//!
//! Turns the raw message list into rows a UI can draw directly: which side
//! each bubble sits on, whose avatar goes next to it, and how its timestamp
//! reads. Nothing here does I/O; the same inputs always give the same view.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use rtchat_protocol::User;
//! use rtchat_thread::ThreadView;
//!
//! let me = User::new("me");
//! let view = ThreadView::build(&me, None, &[], false, &Utc);
//! assert_eq!(view, ThreadView::Closed);
//! ```

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use rtchat_protocol::{Message, MessageId, User};

/// Shown when the sender has no profile picture.
pub const DEFAULT_AVATAR: &str = "/avatar.png";

/// Which side of the thread a message is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Sent by the signed-in user.
    Outgoing,
    /// Sent by the peer.
    Incoming,
}

/// A message's send time, pre-formatted in the viewer's time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampLabel {
    /// 24-hour clock, `HH:MM`.
    pub time: String,
    /// `M/D/YYYY`.
    pub date: String,
    /// Full English weekday name.
    pub weekday: String,
}

impl TimestampLabel {
    pub fn new<Tz>(at: DateTime<Utc>, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let local = at.with_timezone(tz);
        Self {
            time: local.format("%H:%M").to_string(),
            date: local.format("%-m/%-d/%Y").to_string(),
            weekday: local.format("%A").to_string(),
        }
    }
}

impl std::fmt::Display for TimestampLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} • {} • {}", self.time, self.date, self.weekday)
    }
}

/// One drawable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: MessageId,
    pub side: Side,
    pub avatar: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub timestamp: TimestampLabel,

    /// Set on the final row only; the view scrolls here when messages
    /// arrive.
    pub is_last: bool,
}

/// What the thread pane should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadView {
    /// No conversation selected.
    Closed,
    /// Messages for the selected peer are still loading.
    Loading,
    Ready(Vec<MessageRow>),
}

impl ThreadView {
    /// Builds the view of the conversation between `me` and `peer`.
    ///
    /// `loading` is checked after `peer`: with nobody selected the pane is
    /// closed whatever the loading state.
    pub fn build<Tz>(
        me: &User,
        peer: Option<&User>,
        messages: &[Message],
        loading: bool,
        tz: &Tz,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let Some(peer) = peer else {
            return Self::Closed;
        };
        if loading {
            return Self::Loading;
        }

        let last = messages.len().saturating_sub(1);
        let rows: Vec<MessageRow> = messages
            .iter()
            .enumerate()
            .map(|(idx, message)| row(me, peer, message, idx == last, tz))
            .collect();

        tracing::trace!(peer = %peer.id, rows = rows.len(), "thread view built");
        Self::Ready(rows)
    }

    /// The message the view should keep scrolled into sight.
    pub fn scroll_anchor(&self) -> Option<&MessageId> {
        match self {
            Self::Ready(rows) => rows.last().map(|r| &r.id),
            Self::Closed | Self::Loading => None,
        }
    }

    pub fn rows(&self) -> &[MessageRow] {
        match self {
            Self::Ready(rows) => rows,
            Self::Closed | Self::Loading => &[],
        }
    }
}

fn row<Tz>(me: &User, peer: &User, message: &Message, is_last: bool, tz: &Tz) -> MessageRow
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let (side, sender) = if message.sender_id == me.id {
        (Side::Outgoing, me)
    } else {
        (Side::Incoming, peer)
    };

    MessageRow {
        id: message.id.clone(),
        side,
        avatar: sender.avatar().unwrap_or(DEFAULT_AVATAR).to_owned(),
        text: non_empty(message.text.as_deref()),
        image: non_empty(message.image.as_deref()),
        timestamp: TimestampLabel::new(message.created_at, tz),
        is_last,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_owned)
}
