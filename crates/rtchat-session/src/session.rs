//! Session types: the data the store publishes to the UI.
//!
//! A [`SessionSnapshot`] is an immutable copy of everything the store
//! knows at one instant:
//! - WHO is signed in ([`SessionPhase`])
//! - WHAT is in flight ([`OperationFlags`])
//! - WHO else is online (the presence set)
//! - WHETHER the live connection is up ([`LiveStatus`])

use std::collections::BTreeSet;

use rtchat_protocol::{User, UserId};

use crate::{LiveStatus, SessionError};

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///   Unknown ──→ Checking ──→ Authenticated ⇄ Anonymous
///      │                         ↑    ↑
///      └──(signup/login)─────────┘    │
///                         (record replaced on profile update / re-login)
/// ```
///
/// - **Unknown**: nothing has been checked yet (fresh store).
/// - **Checking**: the first bootstrap request is outstanding.
/// - **Authenticated**: the server confirmed who we are.
/// - **Anonymous**: no valid session (never had one, logged out, or the
///   credential was rejected).
///
/// Nothing ever returns to `Unknown`, and only `Unknown` may move to
/// `Checking`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Unknown,
    Checking,
    Authenticated(User),
    Anonymous,
}

impl SessionPhase {
    /// The variant name, for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Checking => "Checking",
            Self::Authenticated(_) => "Authenticated",
            Self::Anonymous => "Anonymous",
        }
    }

    /// Returns `true` if the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: &SessionPhase) -> bool {
        match next {
            Self::Unknown => false,
            Self::Checking => matches!(self, Self::Unknown),
            Self::Authenticated(_) | Self::Anonymous => true,
        }
    }

    /// Moves to `next` if allowed.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] and leaves `self`
    /// untouched if the move is forbidden.
    pub fn transition(&mut self, next: SessionPhase) -> Result<(), SessionError> {
        if !self.can_transition_to(&next) {
            return Err(SessionError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            });
        }
        *self = next;
        Ok(())
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OperationFlags
// ---------------------------------------------------------------------------

/// One flag per operation, true only while its request is outstanding.
///
/// These drive loading indicators. They are not locks: starting a second
/// login while one is in flight is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationFlags {
    pub checking_auth: bool,
    pub signing_up: bool,
    pub logging_in: bool,
    pub updating_profile: bool,
}

impl OperationFlags {
    /// Returns `true` if any operation is in flight.
    pub fn any(&self) -> bool {
        self.checking_auth || self.signing_up || self.logging_in || self.updating_profile
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Everything the store publishes, as of one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub flags: OperationFlags,

    /// Users the server last reported as online. Replaced wholesale on
    /// each presence update.
    pub online_users: BTreeSet<UserId>,

    pub live: LiveStatus,
}

impl SessionSnapshot {
    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&User> {
        self.phase.user()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated(_))
    }

    /// Returns `true` if `user_id` was in the last presence update.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online_users.contains(user_id)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A user-visible message emitted when an operation finishes.
///
/// The store broadcasts these; how they are shown (toast, status line) is
/// up to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
