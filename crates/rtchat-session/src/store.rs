//! The session store: the single writer of client session state.
//!
//! It's responsible for:
//! - Restoring a session from a persisted credential (bootstrap)
//! - Signing up, logging in, logging out, and profile updates
//! - Persisting and clearing the credential
//! - Opening and closing the live presence connection
//! - Publishing snapshots and notifications to the UI
//!
//! # Concurrency note
//!
//! Operations take `&self` and are not serialized: two logins started
//! back to back both run, and whichever response lands last wins. State is
//! published through a `watch` channel; the live connection record sits
//! behind a `std` mutex that is never held across an `.await`. When both
//! are needed the live mutex is taken first.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rtchat_protocol::{
    AuthOutcome, Codec, JsonCodec, LiveFrame, LoginRequest, ProfileUpdate, ServerEvent,
    SignupRequest, User, UserId,
};
use rtchat_transport::{Connection, CredentialStore};
use tokio::sync::{broadcast, oneshot, watch};

use crate::live::LiveState;
use crate::{
    AuthApi, LiveConnector, LiveStatus, Notification, OperationFlags, SessionError, SessionPhase,
    SessionSnapshot,
};

/// Texts of the notifications the store emits.
pub mod messages {
    pub const SIGNUP_SUCCEEDED: &str = "Account created successfully";
    pub const SIGNUP_FAILED: &str = "Signup failed. Please try again.";
    pub const LOGIN_SUCCEEDED: &str = "Logged in successfully";
    pub const LOGIN_FAILED: &str = "Login failed. Please try again.";
    pub const LOGOUT_SUCCEEDED: &str = "Logged out successfully";
    pub const PROFILE_UPDATED: &str = "Profile updated successfully";
    pub const PROFILE_UPDATE_FAILED: &str = "Profile update failed. Please try again.";
}

/// How many notifications a slow subscriber may fall behind before it
/// starts missing them.
const NOTIFICATION_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// AuthOperation
// ---------------------------------------------------------------------------

/// Signup and login share one flow; this captures what differs.
#[derive(Debug, Clone, Copy)]
enum AuthOperation {
    SignUp,
    LogIn,
}

impl AuthOperation {
    fn name(self) -> &'static str {
        match self {
            Self::SignUp => "signup",
            Self::LogIn => "login",
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            Self::SignUp => messages::SIGNUP_SUCCEEDED,
            Self::LogIn => messages::LOGIN_SUCCEEDED,
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            Self::SignUp => messages::SIGNUP_FAILED,
            Self::LogIn => messages::LOGIN_FAILED,
        }
    }

    fn set_flag(self, flags: &mut OperationFlags, in_flight: bool) {
        match self {
            Self::SignUp => flags.signing_up = in_flight,
            Self::LogIn => flags.logging_in = in_flight,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// State shared between the store and its live reader task.
struct Shared {
    state: watch::Sender<SessionSnapshot>,
    live: Mutex<LiveState>,
    next_attempt: AtomicU64,
}

impl Shared {
    fn lock_live(&self) -> MutexGuard<'_, LiveState> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the live record and publishes the matching status.
    ///
    /// Presence is only meaningful while connected, so going
    /// `Disconnected` also empties the presence set.
    fn set_live(&self, live: &mut LiveState, next: LiveState) -> LiveState {
        let previous = std::mem::replace(live, next);
        let status = live.status();
        self.state.send_modify(|snapshot| {
            snapshot.live = status;
            if status == LiveStatus::Disconnected {
                snapshot.online_users.clear();
            }
        });
        previous
    }

    /// Applies one frame received on the connection opened by `attempt`.
    fn apply_frame(&self, attempt: u64, codec: &JsonCodec, data: &[u8]) {
        let frame: LiveFrame = match codec.decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable live frame");
                return;
            }
        };

        match frame.into_event() {
            ServerEvent::OnlineUsers(ids) => {
                let live = self.lock_live();
                if live.attempt() != Some(attempt) {
                    return;
                }
                let online: BTreeSet<UserId> = ids.into_iter().collect();
                tracing::debug!(count = online.len(), "presence updated");
                self.state.send_modify(|snapshot| snapshot.online_users = online);
            }
            ServerEvent::Unknown(event) => {
                tracing::trace!(%event, "ignoring live event");
            }
        }
    }

    /// The connection opened by `attempt` ended without being asked to.
    fn connection_lost(&self, attempt: u64) {
        let mut live = self.lock_live();
        if live.attempt() == Some(attempt) {
            self.set_live(&mut live, LiveState::Disconnected);
            tracing::info!("live connection lost");
        }
    }
}

/// Reads presence frames until the server closes the connection or the
/// store signals `close`.
async fn read_presence<C: Connection>(
    shared: Arc<Shared>,
    attempt: u64,
    conn: C,
    mut close: oneshot::Receiver<()>,
) {
    let codec = JsonCodec;
    let id = conn.id();

    loop {
        tokio::select! {
            _ = &mut close => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(%id, error = %e, "error while closing live connection");
                }
                // The store already recorded the disconnect.
                return;
            }
            frame = conn.recv() => match frame {
                Ok(Some(data)) => shared.apply_frame(attempt, &codec, &data),
                Ok(None) => {
                    tracing::info!(%id, "live connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "live connection failed");
                    break;
                }
            }
        }
    }

    shared.connection_lost(attempt);
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Owns the client's authentication state and presence connection.
///
/// Share it with `Arc`; read it with [`subscribe`](Self::subscribe) or
/// [`snapshot`](Self::snapshot). Operations never return errors: every
/// failure becomes an error [`Notification`] and leaves the store usable.
///
/// ## Lifecycle
///
/// ```text
/// bootstrap_session() ──ok──→ [Authenticated] ──→ open_live_connection()
///        │                      ↑        │
///        └──err──→ [Anonymous] ─┘        └── log_out() ──→ [Anonymous]
///                        sign_up() / log_in()              + live closed
/// ```
pub struct SessionStore<A: AuthApi, L: LiveConnector> {
    api: A,
    connector: L,
    credentials: Arc<dyn CredentialStore>,
    shared: Arc<Shared>,
    notifications: broadcast::Sender<Notification>,
}

impl<A: AuthApi, L: LiveConnector> SessionStore<A, L> {
    /// Creates a store in the `Unknown` phase with no live connection.
    ///
    /// `credentials` should be the same store the API's HTTP client reads
    /// from, so that a credential saved on login is sent on the next
    /// request.
    pub fn new(api: A, connector: L, credentials: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            api,
            connector,
            credentials,
            shared: Arc::new(Shared {
                state,
                live: Mutex::new(LiveState::Disconnected),
                next_attempt: AtomicU64::new(1),
            }),
            notifications,
        }
    }

    // -- Readers ------------------------------------------------------------

    /// Subscribes to snapshots. The receiver sees the current snapshot
    /// immediately and every change after it.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.state.subscribe()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.borrow().clone()
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<User> {
        self.shared.state.borrow().user().cloned()
    }

    /// Subscribes to notifications emitted from now on.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn connector(&self) -> &L {
        &self.connector
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    // -- Session operations -------------------------------------------------

    /// Restores the session from the persisted credential, if the server
    /// still accepts it.
    ///
    /// On success the session becomes `Authenticated` and a live
    /// connection is opened. On any failure (including having no
    /// credential at all) the session becomes `Anonymous`.
    pub async fn bootstrap_session(&self) {
        self.update(|snapshot| {
            snapshot.flags.checking_auth = true;
            if snapshot.phase.can_transition_to(&SessionPhase::Checking) {
                snapshot.phase = SessionPhase::Checking;
            }
        });

        let restored = match self.api.check().await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "session restored");
                self.begin_session(user);
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "no valid session to restore");
                self.end_session();
                false
            }
        };

        self.update(|snapshot| snapshot.flags.checking_auth = false);

        if restored {
            self.open_live_connection().await;
        }
    }

    /// Creates an account and signs in as it.
    pub async fn sign_up(&self, registration: &SignupRequest) {
        self.authenticate(AuthOperation::SignUp, self.api.sign_up(registration))
            .await;
    }

    /// Signs in with email and password.
    pub async fn log_in(&self, credentials: &LoginRequest) {
        self.authenticate(AuthOperation::LogIn, self.api.log_in(credentials))
            .await;
    }

    /// Ends the session.
    ///
    /// The server is told first, but its answer doesn't matter: the
    /// credential, the session, and the live connection are cleared even
    /// when the request fails.
    pub async fn log_out(&self) {
        if let Err(e) = self.api.log_out().await {
            tracing::warn!(error = %e, "logout request failed, clearing local session anyway");
        }

        if let Err(e) = self.credentials.clear() {
            tracing::warn!(error = %e, "could not clear credential");
        }
        self.end_session();

        tracing::info!("logged out");
        self.notify(Notification::success(messages::LOGOUT_SUCCEEDED));
    }

    /// Applies a partial profile update.
    ///
    /// On success the session record is replaced with the server's copy.
    /// A response that arrives after the session ended, or after another
    /// user signed in, is discarded. If
    /// the server rejects our credential the session ends.
    pub async fn update_profile(&self, update: &ProfileUpdate) {
        self.update(|snapshot| snapshot.flags.updating_profile = true);

        match self.api.update_profile(update).await {
            Ok(user) => {
                let user_id = user.id.clone();
                let mut replaced = false;
                self.update(|snapshot| {
                    if snapshot.user().is_some_and(|current| current.id == user.id) {
                        snapshot.phase = SessionPhase::Authenticated(user);
                        replaced = true;
                    }
                });

                if replaced {
                    tracing::info!(%user_id, "profile updated");
                    self.notify(Notification::success(messages::PROFILE_UPDATED));
                } else {
                    tracing::warn!(%user_id, "profile update no longer matches the session, discarded");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile update failed");
                if e.is_unauthorized() {
                    self.end_session();
                }
                self.notify(Notification::error(
                    e.server_message().unwrap_or(messages::PROFILE_UPDATE_FAILED),
                ));
            }
        }

        self.update(|snapshot| snapshot.flags.updating_profile = false);
    }

    // -- Live connection ----------------------------------------------------

    /// Opens the presence connection for the current user.
    ///
    /// Does nothing without a session, or when a connection is already
    /// open or being opened. A connect failure is logged and leaves the
    /// store `Disconnected`; there is no automatic retry.
    pub async fn open_live_connection(&self) {
        let Some(user_id) = self.current_user_id() else {
            tracing::debug!("no session, live connection not opened");
            return;
        };
        let Some(attempt) = self.begin_connect(&user_id) else {
            tracing::debug!(%user_id, "live connection already open");
            return;
        };

        match self.connector.connect(&user_id).await {
            Ok(conn) => {
                if let Some(stale) = self.finish_connect(attempt, user_id, conn) {
                    tracing::debug!("live connection superseded while connecting, closing");
                    if let Err(e) = stale.close().await {
                        tracing::debug!(error = %e, "error while closing superseded connection");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "could not open live connection");
                self.abandon_connect(attempt);
            }
        }
    }

    /// Closes the presence connection, if any, and forgets it.
    ///
    /// The presence set is cleared along with it. A connect still in
    /// progress is abandoned and its connection closed as soon as it
    /// completes.
    pub fn close_live_connection(&self) {
        let previous = {
            let mut live = self.shared.lock_live();
            if matches!(*live, LiveState::Disconnected) {
                return;
            }
            self.shared.set_live(&mut live, LiveState::Disconnected)
        };

        match previous {
            LiveState::Connected { id, close, .. } => {
                // The reader may already be gone if the server hung up.
                let _ = close.send(());
                tracing::info!(%id, "live connection closed");
            }
            LiveState::Connecting { attempt, .. } => {
                tracing::debug!(attempt, "pending live connection abandoned");
            }
            LiveState::Disconnected => {}
        }
    }

    // -- Internals ----------------------------------------------------------

    fn update(&self, modify: impl FnOnce(&mut SessionSnapshot)) {
        self.shared.state.send_modify(modify);
    }

    fn set_phase(&self, next: SessionPhase) {
        self.update(|snapshot| {
            if let Err(e) = snapshot.phase.transition(next) {
                tracing::warn!(error = %e, "session transition ignored");
            }
        });
    }

    fn notify(&self, notification: Notification) {
        tracing::debug!(level = ?notification.level, text = %notification.message, "notification");
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.shared.state.borrow().user().map(|user| user.id.clone())
    }

    /// Enters `Authenticated` as `user`, dropping a live connection that
    /// belongs to someone else.
    fn begin_session(&self, user: User) {
        let other_user = {
            let live = self.shared.lock_live();
            live.user_id().is_some_and(|id| *id != user.id)
        };
        if other_user {
            tracing::info!(user_id = %user.id, "session user changed, closing previous live connection");
            self.close_live_connection();
        }
        self.set_phase(SessionPhase::Authenticated(user));
    }

    /// Enters `Anonymous` and tears down the live connection.
    fn end_session(&self) {
        self.set_phase(SessionPhase::Anonymous);
        self.close_live_connection();
    }

    async fn authenticate(
        &self,
        operation: AuthOperation,
        request: impl Future<Output = Result<AuthOutcome, SessionError>>,
    ) {
        self.update(|snapshot| operation.set_flag(&mut snapshot.flags, true));

        let authenticated = match request.await {
            Ok(AuthOutcome { user, token }) => {
                if let Some(token) = token {
                    if let Err(e) = self.credentials.save(&token) {
                        tracing::warn!(error = %e, "could not persist credential");
                    }
                }
                tracing::info!(user_id = %user.id, operation = operation.name(), "authenticated");
                self.begin_session(user);
                self.notify(Notification::success(operation.success_message()));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = operation.name(), "authentication failed");
                self.notify(Notification::error(
                    e.server_message().unwrap_or(operation.fallback_message()),
                ));
                false
            }
        };

        self.update(|snapshot| operation.set_flag(&mut snapshot.flags, false));

        if authenticated {
            self.open_live_connection().await;
        }
    }

    /// Claims the live slot for a new connection attempt.
    fn begin_connect(&self, user_id: &UserId) -> Option<u64> {
        let mut live = self.shared.lock_live();
        if !matches!(*live, LiveState::Disconnected) {
            return None;
        }
        let attempt = self.shared.next_attempt.fetch_add(1, Ordering::Relaxed);
        self.shared.set_live(
            &mut live,
            LiveState::Connecting {
                attempt,
                user_id: user_id.clone(),
            },
        );
        Some(attempt)
    }

    /// Installs `conn` if `attempt` is still the pending one; otherwise
    /// hands it back so the caller can close it.
    fn finish_connect<C: Connection>(&self, attempt: u64, user_id: UserId, conn: C) -> Option<C> {
        let mut live = self.shared.lock_live();
        let pending = matches!(*live, LiveState::Connecting { attempt: a, .. } if a == attempt);
        if !pending || self.current_user_id().as_ref() != Some(&user_id) {
            return Some(conn);
        }

        let (close, close_rx) = oneshot::channel();
        let id = conn.id();
        self.shared.set_live(
            &mut live,
            LiveState::Connected {
                attempt,
                user_id: user_id.clone(),
                id,
                close,
            },
        );
        drop(live);

        tracing::info!(%user_id, %id, "live connection open");
        tokio::spawn(read_presence(Arc::clone(&self.shared), attempt, conn, close_rx));
        None
    }

    fn abandon_connect(&self, attempt: u64) {
        let mut live = self.shared.lock_live();
        if matches!(*live, LiveState::Connecting { attempt: a, .. } if a == attempt) {
            self.shared.set_live(&mut live, LiveState::Disconnected);
        }
    }
}

impl<A: AuthApi, L: LiveConnector> Drop for SessionStore<A, L> {
    /// Stops the reader task; it would otherwise keep the connection open
    /// after the store is gone.
    fn drop(&mut self) {
        self.close_live_connection();
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionStore`.
    //!
    //! The store runs against two in-memory fakes:
    //!   - `FakeApi` answers each route with a scripted `Reply` and, like
    //!     the real transport, clears the credential on 401.
    //!   - `FakeConnector` hands out connections whose "server side" the
    //!     test keeps, so it can push presence frames or hang up.

    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use rtchat_transport::{ConnectionId, MemoryCredentialStore, TransportError};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{NotificationLevel, paths};

    // -- Fakes --------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Reply {
        Ok(Value),
        Rejected {
            status: u16,
            message: Option<&'static str>,
        },
        Unauthorized,
        Offline,
    }

    struct FakeApi {
        credentials: Arc<MemoryCredentialStore>,
        replies: Mutex<HashMap<&'static str, Reply>>,
        calls: Mutex<Vec<&'static str>>,
        /// Held by a test to keep requests in flight.
        gate: tokio::sync::Mutex<()>,
    }

    impl FakeApi {
        fn new(credentials: Arc<MemoryCredentialStore>) -> Self {
            Self {
                credentials,
                replies: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                gate: tokio::sync::Mutex::new(()),
            }
        }

        fn reply(&self, path: &'static str, reply: Reply) {
            self.replies.lock().unwrap().insert(path, reply);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        async fn respond(&self, path: &'static str) -> Result<Value, SessionError> {
            let _open = self.gate.lock().await;
            self.calls.lock().unwrap().push(path);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .unwrap_or(Reply::Offline);

            match reply {
                Reply::Ok(value) => Ok(value),
                Reply::Rejected { status, message } => Err(TransportError::Rejected {
                    status,
                    message: message.map(str::to_owned),
                }
                .into()),
                Reply::Unauthorized => {
                    self.credentials.clear().unwrap();
                    Err(TransportError::Unauthorized { message: None }.into())
                }
                Reply::Offline => Err(TransportError::ConnectFailed("offline".into()).into()),
            }
        }

        async fn respond_user(&self, path: &'static str) -> Result<User, SessionError> {
            let value = self.respond(path).await?;
            Ok(AuthOutcome::from_value(&value)?.user)
        }
    }

    impl AuthApi for FakeApi {
        async fn check(&self) -> Result<User, SessionError> {
            // The real server can't identify us without a credential.
            if self.credentials.load().unwrap().is_none() {
                self.calls.lock().unwrap().push(paths::CHECK);
                return Err(TransportError::Unauthorized { message: None }.into());
            }
            self.respond_user(paths::CHECK).await
        }

        async fn sign_up(&self, _: &SignupRequest) -> Result<AuthOutcome, SessionError> {
            let value = self.respond(paths::SIGNUP).await?;
            Ok(AuthOutcome::from_value(&value)?)
        }

        async fn log_in(&self, _: &LoginRequest) -> Result<AuthOutcome, SessionError> {
            let value = self.respond(paths::LOGIN).await?;
            Ok(AuthOutcome::from_value(&value)?)
        }

        async fn log_out(&self) -> Result<(), SessionError> {
            self.respond(paths::LOGOUT).await.map(|_| ())
        }

        async fn update_profile(&self, _: &ProfileUpdate) -> Result<User, SessionError> {
            self.respond_user(paths::UPDATE_PROFILE).await
        }
    }

    /// The test's end of a fake connection.
    struct ServerSide {
        user_id: UserId,
        frames: mpsc::UnboundedSender<Vec<u8>>,
        closed: Arc<AtomicBool>,
    }

    struct FakeConnection {
        id: ConnectionId,
        frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        closed: Arc<AtomicBool>,
    }

    impl Connection for FakeConnection {
        async fn send(&self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.frames.lock().await.recv().await)
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        opened: Mutex<Vec<ServerSide>>,
        refuse: AtomicBool,
    }

    impl FakeConnector {
        fn count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn is_closed(&self, index: usize) -> bool {
            self.opened.lock().unwrap()[index].closed.load(Ordering::SeqCst)
        }

        fn user_of(&self, index: usize) -> UserId {
            self.opened.lock().unwrap()[index].user_id.clone()
        }

        fn push(&self, index: usize, frame: Value) {
            let bytes = serde_json::to_vec(&frame).unwrap();
            self.opened.lock().unwrap()[index].frames.send(bytes).unwrap();
        }

        /// Simulates the server dropping the connection.
        fn hang_up(&self, index: usize) {
            let (dead, _) = mpsc::unbounded_channel();
            self.opened.lock().unwrap()[index].frames = dead;
        }
    }

    impl LiveConnector for FakeConnector {
        type Connection = FakeConnection;

        async fn connect(&self, user_id: &UserId) -> Result<FakeConnection, TransportError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectFailed("refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let mut opened = self.opened.lock().unwrap();
            opened.push(ServerSide {
                user_id: user_id.clone(),
                frames: tx,
                closed: Arc::clone(&closed),
            });
            Ok(FakeConnection {
                id: ConnectionId::new(opened.len() as u64),
                frames: tokio::sync::Mutex::new(rx),
                closed,
            })
        }
    }

    // -- Helpers ------------------------------------------------------------

    type Store = SessionStore<FakeApi, FakeConnector>;

    fn store_with(credentials: Arc<MemoryCredentialStore>) -> Store {
        SessionStore::new(
            FakeApi::new(Arc::clone(&credentials)),
            FakeConnector::default(),
            credentials,
        )
    }

    fn store() -> Store {
        store_with(Arc::new(MemoryCredentialStore::new()))
    }

    fn login_request() -> LoginRequest {
        LoginRequest {
            email: "ada@example.com".into(),
            password: "hunter22".into(),
        }
    }

    fn signup_request() -> SignupRequest {
        SignupRequest {
            full_name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "hunter22".into(),
        }
    }

    fn presence(ids: &[&str]) -> Value {
        json!({ "event": "getOnlineUsers", "data": ids })
    }

    fn online(store: &Store) -> Vec<String> {
        store.snapshot().online_users.into_iter().map(|id| id.0).collect()
    }

    /// Logs in as user `id` with token `tok`.
    async fn logged_in(store: &Store, id: &str, tok: &str) {
        store.api().reply(
            paths::LOGIN,
            Reply::Ok(json!({ "token": tok, "user": { "_id": id } })),
        );
        store.log_in(&login_request()).await;
    }

    async fn wait_until(store: &Store, predicate: impl Fn(&SessionSnapshot) -> bool) {
        let mut rx = store.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("store dropped");
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    // =====================================================================
    // log_in() / log_out()
    // =====================================================================

    #[tokio::test]
    async fn test_log_in_persists_token_and_sets_session() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::clone(&creds));

        logged_in(&store, "1", "abc").await;

        assert_eq!(creds.load().unwrap().as_deref(), Some("abc"));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.user().map(|u| u.id.as_str()), Some("1"));
        assert!(!snapshot.flags.logging_in);
    }

    #[tokio::test]
    async fn test_log_in_opens_one_live_connection_for_user() {
        let store = store();
        logged_in(&store, "1", "abc").await;

        assert_eq!(store.connector().count(), 1);
        assert_eq!(store.connector().user_of(0), UserId::from("1"));
        assert!(matches!(store.snapshot().live, LiveStatus::Connected(_)));
    }

    #[tokio::test]
    async fn test_log_in_emits_success_notification() {
        let store = store();
        let mut rx = store.notifications();

        logged_in(&store, "1", "abc").await;

        assert_eq!(drain(&mut rx), vec![Notification::success(messages::LOGIN_SUCCEEDED)]);
    }

    #[tokio::test]
    async fn test_log_in_without_token_keeps_existing_credential() {
        let creds = Arc::new(MemoryCredentialStore::with_token("cookie-era"));
        let store = store_with(Arc::clone(&creds));
        store.api().reply(paths::LOGIN, Reply::Ok(json!({ "_id": "1" })));

        store.log_in(&login_request()).await;

        assert!(store.snapshot().is_authenticated());
        assert_eq!(creds.load().unwrap().as_deref(), Some("cookie-era"));
    }

    #[tokio::test]
    async fn test_log_in_rejected_shows_server_message_and_stays_anonymous() {
        let store = store();
        let mut rx = store.notifications();
        store.api().reply(
            paths::LOGIN,
            Reply::Rejected {
                status: 400,
                message: Some("Invalid credentials"),
            },
        );

        store.log_in(&login_request()).await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.user(), None);
        assert!(!snapshot.flags.logging_in);
        assert_eq!(store.connector().count(), 0);
        assert_eq!(drain(&mut rx), vec![Notification::error("Invalid credentials")]);
    }

    #[tokio::test]
    async fn test_log_in_malformed_response_uses_fallback() {
        let store = store();
        let mut rx = store.notifications();
        store.api().reply(paths::LOGIN, Reply::Ok(json!({ "token": "abc" })));

        store.log_in(&login_request()).await;

        assert!(!store.snapshot().is_authenticated());
        assert_eq!(drain(&mut rx), vec![Notification::error(messages::LOGIN_FAILED)]);
    }

    #[tokio::test]
    async fn test_log_in_then_log_out_returns_to_anonymous() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::clone(&creds));
        logged_in(&store, "1", "abc").await;
        assert!(store.snapshot().is_authenticated());

        store.api().reply(paths::LOGOUT, Reply::Ok(json!({ "message": "ok" })));
        store.log_out().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert_eq!(snapshot.live, LiveStatus::Disconnected);
        assert_eq!(creds.load().unwrap(), None);
        eventually(|| store.connector().is_closed(0)).await;
    }

    #[tokio::test]
    async fn test_log_out_clears_local_state_when_server_unreachable() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::clone(&creds));
        logged_in(&store, "1", "abc").await;
        let mut rx = store.notifications();

        // No reply scripted for LOGOUT → the fake is offline.
        store.log_out().await;

        assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
        assert_eq!(creds.load().unwrap(), None);
        assert_eq!(store.snapshot().live, LiveStatus::Disconnected);
        assert_eq!(drain(&mut rx), vec![Notification::success(messages::LOGOUT_SUCCEEDED)]);
    }

    #[tokio::test]
    async fn test_log_in_as_other_user_replaces_live_connection() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        logged_in(&store, "2", "def").await;

        assert_eq!(store.connector().count(), 2);
        assert_eq!(store.connector().user_of(1), UserId::from("2"));
        eventually(|| store.connector().is_closed(0)).await;
        assert!(!store.connector().is_closed(1));
    }

    #[tokio::test]
    async fn test_log_in_flag_true_while_in_flight() {
        let store = Arc::new(store());
        store.api().reply(
            paths::LOGIN,
            Reply::Ok(json!({ "token": "abc", "user": { "_id": "1" } })),
        );

        let gate = store.api().gate.lock().await;
        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.log_in(&login_request()).await })
        };

        wait_until(&store, |s| s.flags.logging_in).await;
        drop(gate);
        task.await.unwrap();

        assert!(!store.snapshot().flags.logging_in);
        assert!(store.snapshot().is_authenticated());
    }

    // =====================================================================
    // sign_up()
    // =====================================================================

    #[tokio::test]
    async fn test_sign_up_success_sets_session_and_notifies() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::clone(&creds));
        let mut rx = store.notifications();
        store.api().reply(
            paths::SIGNUP,
            Reply::Ok(json!({ "data": { "token": "xyz", "user": { "_id": "9" } } })),
        );

        store.sign_up(&signup_request()).await;

        assert_eq!(store.user().map(|u| u.id), Some(UserId::from("9")));
        assert_eq!(creds.load().unwrap().as_deref(), Some("xyz"));
        assert!(!store.snapshot().flags.signing_up);
        assert_eq!(store.connector().count(), 1);
        assert_eq!(drain(&mut rx), vec![Notification::success(messages::SIGNUP_SUCCEEDED)]);
    }

    #[tokio::test]
    async fn test_sign_up_failure_without_body_uses_fallback() {
        let store = store();
        let mut rx = store.notifications();
        store.api().reply(
            paths::SIGNUP,
            Reply::Rejected {
                status: 500,
                message: None,
            },
        );

        store.sign_up(&signup_request()).await;

        let notes = drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].message, messages::SIGNUP_FAILED);
        assert!(!store.snapshot().flags.signing_up);
    }

    #[tokio::test]
    async fn test_sign_up_network_failure_uses_fallback() {
        let store = store();
        let mut rx = store.notifications();

        store.sign_up(&signup_request()).await;

        assert_eq!(drain(&mut rx), vec![Notification::error(messages::SIGNUP_FAILED)]);
        assert_eq!(store.snapshot().phase, SessionPhase::Unknown);
    }

    // =====================================================================
    // bootstrap_session()
    // =====================================================================

    #[tokio::test]
    async fn test_bootstrap_without_credential_is_anonymous_and_offline() {
        let store = store();

        store.bootstrap_session().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(!snapshot.flags.checking_auth);
        assert_eq!(store.connector().count(), 0);
        assert_eq!(snapshot.live, LiveStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_bootstrap_with_valid_credential_restores_and_connects_once() {
        let store = store_with(Arc::new(MemoryCredentialStore::with_token("abc")));
        store.api().reply(paths::CHECK, Reply::Ok(json!({ "_id": "1", "fullName": "Ada" })));

        store.bootstrap_session().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.user().and_then(|u| u.full_name.as_deref()), Some("Ada"));
        assert!(!snapshot.flags.checking_auth);
        assert_eq!(store.connector().count(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_rejected_credential_is_cleared() {
        let creds = Arc::new(MemoryCredentialStore::with_token("expired"));
        let store = store_with(Arc::clone(&creds));
        store.api().reply(paths::CHECK, Reply::Unauthorized);

        store.bootstrap_session().await;

        assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
        assert_eq!(creds.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_shows_checking_while_in_flight() {
        let store = Arc::new(store_with(Arc::new(MemoryCredentialStore::with_token("abc"))));
        store.api().reply(paths::CHECK, Reply::Ok(json!({ "_id": "1" })));

        let gate = store.api().gate.lock().await;
        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.bootstrap_session().await })
        };

        wait_until(&store, |s| s.phase == SessionPhase::Checking && s.flags.checking_auth).await;
        drop(gate);
        task.await.unwrap();

        assert!(store.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_bootstrap_again_when_authenticated_never_reenters_checking() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        store.api().reply(paths::CHECK, Reply::Ok(json!({ "_id": "1" })));

        let mut rx = store.subscribe();
        store.bootstrap_session().await;

        assert!(rx.borrow_and_update().is_authenticated());
        assert_eq!(store.connector().count(), 1, "existing connection reused");
    }

    // =====================================================================
    // update_profile()
    // =====================================================================

    #[tokio::test]
    async fn test_update_profile_replaces_session_record() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        store.api().reply(
            paths::UPDATE_PROFILE,
            Reply::Ok(json!({ "_id": "1", "profilePic": "https://cdn/ada.png" })),
        );

        store
            .update_profile(&ProfileUpdate::profile_pic("data:image/png;base64,AA"))
            .await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.user().and_then(User::avatar), Some("https://cdn/ada.png"));
        assert!(!snapshot.flags.updating_profile);
    }

    #[tokio::test]
    async fn test_update_profile_failure_keeps_session_and_clears_flag() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        let before = store.user();
        let mut rx = store.notifications();
        store.api().reply(
            paths::UPDATE_PROFILE,
            Reply::Rejected {
                status: 413,
                message: Some("Image too large"),
            },
        );

        store.update_profile(&ProfileUpdate::profile_pic("x")).await;

        assert_eq!(store.user(), before);
        assert!(!store.snapshot().flags.updating_profile);
        assert_eq!(drain(&mut rx), vec![Notification::error("Image too large")]);
    }

    #[tokio::test]
    async fn test_update_profile_failure_without_message_uses_fallback() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        let mut rx = store.notifications();
        store.api().reply(
            paths::UPDATE_PROFILE,
            Reply::Rejected {
                status: 502,
                message: None,
            },
        );

        store.update_profile(&ProfileUpdate::profile_pic("x")).await;

        assert_eq!(drain(&mut rx), vec![Notification::error(messages::PROFILE_UPDATE_FAILED)]);
        assert!(store.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_update_profile_unauthorized_ends_session() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::clone(&creds));
        logged_in(&store, "1", "abc").await;
        store.api().reply(paths::UPDATE_PROFILE, Reply::Unauthorized);

        store.update_profile(&ProfileUpdate::profile_pic("x")).await;

        assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
        assert_eq!(store.snapshot().live, LiveStatus::Disconnected);
        assert_eq!(creds.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_profile_after_logout_is_discarded() {
        let store = Arc::new(store());
        logged_in(&store, "1", "abc").await;
        store.api().reply(paths::UPDATE_PROFILE, Reply::Ok(json!({ "_id": "1" })));

        let gate = store.api().gate.lock().await;
        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.update_profile(&ProfileUpdate::profile_pic("x")).await })
        };
        wait_until(&store, |s| s.flags.updating_profile).await;

        // Log out while the update is still parked at the gate: the logout
        // request queues behind it, so clear local state directly.
        store.close_live_connection();
        store.update(|s| s.phase = SessionPhase::Anonymous);
        drop(gate);
        task.await.unwrap();

        assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
        assert!(!store.snapshot().flags.updating_profile);
    }

    #[tokio::test]
    async fn test_update_profile_after_relogin_as_other_user_is_discarded() {
        let store = Arc::new(store());
        logged_in(&store, "1", "abc").await;
        store.api().reply(
            paths::UPDATE_PROFILE,
            Reply::Ok(json!({ "_id": "1", "fullName": "Stale" })),
        );

        let gate = store.api().gate.lock().await;
        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.update_profile(&ProfileUpdate::profile_pic("x")).await })
        };
        wait_until(&store, |s| s.flags.updating_profile).await;

        // User 2 takes over while user 1's update is parked at the gate.
        store.update(|s| s.phase = SessionPhase::Authenticated(User::new("2")));
        let mut rx = store.notifications();
        drop(gate);
        task.await.unwrap();

        let user = store.user().unwrap();
        assert_eq!(user.id, UserId::from("2"));
        assert_eq!(user.full_name, None);
        assert!(!store.snapshot().flags.updating_profile);
        assert!(drain(&mut rx).is_empty(), "no success for a discarded update");
    }

    // =====================================================================
    // open_live_connection() / close_live_connection()
    // =====================================================================

    #[tokio::test]
    async fn test_open_live_connection_without_session_is_noop() {
        let store = store();
        store.open_live_connection().await;
        assert_eq!(store.connector().count(), 0);
        assert_eq!(store.snapshot().live, LiveStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_open_live_connection_twice_opens_once() {
        let store = store();
        logged_in(&store, "1", "abc").await;

        store.open_live_connection().await;
        store.open_live_connection().await;

        assert_eq!(store.connector().count(), 1);
    }

    #[tokio::test]
    async fn test_presence_update_replaces_set() {
        let store = store();
        logged_in(&store, "1", "abc").await;

        store.connector().push(0, presence(&["u1", "u3"]));
        wait_until(&store, |s| s.online_users.len() == 2).await;
        assert_eq!(online(&store), vec!["u1", "u3"]);

        store.connector().push(0, presence(&["u1", "u2"]));
        wait_until(&store, |s| s.is_online(&UserId::from("u2"))).await;
        assert_eq!(online(&store), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_presence_duplicates_collapse() {
        let store = store();
        logged_in(&store, "1", "abc").await;

        store.connector().push(0, presence(&["u1", "u1", "u2"]));
        wait_until(&store, |s| !s.online_users.is_empty()).await;

        assert_eq!(online(&store), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_unknown_and_garbage_frames_are_ignored() {
        let store = store();
        logged_in(&store, "1", "abc").await;

        store.connector().push(0, json!({ "event": "newMessage", "data": {} }));
        store.connector().push(0, json!("not a frame"));
        store.connector().push(0, presence(&["u7"]));
        wait_until(&store, |s| !s.online_users.is_empty()).await;

        assert_eq!(online(&store), vec!["u7"]);
        assert!(matches!(store.snapshot().live, LiveStatus::Connected(_)));
    }

    #[tokio::test]
    async fn test_close_live_connection_closes_and_clears_presence() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        store.connector().push(0, presence(&["u1"]));
        wait_until(&store, |s| !s.online_users.is_empty()).await;

        store.close_live_connection();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.live, LiveStatus::Disconnected);
        assert!(snapshot.online_users.is_empty());
        assert!(snapshot.is_authenticated(), "closing the channel keeps the session");
        eventually(|| store.connector().is_closed(0)).await;
    }

    #[tokio::test]
    async fn test_close_live_connection_when_closed_is_noop() {
        let store = store();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.close_live_connection();

        assert!(!rx.has_changed().unwrap(), "no snapshot should be published");
    }

    #[tokio::test]
    async fn test_server_hang_up_allows_reconnect() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        store.connector().push(0, presence(&["u1"]));
        wait_until(&store, |s| !s.online_users.is_empty()).await;

        store.connector().hang_up(0);
        wait_until(&store, |s| s.live == LiveStatus::Disconnected).await;
        assert!(store.snapshot().online_users.is_empty());

        store.open_live_connection().await;
        assert_eq!(store.connector().count(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected_and_retry_works() {
        let store = store();
        store.connector().refuse.store(true, Ordering::SeqCst);
        logged_in(&store, "1", "abc").await;

        assert!(store.snapshot().is_authenticated());
        assert_eq!(store.snapshot().live, LiveStatus::Disconnected);

        store.connector().refuse.store(false, Ordering::SeqCst);
        store.open_live_connection().await;
        assert!(matches!(store.snapshot().live, LiveStatus::Connected(_)));
    }

    #[tokio::test]
    async fn test_presence_after_close_is_not_applied() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        store.close_live_connection();

        // The reader is stopping; a late frame must not repopulate presence.
        let _ = store
            .connector()
            .opened
            .lock()
            .unwrap()[0]
            .frames
            .send(serde_json::to_vec(&presence(&["u1"])).unwrap());
        eventually(|| store.connector().is_closed(0)).await;

        assert!(store.snapshot().online_users.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_store_closes_live_connection() {
        let store = store();
        logged_in(&store, "1", "abc").await;
        let connector_closed = {
            let opened = store.connector().opened.lock().unwrap();
            Arc::clone(&opened[0].closed)
        };

        drop(store);

        eventually(|| connector_closed.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn test_calls_reach_expected_routes() {
        let store = store_with(Arc::new(MemoryCredentialStore::with_token("abc")));
        store.api().reply(paths::CHECK, Reply::Ok(json!({ "_id": "1" })));
        store.api().reply(paths::LOGOUT, Reply::Ok(json!({})));

        store.bootstrap_session().await;
        store.log_out().await;

        assert_eq!(store.api().calls(), vec![paths::CHECK, paths::LOGOUT]);
    }
}
