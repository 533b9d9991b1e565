//! The auth API seam between the session store and the backend.
//!
//! The store doesn't talk HTTP itself. It calls an [`AuthApi`], which
//! returns already-decoded types or a [`SessionError`]. That gives us:
//! - [`HttpAuthApi`] in production (reqwest + the backend's REST routes)
//! - a scripted fake in tests, with no network at all
//!
//! Response-shape tolerance lives entirely in
//! [`AuthOutcome`](rtchat_protocol::AuthOutcome); by the time a value
//! leaves this module it is strict.

use std::future::Future;

use rtchat_protocol::{AuthOutcome, LoginRequest, ProfileUpdate, SignupRequest, User};
use rtchat_transport::HttpClient;

use crate::SessionError;

/// REST routes of the auth API.
pub mod paths {
    pub const CHECK: &str = "/api/auth/check";
    pub const SIGNUP: &str = "/api/auth/signup";
    pub const LOGIN: &str = "/api/auth/login";
    pub const LOGOUT: &str = "/api/auth/logout";
    pub const UPDATE_PROFILE: &str = "/api/auth/update-profile";
}

/// The backend operations the session store depends on.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → the store (and so the API) is shared across
///   tasks behind an `Arc`.
/// - Every returned future is `Send` so store operations can be spawned.
pub trait AuthApi: Send + Sync + 'static {
    /// Validates the current credential and returns its user.
    fn check(&self) -> impl Future<Output = Result<User, SessionError>> + Send;

    /// Creates an account.
    fn sign_up(
        &self,
        registration: &SignupRequest,
    ) -> impl Future<Output = Result<AuthOutcome, SessionError>> + Send;

    /// Exchanges email and password for a session.
    fn log_in(
        &self,
        credentials: &LoginRequest,
    ) -> impl Future<Output = Result<AuthOutcome, SessionError>> + Send;

    /// Tells the server the session is over.
    fn log_out(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Applies a partial profile update and returns the new record.
    fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<User, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// HttpAuthApi
// ---------------------------------------------------------------------------

/// [`AuthApi`] over the backend's REST routes.
///
/// Credential handling (bearer header, clearing on 401) is done by the
/// wrapped [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: HttpClient,
}

impl HttpAuthApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }
}

/// Decodes a body that should carry a user record in any tolerated shape.
fn decode_user(body: &[u8]) -> Result<User, SessionError> {
    Ok(AuthOutcome::decode(body)?.user)
}

impl AuthApi for HttpAuthApi {
    async fn check(&self) -> Result<User, SessionError> {
        let body = self.http.get(paths::CHECK).await?;
        decode_user(&body)
    }

    async fn sign_up(&self, registration: &SignupRequest) -> Result<AuthOutcome, SessionError> {
        let body = self.http.post(paths::SIGNUP, registration).await?;
        Ok(AuthOutcome::decode(&body)?)
    }

    async fn log_in(&self, credentials: &LoginRequest) -> Result<AuthOutcome, SessionError> {
        let body = self.http.post(paths::LOGIN, credentials).await?;
        Ok(AuthOutcome::decode(&body)?)
    }

    async fn log_out(&self) -> Result<(), SessionError> {
        self.http.post_empty(paths::LOGOUT).await?;
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, SessionError> {
        let body = self.http.put(paths::UPDATE_PROFILE, update).await?;
        decode_user(&body)
    }
}
