//! `ChatClient` builder and handle.
//!
//! This is the entry point for applications. It wires the layers together:
//! config → credential store → HTTP client → auth API + live connector →
//! session store.

use std::fmt::Display;
use std::sync::Arc;

use chrono::TimeZone;
use rtchat_protocol::{Message, User};
use rtchat_session::{HttpAuthApi, SessionStore, WebSocketConnector};
use rtchat_thread::ThreadView;
use rtchat_transport::{
    CredentialStore, FileCredentialStore, HttpClient, MemoryCredentialStore,
};

use crate::{ClientConfig, RtchatError};

/// The session store as wired by [`ChatClient`].
pub type ChatSession = SessionStore<HttpAuthApi, WebSocketConnector>;

/// Builder for a [`ChatClient`].
///
/// # Example
///
/// ```rust,no_run
/// use rtchat::prelude::*;
///
/// # async fn run() -> Result<(), RtchatError> {
/// let client = ChatClient::builder()
///     .config(ClientConfig::from_env()?)
///     .build()?;
/// client.session().bootstrap_session().await;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ChatClientBuilder {
    config: ClientConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl ChatClientBuilder {
    /// Creates a builder with the default development config.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `credentials` instead of the store implied by the config's
    /// `credential_path`.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builds the client. Nothing is sent over the network until an
    /// operation is called.
    ///
    /// # Errors
    /// Returns [`RtchatError::Transport`] if the HTTP client can't be
    /// constructed.
    pub fn build(self) -> Result<ChatClient, RtchatError> {
        let credentials: Arc<dyn CredentialStore> =
            match (self.credentials, &self.config.credential_path) {
                (Some(credentials), _) => credentials,
                (None, Some(path)) => Arc::new(FileCredentialStore::new(path.clone())),
                (None, None) => Arc::new(MemoryCredentialStore::new()),
            };

        let http = HttpClient::new(&self.config.http_config(), Arc::clone(&credentials))?;
        let session = SessionStore::new(
            HttpAuthApi::new(http),
            WebSocketConnector::new(self.config.live_url()),
            credentials,
        );

        tracing::info!(
            mode = ?self.config.mode,
            api_url = %self.config.api_url,
            "chat client ready"
        );

        Ok(ChatClient {
            session: Arc::new(session),
            config: Arc::new(self.config),
        })
    }
}

/// A configured chat client.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct ChatClient {
    session: Arc<ChatSession>,
    config: Arc<ClientConfig>,
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    /// Builds a client from `RTCHAT_*` environment variables.
    pub fn from_env() -> Result<Self, RtchatError> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    /// The session store. All session operations live here.
    pub fn session(&self) -> &Arc<ChatSession> {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The thread pane for a conversation with `peer`, seen by the
    /// signed-in user. Closed when nobody is signed in.
    pub fn thread_view<Tz>(
        &self,
        peer: Option<&User>,
        messages: &[Message],
        loading: bool,
        tz: &Tz,
    ) -> ThreadView
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match self.session.user() {
            Some(me) => ThreadView::build(&me, peer, messages, loading, tz),
            None => ThreadView::Closed,
        }
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("snapshot", &self.session.snapshot())
            .finish()
    }
}
