//! REST client for the chat backend.
//!
//! [`HttpClient`] is the one place requests are built. For every request it:
//!
//! 1. attaches `Authorization: Bearer <credential>` if a credential is
//!    persisted,
//! 2. sends it with the configured timeout (and cookie jar, if enabled),
//! 3. on `401` clears the persisted credential *before* returning
//!    [`TransportError::Unauthorized`], so callers never have to,
//! 4. on any other non-success returns [`TransportError::Rejected`] with
//!    the server's `message`, if it sent one.
//!
//! Bodies come back as raw bytes; decoding them is the protocol layer's job.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use rtchat_protocol::error_message;
use serde::Serialize;

use crate::{CredentialStore, TransportError};

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Scheme, host, and port of the backend, e.g. `http://localhost:5001`.
    /// Request paths are appended to it.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Keep cookies set by the server and send them back, like a browser
    /// request made with credentials.
    pub cookies: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            timeout: Duration::from_secs(30),
            cookies: true,
        }
    }
}

/// HTTP client that manages the bearer credential.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpClient {
    /// Builds a client from `config`, reading and clearing credentials in
    /// `credentials`.
    ///
    /// # Errors
    /// Returns [`TransportError::Http`] if the underlying client can't be
    /// constructed (e.g., the TLS backend fails to initialize).
    pub fn new(
        config: &HttpConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .cookie_store(config.cookies)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    /// The credential store this client reads from.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a `GET` and returns the response body.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.execute(self.request(Method::GET, path)).await
    }

    /// Sends a `POST` with no body.
    pub async fn post_empty(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.execute(self.request(Method::POST, path)).await
    }

    /// Sends a `POST` with a JSON body.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Vec<u8>, TransportError> {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    /// Sends a `PUT` with a JSON body.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Vec<u8>, TransportError> {
        self.execute(self.request(Method::PUT, path).json(body)).await
    }

    /// Starts a request to `path`, with the bearer credential if one is
    /// persisted.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);

        match self.credentials.load() {
            Ok(Some(token)) => builder.bearer_auth(token),
            Ok(None) => builder,
            Err(e) => {
                // Unreadable storage is treated as "no credential": the
                // server will answer 401 and the session ends cleanly.
                tracing::warn!(error = %e, "could not read credential");
                builder
            }
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().path().to_owned();

        if status == StatusCode::UNAUTHORIZED {
            // Cleared before the body is read: a truncated body must not
            // leave a rejected credential behind.
            if let Err(e) = self.credentials.clear() {
                tracing::warn!(error = %e, "could not clear rejected credential");
            }
            tracing::info!(path = %url, "authentication rejected, credential cleared");
            return Err(TransportError::Unauthorized {
                message: rejection_message(response).await,
            });
        }

        if !status.is_success() {
            tracing::debug!(path = %url, status = status.as_u16(), "request rejected");
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: rejection_message(response).await,
            });
        }

        let body = response.bytes().await?;
        tracing::trace!(path = %url, bytes = body.len(), "request succeeded");
        Ok(body.to_vec())
    }
}

/// The `message` of a rejection body. An unreadable body has none.
async fn rejection_message(response: reqwest::Response) -> Option<String> {
    match response.bytes().await {
        Ok(body) => error_message(&body),
        Err(e) => {
            tracing::debug!(error = %e, "could not read rejection body");
            None
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
