//! Backend auth API client.
//!
//! DESIGN
//! ======
//! [`AuthApi`] is the seam the session controller talks through; tests swap
//! in scripted mocks. [`HttpAuthApi`] is a thin `reqwest` wrapper, and all
//! reply validation lives in the pure [`interpret_response`] so the HTTP
//! shape can be tested without a server.
//!
//! ERROR HANDLING
//! ==============
//! Every failure becomes an [`ApiError`]. Nothing is retried here; the
//! controller decides what a failure means for the session.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{Credentials, Envelope, LoginData, LoginGrant, User, VerifyData};
use crate::config::{EnvConfig, join_url};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ME_PATH: &str = "auth/me";
pub const LOGIN_PATH: &str = "auth/login";
pub const LOGOUT_PATH: &str = "auth/logout";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced at the auth API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("auth request failed: {0}")]
    Transport(String),

    /// The backend answered with an explicit failure envelope.
    #[error("auth rejected ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { status: String, message: Option<String> },

    /// Non-2xx status without a recognizable envelope.
    #[error("auth response error: status {status}")]
    HttpStatus { status: u16 },

    /// The body did not match the expected shape.
    #[error("auth response malformed: {0}")]
    Malformed(String),

    /// A success reply lacked a required field.
    #[error("auth response missing `{0}`")]
    MissingField(&'static str),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// TRAIT
// =============================================================================

/// Backend auth operations. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Verify `token` and return the user it belongs to.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, rejection, or a reply
    /// that is not a success envelope carrying a user.
    async fn current_user(&self, token: &str) -> Result<User, ApiError>;

    /// Exchange credentials for a token and user.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] unless the reply is a success envelope with
    /// both `token` and `user`.
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError>;

    /// Invalidate `token` on the backend.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or a non-2xx reply.
    async fn logout(&self, token: &str) -> Result<(), ApiError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

impl HttpTimeouts {
    /// Read `AUTH_REQUEST_TIMEOUT_SECS` / `AUTH_CONNECT_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            request_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client rooted at `base_url` (the API base, e.g. `.../api`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(base_url: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }

    /// Build a client against the resolved environment's API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &EnvConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), HttpTimeouts::from_env())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn read(response: reqwest::Response) -> Result<(u16, String), ApiError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        let response = self
            .http
            .get(self.url(ME_PATH))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        let data: VerifyData = interpret_response(status, &body)?;
        Ok(data.user)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        debug!(email = credentials.email(), role = %credentials.role(), "submitting login");
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(credentials)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        let data: LoginData = interpret_response(status, &body)?;
        LoginGrant::try_from(data)
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(LOGOUT_PATH))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() { Ok(()) } else { Err(ApiError::HttpStatus { status: status.as_u16() }) }
    }
}

// =============================================================================
// RESPONSE VALIDATION
// =============================================================================

/// Validate a reply body against the envelope contract.
///
/// An explicit failure envelope wins over the HTTP status, so a `401` with
/// `{"status":"fail","message":...}` surfaces the backend's message. A non-2xx
/// reply that is not an envelope is reported by status alone.
///
/// # Errors
///
/// Returns [`ApiError::Rejected`], [`ApiError::HttpStatus`], or
/// [`ApiError::Malformed`] as described above.
pub fn interpret_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let ok = (200..300).contains(&status);
    match Envelope::<T>::parse(body) {
        Ok(Envelope::Failure { status, message }) => Err(ApiError::Rejected { status, message }),
        Ok(Envelope::Success(_)) if !ok => Err(ApiError::HttpStatus { status }),
        Ok(envelope) => envelope.into_result(),
        Err(_) if !ok => Err(ApiError::HttpStatus { status }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
