//! Task pool API client
//!
//! The engine only depends on the [`TaskApi`] trait; [`BeduClient`] is the
//! reqwest implementation talking to the real service. Requests are never
//! retried here: a failure is surfaced to the caller and the next polling
//! tick tries again.

pub mod error;
pub mod headers;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::config::{ServerConfig, DEFAULT_USER_AGENT};
use crate::models::{
    ClaimResponse, LabelResponse, ListQuery, TaskKind, TaskListResponse, UserInfoResponse,
};

pub use error::ApiError;

/// Base address and opaque credential shared by every request
///
/// The cookie is never interpreted; validating it is an upstream concern.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub base_url: String,
    pub cookie: String,
}

impl Session {
    pub fn new(base_url: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie: cookie.into(),
        }
    }

    /// Join an API path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Reject sessions that cannot authenticate any request
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(crate::error::Error::config("server base URL is required"));
        }
        if self.cookie.trim().is_empty() {
            return Err(crate::error::Error::config("cookie is required"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("cookie", &if self.cookie.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// Listing and claiming operations the engine relies on
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Fetch one page of candidate items
    ///
    /// A non-zero `errno` is returned as data, not as an error; the caller
    /// decides how to treat it.
    async fn list_tasks(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> Result<TaskListResponse, ApiError>;

    /// Claim a single item by its kind-specific identifier
    async fn claim_task(
        &self,
        session: &Session,
        id: &str,
        kind: TaskKind,
    ) -> Result<ClaimResponse, ApiError>;
}

/// HTTP client for the edushop task pool
pub struct BeduClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Optional rate limiter shared by all requests from this client
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,

    user_agent: String,
}

impl BeduClient {
    /// Create a client with the default user agent and no rate limit
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be created
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Self::with_config(timeout, DEFAULT_USER_AGENT, 0)
    }

    /// Create a client with custom configuration
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout
    /// * `user_agent` - User agent sent with every request
    /// * `requests_per_second` - Request rate limit; 0 disables it
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be created
    pub fn with_config(
        timeout: Duration,
        user_agent: &str,
        requests_per_second: u32,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        let rate_limiter = NonZeroU32::new(requests_per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            rate_limiter,
            user_agent: user_agent.to_string(),
        })
    }

    /// Create a client from the server section of the configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        Self::with_config(
            config.request_timeout(),
            &config.user_agent,
            config.requests_per_second,
        )
    }

    /// Fetch label filter groups (step, subject, clue type) for a task kind
    pub async fn get_labels(
        &self,
        session: &Session,
        kind: TaskKind,
    ) -> Result<LabelResponse, ApiError> {
        let url = session.url(&format!("/edushop/question/{}/getlabel", kind.as_str()));
        self.get_json(&url, &[], session).await
    }

    /// Fetch the profile of the user owning the session cookie
    pub async fn get_user_info(&self, session: &Session) -> Result<UserInfoResponse, ApiError> {
        let url = session.url("/edushop/user/common/info");
        self.get_json(&url, &[], session).await
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        session: &Session,
    ) -> Result<T, ApiError> {
        self.throttle().await;

        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .headers(headers::build_api_headers(&self.user_agent, &session.cookie))
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        Self::decode(url, response).await
    }

    async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        session: &Session,
    ) -> Result<T, ApiError> {
        self.throttle().await;

        tracing::debug!(url = %url, "POST");

        let response = self
            .client
            .post(url)
            .headers(headers::build_json_headers(&self.user_agent, &session.cookie))
            .json(body)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        Self::decode(url, response).await
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(ApiError::from_transport)?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Build the JSON body of a single-item claim request
pub fn claim_body(id: &str, kind: TaskKind) -> Result<serde_json::Value, ApiError> {
    let numeric: u64 = id
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidId(id.to_string()))?;

    Ok(serde_json::json!({ kind.id_field(): [numeric] }))
}

#[async_trait]
impl TaskApi for BeduClient {
    async fn list_tasks(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> Result<TaskListResponse, ApiError> {
        let url = session.url(&format!("/edushop/question/{}/list", query.kind.as_str()));
        self.get_json(&url, &query.params(), session).await
    }

    async fn claim_task(
        &self,
        session: &Session,
        id: &str,
        kind: TaskKind,
    ) -> Result<ClaimResponse, ApiError> {
        let body = claim_body(id, kind)?;
        let url = session.url(&format!("/edushop/question/{}/claim", kind.commit_path()));
        self.post_json(&url, &body, session).await
    }
}
