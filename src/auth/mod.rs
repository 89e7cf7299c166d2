//! Authorization pre-checks
//!
//! Run by the front end before a claimer is started; the engine itself never
//! consults them. Two modes are supported:
//!
//! - **Official**: the configured username is looked up in a license
//!   registry. Servers are tried in order until one answers.
//! - **Custom**: the cookie owner's user name is sent to an authorization
//!   endpoint, which must answer with an "ok" marker.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::{BeduClient, Session};
use crate::config::{AuthConfig, AuthMode, DEFAULT_USER_AGENT};
use crate::error::{ClaimErrorTrait, ErrorCategory};

/// Timestamp layout of registry records, e.g. `2025-01-07 11:06:37.080Z`
pub const REGISTRY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Default timeout for pre-check requests
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Licenses expiring within this many minutes are reported
const EXPIRY_WARNING_MINUTES: i64 = 60;

/// Authorization pre-check failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("username is required")]
    UsernameRequired,

    #[error("no license registry servers configured")]
    NoServers,

    /// The registry does not know the user
    #[error("user does not exist or is not licensed")]
    UnknownUser,

    #[error("license expired at {expires_at}")]
    Expired { expires_at: String },

    #[error("invalid license expiry '{0}'")]
    InvalidExpiry(String),

    /// The cookie owner is not allowed to use this tool
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The registry could not be reached or answered unexpectedly
    #[error("license registry error: {0}")]
    Registry(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decoding error: {0}")]
    Decode(String),
}

impl ClaimErrorTrait for AuthError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Registry(_) | Self::Http(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Registry(_) => ErrorCategory::Network,
            Self::Decode(_) | Self::InvalidExpiry(_) => ErrorCategory::Parsing,
            Self::UsernameRequired | Self::NoServers => ErrorCategory::Config,
            Self::UnknownUser | Self::Expired { .. } | Self::Unauthorized(_) => {
                ErrorCategory::Auth
            }
        }
    }
}

/// License record as stored in the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseRecord {
    pub id: String,
    pub name: String,
    pub created: String,
    pub updated: String,
    #[serde(rename = "exp_time")]
    pub exp_time: String,
    pub remark: String,
    pub limit: i64,
}

impl LicenseRecord {
    /// Parse the expiry timestamp (UTC)
    pub fn expires_at(&self) -> Result<DateTime<Utc>, AuthError> {
        NaiveDateTime::parse_from_str(self.exp_time.trim(), REGISTRY_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| AuthError::InvalidExpiry(self.exp_time.clone()))
    }

    /// Reject expired licenses; returns the expiry and whether it is imminent
    pub fn check_expiry(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, bool), AuthError> {
        let expires_at = self.expires_at()?;
        if now > expires_at {
            return Err(AuthError::Expired {
                expires_at: self.exp_time.clone(),
            });
        }
        let imminent = (expires_at - now).num_minutes() < EXPIRY_WARNING_MINUTES;
        Ok((expires_at, imminent))
    }
}

/// Result of a successful pre-check
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// No pre-check configured
    Skipped,

    /// Registry license found and valid
    Licensed(LicenseRecord),

    /// Authorization endpoint accepted the cookie owner
    Authorized { user_name: String },
}

/// Performs the configured authorization pre-check
pub struct AuthVerifier {
    client: Client,
}

impl AuthVerifier {
    /// Create a verifier with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_AUTH_TIMEOUT);
        Self::new(timeout)
    }

    /// Run the check selected by `config.mode`
    pub async fn verify(
        &self,
        config: &AuthConfig,
        api: &BeduClient,
        session: &Session,
    ) -> Result<Authorization, AuthError> {
        match config.mode {
            AuthMode::None => Ok(Authorization::Skipped),
            AuthMode::Official => self
                .verify_official(&config.username, &config.servers)
                .await
                .map(Authorization::Licensed),
            AuthMode::Custom => {
                let endpoint = config.endpoint.as_deref().unwrap_or_default();
                let user_name = self.verify_custom(api, session, endpoint).await?;
                Ok(Authorization::Authorized { user_name })
            }
        }
    }

    /// Look `username` up in the license registry
    ///
    /// Servers are tried in order; a missing user ends the search at once,
    /// any other failure moves on to the next server.
    pub async fn verify_official(
        &self,
        username: &str,
        servers: &[String],
    ) -> Result<LicenseRecord, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::UsernameRequired);
        }
        if servers.is_empty() {
            return Err(AuthError::NoServers);
        }

        let mut last_err = None;
        let mut record = None;

        for (i, server) in servers.iter().enumerate() {
            match self.fetch_license(server, username).await {
                Ok(found) => {
                    tracing::info!(server = %server, "Connected to license registry");
                    record = Some(found);
                    break;
                }
                Err(AuthError::UnknownUser) => return Err(AuthError::UnknownUser),
                Err(e) => {
                    if i + 1 < servers.len() {
                        tracing::warn!(
                            server = %server,
                            error = %e,
                            "License registry failed, trying next server"
                        );
                    }
                    last_err = Some(e);
                }
            }
        }

        let Some(record) = record else {
            return Err(last_err.unwrap_or(AuthError::NoServers));
        };

        let (expires_at, imminent) = record.check_expiry(Utc::now())?;
        if imminent {
            tracing::warn!(expires_at = %expires_at, "License expires within the hour");
        } else {
            tracing::info!(user = %record.name, expires_at = %expires_at, "License valid");
        }

        Ok(record)
    }

    async fn fetch_license(
        &self,
        server: &str,
        username: &str,
    ) -> Result<LicenseRecord, AuthError> {
        let url = format!(
            "{}/api/collections/baidu_edu_users/records/{username}",
            server.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::Registry(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(AuthError::UnknownUser),
            status => return Err(AuthError::Registry(format!("HTTP {}", status.as_u16()))),
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Registry(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))
    }

    /// Check the cookie owner against a custom authorization endpoint
    ///
    /// Returns the authorized user name.
    pub async fn verify_custom(
        &self,
        api: &BeduClient,
        session: &Session,
        endpoint: &str,
    ) -> Result<String, AuthError> {
        let info = api
            .get_user_info(session)
            .await
            .map_err(|e| AuthError::Unauthorized(format!("user info unavailable: {e}")))?;

        if info.errno != 0 {
            return Err(AuthError::Unauthorized(format!(
                "user info rejected: {}",
                info.errmsg
            )));
        }

        let user_name = info.data.user_name;
        if user_name.is_empty() {
            return Err(AuthError::Unauthorized("cookie has no user name".to_string()));
        }

        let encoded: String = url::form_urlencoded::byte_serialize(user_name.as_bytes()).collect();

        let response = self
            .client
            .get(endpoint)
            .header(AUTHORIZATION, encoded)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::Unauthorized(format!(
                "authorization endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.bytes().await?;
        let verdict: Value =
            serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))?;

        check_verdict(&verdict)?;

        tracing::info!(user = %user_name, "Authorization endpoint accepted user");
        Ok(user_name)
    }
}

/// Interpret an authorization endpoint reply
///
/// Accepted shapes are `{"text": "ok"}`, `{"text": ""}` and
/// `{"error": "ok"}`; a reply with neither field is rejected.
pub fn check_verdict(verdict: &Value) -> Result<(), AuthError> {
    let text = verdict.get("text").filter(|v| !v.is_null());
    let error = verdict.get("error").filter(|v| !v.is_null());

    if text.is_none() && error.is_none() {
        return Err(AuthError::Unauthorized("unexpected authorization reply".to_string()));
    }

    if let Some(text) = text {
        if !matches!(text.as_str(), Some("ok") | Some("")) {
            return Err(AuthError::Unauthorized(format!("endpoint replied {text}")));
        }
    }

    if let Some(error) = error {
        if error.as_str() != Some("ok") {
            return Err(AuthError::Unauthorized(format!("endpoint replied {error}")));
        }
    }

    Ok(())
}
