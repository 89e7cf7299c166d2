//! Error types for the task pool HTTP client

use thiserror::Error;

/// Errors that can occur while talking to the task pool API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP error! status: {status}, URL: {url}")]
    Status { status: u16, url: String },

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// The API answered with a non-zero errno
    #[error("API error {errno}: {errmsg}")]
    Api { errno: i64, errmsg: String },

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Identifier is not an unsigned integer
    #[error("Invalid identifier '{0}'")]
    InvalidId(String),
}

impl ApiError {
    /// Classify a reqwest error, separating timeouts from other failures
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Whether the next attempt may succeed without intervention
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Api { .. } => true,
            Self::Decode(_) | Self::InvalidId(_) => false,
        }
    }
}
