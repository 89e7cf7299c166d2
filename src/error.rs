//! Unified error handling for the autoclaim crate
//!
//! Domain-specific errors ([`ApiError`], [`AuthError`], [`ClaimError`]) are
//! wrapped by the crate-wide [`Error`], and all of them expose a common
//! classification through [`ClaimErrorTrait`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use autoclaim::error::{ClaimErrorTrait, Error};
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "{err}");
//!     } else {
//!         tracing::error!("{err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::auth::AuthError;
pub use crate::claimer::executor::ClaimError;
pub use crate::client::error::ApiError;

/// Common trait for all autoclaim error types
pub trait ClaimErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the next attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures, timeouts, bad HTTP status
    Network,
    /// The API answered with a non-zero errno
    Api,
    /// Undecodable responses or identifiers
    Parsing,
    /// Missing or invalid settings
    Config,
    /// Engine misuse, such as starting twice
    Lifecycle,
    /// Authorization pre-check failures
    Auth,
    /// Other/unknown errors
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Api => "api",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Lifecycle => "lifecycle",
            Self::Auth => "auth",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Unified error type for the autoclaim crate
#[derive(Error, Debug)]
pub enum Error {
    /// Task pool API errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Claim batch failures
    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    /// Authorization pre-check failures
    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    /// `start` was called while a run is in progress
    #[error("auto-claiming is already active")]
    AlreadyActive,

    /// `start` was called outside a tokio runtime
    #[error("no tokio runtime available to spawn the polling loop")]
    NoRuntime,

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ClaimErrorTrait for ApiError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Http(_) | ApiError::Status { .. } | ApiError::Timeout => {
                ErrorCategory::Network
            }
            ApiError::Api { .. } => ErrorCategory::Api,
            ApiError::Decode(_) | ApiError::InvalidId(_) => ErrorCategory::Parsing,
        }
    }
}

impl ClaimErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_recoverable(),
            Self::Claim(_) => true,
            Self::Auth(e) => e.is_recoverable(),
            Self::AlreadyActive => false,
            Self::NoRuntime => false,
            Self::Config(_) => false,
            Self::Io(_) => true,
            Self::Json(_) | Self::Toml(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Api(e) => e.category(),
            Self::Claim(_) => ErrorCategory::Api,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::AlreadyActive | Self::NoRuntime => ErrorCategory::Lifecycle,
            Self::Config(_) | Self::Toml(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Io(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
