//! Configuration management for autoclaim
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files, and turns the raw claim knobs into a normalized
//! [`ClaimPlan`] the engine runs with.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::claimer::filter::{DispatchWindow, KeywordFilter};
use crate::client::Session;
use crate::error::{Error, Result};
use crate::models::{TaskKind, DEFAULT_PAGE_SIZE};

/// Default task pool server
pub const DEFAULT_SERVER_URL: &str = "https://easylearn.baidu.com";

/// Browser-like user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task pool server settings
    pub server: ServerConfig,

    /// Claiming knobs
    pub claim: ClaimSettings,

    /// Authorization pre-check settings
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Task pool server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the task pool API
    pub base_url: String,

    /// Opaque cookie credential, passed through unchanged
    pub cookie: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Request rate limit (requests per second); 0 disables throttling
    pub requests_per_second: u32,

    /// Rows requested per listing page
    pub page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            cookie: String::new(),
            request_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            requests_per_second: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Session handed to the task pool collaborators
    pub fn session(&self) -> Session {
        Session::new(&self.base_url, &self.cookie)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Raw claiming knobs as supplied by the user
///
/// Values are deliberately loose (signed, fractional); [`ClaimPlan::from_settings`]
/// applies the defaulting policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSettings {
    /// `audittask` or `producetask`; empty selects `audittask`
    pub task_type: String,

    /// Target number of successful claims
    pub claim_limit: i64,

    /// Seconds between attempts, fractional allowed
    pub interval_secs: f64,

    /// Random page range; 0 or 1 always requests page 1
    pub max_pages: i64,

    /// Claim worker count
    pub concurrent_claims: i64,

    /// Step (grade band) filter id
    pub step_id: i64,

    /// Subject filter id
    pub subject_id: i64,

    /// Clue type filter id
    pub clue_type_id: i64,

    /// Keywords, one of which must appear in the brief
    pub include_keywords: Vec<String>,

    /// Keywords that must not appear in the brief
    pub exclude_keywords: Vec<String>,

    /// Dispatch window start, `YYYY-MM-DD HH:MM:SS`
    pub start_time: String,

    /// Dispatch window end, `YYYY-MM-DD HH:MM:SS`
    pub end_time: String,

    /// Bound of the observer event queue
    pub event_capacity: usize,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            task_type: TaskKind::Audit.as_str().to_string(),
            claim_limit: 10,
            interval_secs: 1.0,
            max_pages: 0,
            concurrent_claims: 10,
            step_id: 1,
            subject_id: 2,
            clue_type_id: 1,
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            start_time: String::new(),
            end_time: String::new(),
            event_capacity: 100,
        }
    }
}

/// Authorization pre-check mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No pre-check
    #[default]
    None,
    /// Username looked up in the license registry
    Official,
    /// Cookie owner checked against an authorization endpoint
    Custom,
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "official" => Ok(Self::Official),
            "custom" => Ok(Self::Custom),
            other => Err(Error::config(format!("unknown auth mode: {other}"))),
        }
    }
}

/// Authorization pre-check settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// License registry user name (official mode)
    pub username: String,

    /// License registry servers, tried in order (official mode)
    pub servers: Vec<String>,

    /// Authorization endpoint (custom mode)
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `AUTOCLAIM_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        let server = &mut self.server;
        if let Ok(v) = std::env::var("AUTOCLAIM_SERVER_URL") {
            server.base_url = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_COOKIE") {
            server.cookie = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_REQUEST_TIMEOUT") {
            server.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_USER_AGENT") {
            server.user_agent = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_RATE_LIMIT") {
            server.requests_per_second = v;
        }

        let claim = &mut self.claim;
        if let Ok(v) = std::env::var("AUTOCLAIM_TASK_TYPE") {
            claim.task_type = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_CLAIM_LIMIT") {
            claim.claim_limit = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_INTERVAL") {
            claim.interval_secs = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_MAX_PAGES") {
            claim.max_pages = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_CONCURRENCY") {
            claim.concurrent_claims = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_STEP") {
            claim.step_id = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_SUBJECT") {
            claim.subject_id = v;
        }
        if let Some(v) = env_parse("AUTOCLAIM_CLUE_TYPE") {
            claim.clue_type_id = v;
        }
        if let Some(v) = env_list("AUTOCLAIM_INCLUDE") {
            claim.include_keywords = v;
        }
        if let Some(v) = env_list("AUTOCLAIM_EXCLUDE") {
            claim.exclude_keywords = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_START_TIME") {
            claim.start_time = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_END_TIME") {
            claim.end_time = v;
        }

        if let Ok(v) = std::env::var("AUTOCLAIM_AUTH_MODE") {
            self.auth.mode = v.parse()?;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_AUTH_USERNAME") {
            self.auth.username = v;
        }
        if let Some(v) = env_list("AUTOCLAIM_AUTH_SERVERS") {
            self.auth.servers = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_AUTH_ENDPOINT") {
            self.auth.endpoint = Some(v);
        }

        if let Ok(v) = std::env::var("AUTOCLAIM_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("AUTOCLAIM_LOG_FORMAT") {
            self.logging.format = v;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::with_source(format!("Failed to read config file: {}", path.display()), e)
        })?;

        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// The cookie is not checked here; an empty credential is rejected when
    /// a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(Error::config("server base URL is required"));
        }
        url::Url::parse(&self.server.base_url)
            .map_err(|e| Error::config(format!("invalid server base URL: {e}")))?;

        if self.server.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }

        if self.server.page_size == 0 {
            return Err(Error::config("page_size must be greater than 0"));
        }

        TaskKind::from_str(&self.claim.task_type)?;

        match self.auth.mode {
            AuthMode::None => {}
            AuthMode::Official => {
                if self.auth.username.trim().is_empty() {
                    return Err(Error::config("official authorization requires a username"));
                }
                if self.auth.servers.is_empty() {
                    return Err(Error::config(
                        "official authorization requires at least one registry server",
                    ));
                }
            }
            AuthMode::Custom => {
                if self.auth.endpoint.as_deref().unwrap_or("").is_empty() {
                    return Err(Error::config(
                        "custom authorization requires an endpoint",
                    ));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Claim Plan
// ============================================================================

/// Normalized claiming configuration, fixed for the lifetime of an engine
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimPlan {
    pub kind: TaskKind,
    pub claim_limit: u64,
    pub interval: Duration,
    pub max_pages: u32,
    pub concurrent_claims: usize,
    pub page_size: u32,
    pub step: i64,
    pub subject: i64,
    pub clue_type: i64,
    pub keywords: KeywordFilter,
    pub window: DispatchWindow,
    pub event_capacity: usize,
}

impl ClaimPlan {
    pub const MIN_INTERVAL_SECS: f64 = 0.1;
    pub const FALLBACK_INTERVAL_SECS: f64 = 1.0;
    /// Longest accepted polling interval; larger values are capped
    pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);
    pub const DEFAULT_CLAIM_LIMIT: u64 = 10;
    pub const DEFAULT_CONCURRENT_CLAIMS: usize = 10;
    pub const DEFAULT_EVENT_CAPACITY: usize = 100;

    /// Apply the defaulting policy to raw settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown task type.
    pub fn from_settings(settings: &ClaimSettings) -> Result<Self> {
        let kind = TaskKind::from_str(&settings.task_type)?;

        // NaN falls back; anything above a day, infinity included, is capped
        let interval = if settings.interval_secs >= Self::MIN_INTERVAL_SECS {
            let secs = settings.interval_secs.min(Self::MAX_INTERVAL.as_secs_f64());
            Duration::try_from_secs_f64(secs).ok()
        } else {
            None
        }
        .unwrap_or_else(|| Duration::from_secs_f64(Self::FALLBACK_INTERVAL_SECS));

        let claim_limit = if settings.claim_limit <= 0 {
            Self::DEFAULT_CLAIM_LIMIT
        } else {
            settings.claim_limit as u64
        };

        let max_pages = settings.max_pages.clamp(0, u32::MAX as i64) as u32;

        let concurrent_claims = if settings.concurrent_claims <= 0 {
            Self::DEFAULT_CONCURRENT_CLAIMS
        } else {
            settings.concurrent_claims as usize
        };

        let event_capacity = if settings.event_capacity == 0 {
            Self::DEFAULT_EVENT_CAPACITY
        } else {
            settings.event_capacity
        };

        Ok(Self {
            kind,
            claim_limit,
            interval,
            max_pages,
            concurrent_claims,
            page_size: DEFAULT_PAGE_SIZE,
            step: settings.step_id,
            subject: settings.subject_id,
            clue_type: settings.clue_type_id,
            keywords: KeywordFilter::new(
                settings.include_keywords.clone(),
                settings.exclude_keywords.clone(),
            ),
            window: DispatchWindow::new(&settings.start_time, &settings.end_time),
            event_capacity,
        })
    }

    /// Override the listing page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Whether the dispatch-time window applies to this plan's task kind
    pub fn uses_dispatch_window(&self) -> bool {
        self.kind == TaskKind::Produce
    }
}
