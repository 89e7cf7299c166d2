//! autoclaim - Automated task claiming for the edushop task pool
//!
//! Repeatedly lists available work items, filters them, and claims as many as
//! needed up to a limit with bounded concurrency, stopping deterministically
//! when the limit is reached or cancellation is requested.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`claimer`] - Lifecycle controller, polling loop, filters and claim executor
//! - [`client`] - Task pool HTTP client behind the [`client::TaskApi`] trait
//! - [`auth`] - Authorization pre-checks run before claiming
//! - [`config`] - Configuration management and the normalized claim plan
//! - [`models`] - Wire types shared by the engine and the client
//! - [`error`] - Unified error handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use autoclaim::claimer::AutoClaimer;
//! use autoclaim::client::BeduClient;
//! use autoclaim::config::{ClaimPlan, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let plan = ClaimPlan::from_settings(&config.claim)?;
//!     let client = BeduClient::from_config(&config.server)?;
//!
//!     let claimer = AutoClaimer::new(plan, config.server.session(), Arc::new(client));
//!     claimer.start(&CancellationToken::new())?;
//!     claimer.wait().await;
//!
//!     println!("{:?}", claimer.status());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod claimer;
pub mod client;
pub mod config;
pub mod error;
pub mod models;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::claimer::{AutoClaimer, ClaimEvent, ClaimStatus, EventRecord};
    pub use crate::client::{BeduClient, Session, TaskApi};
    pub use crate::config::{ClaimPlan, Config};
    pub use crate::error::{ClaimErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{ClaimResponse, TaskItem, TaskKind};
}

// Direct re-exports for convenience
pub use claimer::{AutoClaimer, ClaimStatus};
pub use models::{TaskItem, TaskKind};
