//! Auto-claiming engine
//!
//! [`AutoClaimer`] is the lifecycle controller. It owns the normalized
//! [`ClaimPlan`], the task pool session and the engine state, and spawns one
//! polling loop per run:
//!
//! ```text
//! start ─► attempt ─► tick ─► attempt ─► ... ─► limit reached │ stop │ parent cancelled
//!            │
//!            └─ list ─► filter ─► claim (bounded fan-out) ─► merge
//! ```
//!
//! State lives behind a synchronous lock that is never held across an
//! await, so [`AutoClaimer::status`] never suspends.

pub mod events;
pub mod executor;
pub mod filter;
mod polling;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{Session, TaskApi};
use crate::config::ClaimPlan;
use crate::error::{ClaimErrorTrait, Error, Result};
use crate::models::ClaimResponse;

use polling::AttemptError;

pub use events::{ClaimEvent, EventLog, EventRecord};
pub use executor::{ClaimError, ClaimExecutor, ClaimOutcome};
pub use filter::{DispatchWindow, KeywordFilter};

// ============================================================================
// Status
// ============================================================================

/// Point-in-time snapshot of the engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimStatus {
    pub is_active: bool,
    pub successful_claims: u64,
    pub attempt_count: u64,
    pub last_error: Option<String>,
    pub last_response: Option<ClaimResponse>,
}

#[derive(Debug, Default)]
struct EngineState {
    successful_claims: u64,
    attempt_count: u64,
    last_error: Option<String>,
    last_response: Option<ClaimResponse>,

    /// Bumped on every start; work from older runs is discarded
    generation: u64,

    /// Cancellation handle of the current run; present iff active
    run: Option<CancellationToken>,
}

impl EngineState {
    fn snapshot(&self) -> ClaimStatus {
        ClaimStatus {
            is_active: self.run.is_some(),
            successful_claims: self.successful_claims,
            attempt_count: self.attempt_count,
            last_error: self.last_error.clone(),
            last_response: self.last_response.clone(),
        }
    }
}

// ============================================================================
// Engine internals shared with the polling loop
// ============================================================================

struct Inner {
    plan: ClaimPlan,
    session: Session,
    api: Arc<dyn TaskApi>,
    executor: ClaimExecutor,
    state: Mutex<EngineState>,
    events: EventLog,
}

impl Inner {
    /// Count a new attempt for `generation`
    ///
    /// Returns the attempt number and the claims so far, or `None` when the
    /// run is no longer current.
    fn begin_attempt(&self, generation: u64) -> Option<(u64, u64)> {
        let mut state = self.state.lock();
        if state.generation != generation || state.run.is_none() {
            return None;
        }
        state.attempt_count += 1;
        Some((state.attempt_count, state.successful_claims))
    }

    fn record_error(&self, generation: u64, attempt: u64, error: &AttemptError) {
        let category = error.category();
        if error.is_recoverable() {
            tracing::warn!(attempt, %category, error = %error, "Claim attempt failed");
        } else {
            tracing::error!(attempt, %category, error = %error, "Claim attempt failed");
        }

        let error = error.to_string();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.last_error = Some(error.clone());
        }

        self.events.emit(ClaimEvent::AttemptFailed { attempt, error });
    }

    /// Merge a batch outcome, clamped to the remaining headroom
    ///
    /// Returns the new total, or `None` if the outcome belongs to a run that
    /// has since been replaced.
    fn merge(&self, generation: u64, outcome: &ClaimOutcome) -> Option<u64> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }

        let headroom = self.plan.claim_limit.saturating_sub(state.successful_claims);
        let accepted = outcome.succeeded.min(headroom);
        if accepted < outcome.succeeded {
            tracing::warn!(
                reported = outcome.succeeded,
                accepted,
                "Claim batch reported more successes than the remaining limit"
            );
        }

        state.successful_claims += accepted;
        if let Some(response) = &outcome.last_response {
            state.last_response = Some(response.clone());
        }
        state.last_error = None;

        Some(state.successful_claims)
    }

    fn claimed(&self) -> u64 {
        self.state.lock().successful_claims
    }

    /// Final bookkeeping when the loop of `generation` exits
    ///
    /// Emits `Stopped` and returns the run's total only while `generation`
    /// is current; a replaced run exits silently.
    fn close(&self, generation: u64) -> Option<u64> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        if let Some(token) = state.run.take() {
            token.cancel();
        }

        // Emitted under the lock so a new run's events always follow it
        let total = state.successful_claims;
        self.events.emit(ClaimEvent::Stopped { total });
        Some(total)
    }

    /// End the run of `generation` if it is still the current one
    fn finish(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(token) = state.run.take() {
            token.cancel();
        }
    }
}

// ============================================================================
// Auto Claimer
// ============================================================================

/// Lifecycle controller for auto-claiming
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct AutoClaimer {
    inner: Arc<Inner>,
}

impl AutoClaimer {
    /// Create an idle engine
    pub fn new(plan: ClaimPlan, session: Session, api: Arc<dyn TaskApi>) -> Self {
        let executor = ClaimExecutor::new(plan.concurrent_claims);
        let events = EventLog::new(plan.event_capacity);

        Self {
            inner: Arc::new(Inner {
                plan,
                session,
                api,
                executor,
                state: Mutex::new(EngineState::default()),
                events,
            }),
        }
    }

    pub fn plan(&self) -> &ClaimPlan {
        &self.inner.plan
    }

    /// Begin a run and return immediately
    ///
    /// The run is cancelled when `parent` is, when [`stop`](Self::stop) is
    /// called, or when the claim limit is reached.
    ///
    /// # Errors
    ///
    /// * `Error::AlreadyActive` if a run is in progress; state is untouched
    /// * `Error::Config` if the session lacks a base URL or cookie
    /// * `Error::NoRuntime` if called outside a tokio runtime
    pub fn start(&self, parent: &CancellationToken) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (generation, token) = {
            let mut state = self.inner.state.lock();
            if state.run.is_some() {
                return Err(Error::AlreadyActive);
            }
            self.inner.session.validate()?;

            state.successful_claims = 0;
            state.attempt_count = 0;
            state.last_error = None;
            state.last_response = None;
            state.generation += 1;

            let token = parent.child_token();
            state.run = Some(token.clone());
            (state.generation, token)
        };

        let plan = &self.inner.plan;
        tracing::info!(
            task_type = %plan.kind,
            limit = plan.claim_limit,
            interval_ms = plan.interval.as_millis() as u64,
            max_pages = plan.max_pages,
            concurrency = plan.concurrent_claims,
            "Auto-claiming started"
        );

        runtime.spawn(polling::run(Arc::clone(&self.inner), generation, token));
        Ok(())
    }

    /// Cancel the current run; does nothing when idle
    pub fn stop(&self) {
        let token = self.inner.state.lock().run.take();
        if let Some(token) = token {
            token.cancel();
            tracing::info!("Auto-claiming stop requested");
        }
    }

    /// Snapshot of the engine state
    pub fn status(&self) -> ClaimStatus {
        self.inner.state.lock().snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().run.is_some()
    }

    /// Wait until the current run ends; returns at once when idle
    pub async fn wait(&self) {
        let token = self.inner.state.lock().run.clone();
        if let Some(token) = token {
            token.cancelled().await;
        }
    }

    /// Take the event receiver; only the first caller gets it
    pub fn take_events(&self) -> Option<mpsc::Receiver<EventRecord>> {
        self.inner.events.take_receiver()
    }

    /// Events discarded because the queue was full
    pub fn dropped_events(&self) -> u64 {
        self.inner.events.dropped()
    }

    pub fn event_capacity(&self) -> usize {
        self.inner.events.capacity()
    }
}

impl std::fmt::Debug for AutoClaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoClaimer")
            .field("plan", &self.inner.plan)
            .field("session", &self.inner.session)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::config::ClaimSettings;
    use crate::models::{ListQuery, TaskKind, TaskListResponse};
    use async_trait::async_trait;

    struct IdleApi;

    #[async_trait]
    impl TaskApi for IdleApi {
        async fn list_tasks(
            &self,
            _session: &Session,
            _query: &ListQuery,
        ) -> std::result::Result<TaskListResponse, ApiError> {
            Ok(TaskListResponse::default())
        }

        async fn claim_task(
            &self,
            _session: &Session,
            _id: &str,
            _kind: TaskKind,
        ) -> std::result::Result<ClaimResponse, ApiError> {
            Ok(ClaimResponse::default())
        }
    }

    fn engine(cookie: &str) -> AutoClaimer {
        let settings = ClaimSettings {
            interval_secs: 60.0,
            ..Default::default()
        };
        let plan = ClaimPlan::from_settings(&settings).unwrap();
        AutoClaimer::new(plan, Session::new("http://localhost", cookie), Arc::new(IdleApi))
    }

    fn outcome(succeeded: u64) -> ClaimOutcome {
        ClaimOutcome {
            succeeded,
            last_response: Some(ClaimResponse::default()),
            attempted: succeeded as usize,
            failures: 0,
        }
    }

    #[test]
    fn test_start_outside_runtime() {
        let err = engine("a=b").start(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, Error::NoRuntime));
    }

    #[tokio::test]
    async fn test_start_requires_cookie() {
        let claimer = engine("");
        let err = claimer.start(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!claimer.is_active());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let claimer = engine("a=b");
        let before = claimer.status();
        claimer.stop();
        claimer.stop();
        assert_eq!(claimer.status(), before);
    }

    #[tokio::test]
    async fn test_merge_clamped_to_limit() {
        let claimer = engine("a=b");
        claimer.start(&CancellationToken::new()).unwrap();
        let generation = claimer.inner.state.lock().generation;

        assert_eq!(claimer.inner.merge(generation, &outcome(7)), Some(7));
        assert_eq!(claimer.inner.merge(generation, &outcome(7)), Some(10));
        assert_eq!(claimer.status().successful_claims, 10);
        claimer.stop();
    }

    #[tokio::test]
    async fn test_stale_generation_ignored() {
        let claimer = engine("a=b");
        claimer.start(&CancellationToken::new()).unwrap();
        let stale = claimer.inner.state.lock().generation;
        claimer.stop();
        claimer.start(&CancellationToken::new()).unwrap();

        assert_eq!(claimer.inner.merge(stale, &outcome(3)), None);
        claimer.inner.finish(stale);
        assert!(claimer.is_active());
        assert_eq!(claimer.status().successful_claims, 0);
        claimer.stop();
    }

    #[tokio::test]
    async fn test_replaced_run_exits_without_stopped_event() {
        let claimer = engine("a=b");
        let mut events = claimer.take_events().unwrap();

        claimer.start(&CancellationToken::new()).unwrap();
        let stale = claimer.inner.state.lock().generation;
        claimer.stop();
        claimer.start(&CancellationToken::new()).unwrap();

        assert_eq!(claimer.inner.close(stale), None);
        assert!(claimer.is_active());
        assert!(events.try_recv().is_err());

        let current = claimer.inner.state.lock().generation;
        assert_eq!(claimer.inner.close(current), Some(0));
        assert!(!claimer.is_active());
        assert_eq!(
            events.try_recv().unwrap().event,
            ClaimEvent::Stopped { total: 0 }
        );
    }

    #[tokio::test]
    async fn test_parent_cancellation_ends_run() {
        let claimer = engine("a=b");
        let parent = CancellationToken::new();
        claimer.start(&parent).unwrap();

        parent.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while claimer.is_active() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
