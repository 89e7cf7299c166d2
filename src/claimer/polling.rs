//! Interval-driven polling loop
//!
//! One loop runs per active run. It performs an attempt immediately, then
//! one per tick. Attempts are awaited inline so they never overlap; ticks
//! missed while an attempt runs are skipped.

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::ApiError;
use crate::config::ClaimPlan;
use crate::error::{ClaimErrorTrait, ErrorCategory};
use crate::models::{ListQuery, TaskItem};

use super::events::ClaimEvent;
use super::executor::ClaimError;
use super::Inner;

/// Why an attempt ended without claiming anything
#[derive(Error, Debug)]
pub(super) enum AttemptError {
    /// The listing request itself failed
    #[error("error listing tasks: {0}")]
    Listing(ApiError),

    /// The listing endpoint answered without a usable list
    #[error("failed to list tasks: {0}")]
    Rejected(String),

    #[error("no tasks in pool")]
    NoTasks,

    #[error(transparent)]
    Claim(#[from] ClaimError),
}

impl ClaimErrorTrait for AttemptError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Listing(e) => e.is_recoverable(),
            Self::Rejected(_) | Self::NoTasks => true,
            Self::Claim(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Listing(e) => e.category(),
            Self::Rejected(_) => ErrorCategory::Api,
            Self::NoTasks => ErrorCategory::Other,
            Self::Claim(e) => e.category(),
        }
    }
}

/// Drive attempts until the run token is cancelled
pub(super) async fn run(inner: Arc<Inner>, generation: u64, token: CancellationToken) {
    let period = inner.plan.interval.min(ClaimPlan::MAX_INTERVAL);
    let first_tick = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    attempt(&inner, generation, &token).await;

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = ticker.tick() => {
                attempt(&inner, generation, &token).await;
            }
        }
    }

    match inner.close(generation) {
        Some(total) => tracing::info!(generation, total, "Auto-claiming stopped"),
        None => tracing::debug!(generation, "Replaced run exited"),
    }
}

/// Pick the listing page for one attempt
///
/// A range of 0 or 1 always yields the first page.
pub(super) fn select_page(max_pages: u32) -> u32 {
    if max_pages <= 1 {
        1
    } else {
        rand::thread_rng().gen_range(1..=max_pages)
    }
}

/// One list, filter, claim and merge cycle
async fn attempt(inner: &Inner, generation: u64, token: &CancellationToken) {
    if token.is_cancelled() {
        return;
    }

    let Some((attempt, claimed)) = inner.begin_attempt(generation) else {
        return;
    };

    let plan = &inner.plan;
    let limit = plan.claim_limit;

    inner.events.emit(ClaimEvent::AttemptStarted {
        attempt,
        claimed,
        limit,
    });

    if claimed >= limit {
        tracing::info!(total = claimed, limit, "Claim limit reached");
        inner.events.emit(ClaimEvent::LimitReached {
            total: claimed,
            limit,
        });
        inner.finish(generation);
        return;
    }

    let remaining = limit - claimed;

    let page = select_page(plan.max_pages);
    if plan.max_pages > 1 {
        tracing::debug!(page, max_pages = plan.max_pages, "Selected random page");
        inner.events.emit(ClaimEvent::PageSelected {
            page,
            max_pages: plan.max_pages,
        });
    }

    let query = ListQuery {
        kind: plan.kind,
        page,
        page_size: plan.page_size,
        step: plan.step,
        subject: plan.subject,
        clue_type: plan.clue_type,
    };

    let response = match inner.api.list_tasks(&inner.session, &query).await {
        Ok(response) => response,
        Err(e) => {
            inner.record_error(generation, attempt, &AttemptError::Listing(e));
            return;
        }
    };

    // A null list is a failed listing, not an empty pool
    let items = match response.data.list {
        Some(items) if response.errno == 0 => items,
        _ => {
            inner.record_error(generation, attempt, &AttemptError::Rejected(response.errmsg));
            return;
        }
    };
    let listed = items.len();

    let qualified: Vec<TaskItem> = items
        .into_iter()
        .filter(|item| plan.keywords.accepts(item))
        .filter(|item| !plan.uses_dispatch_window() || plan.window.accepts(item))
        .collect();

    tracing::debug!(
        attempt,
        listed,
        qualified = qualified.len(),
        total = response.data.total,
        "Filtered listing"
    );
    inner.events.emit(ClaimEvent::Filtered {
        listed,
        qualified: qualified.len(),
    });

    if qualified.is_empty() {
        inner.record_error(generation, attempt, &AttemptError::NoTasks);
        return;
    }

    let take = usize::try_from(remaining).unwrap_or(usize::MAX);
    let ids: Vec<String> = qualified
        .iter()
        .take(take)
        .map(|item| item.claim_id(plan.kind))
        .collect();

    inner.events.emit(ClaimEvent::BatchStarted {
        kind: plan.kind,
        ids: ids.clone(),
    });

    let outcome = match inner
        .executor
        .execute(Arc::clone(&inner.api), &inner.session, plan.kind, &ids)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            inner.record_error(generation, attempt, &AttemptError::from(e));
            return;
        }
    };

    let Some(total) = inner.merge(generation, &outcome) else {
        tracing::debug!(attempt, "Discarding outcome of a replaced run");
        return;
    };

    tracing::info!(
        attempt,
        id_label = plan.kind.id_label(),
        ids = %ids.join(", "),
        succeeded = outcome.succeeded,
        failures = outcome.failures,
        total,
        limit,
        "Claimed batch"
    );
    inner.events.emit(ClaimEvent::BatchClaimed {
        kind: plan.kind,
        ids,
        succeeded: outcome.succeeded,
        total,
        limit,
    });

    if total >= limit {
        tracing::info!(total, limit, "Claim limit reached");
        inner.events.emit(ClaimEvent::LimitReached { total, limit });
        inner.finish(generation);
    }
}
