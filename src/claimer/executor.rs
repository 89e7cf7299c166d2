//! Bounded concurrent claim executor
//!
//! A batch of identifiers is pushed into a closed queue and drained by a
//! fixed number of workers, one claim call per identifier. Outcomes are
//! folded into a single tally under one lock.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{ApiError, Session, TaskApi};
use crate::error::{ClaimErrorTrait, ErrorCategory};
use crate::models::{ClaimResponse, TaskKind};

/// Batch-level claim failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Every call failed and nothing was claimed
    #[error("{0}")]
    AllFailed(String),

    /// No call produced a response
    #[error("no valid claim response")]
    NoResponse,

    /// The batch contained no identifiers
    #[error("no identifiers to claim")]
    EmptyBatch,
}

impl ClaimErrorTrait for ClaimError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EmptyBatch)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::AllFailed(_) | Self::NoResponse => ErrorCategory::Api,
            Self::EmptyBatch => ErrorCategory::Other,
        }
    }
}

/// Aggregate result of a batch that was not a total failure
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    /// Sum of per-call success counts
    pub succeeded: u64,

    /// Most recent response observed by any worker
    pub last_response: Option<ClaimResponse>,

    /// Number of identifiers in the batch
    pub attempted: usize,

    /// Calls that ended in a transport or API error
    pub failures: usize,
}

#[derive(Debug, Default)]
struct BatchTally {
    succeeded: u64,
    last_error: Option<String>,
    last_response: Option<ClaimResponse>,
    failures: usize,
    calls: usize,
}

impl BatchTally {
    fn record(&mut self, kind: TaskKind, id: &str, result: Result<ClaimResponse, ApiError>) {
        self.calls += 1;

        match result {
            Ok(response) if response.errno != 0 => {
                let err = ApiError::Api {
                    errno: response.errno,
                    errmsg: response.errmsg.clone(),
                };
                tracing::warn!(
                    id_label = kind.id_label(),
                    id = %id,
                    error = %err,
                    "Claim rejected"
                );
                self.failures += 1;
                self.last_error = Some(err.to_string());
                self.last_response = Some(response);
            }
            Ok(response) => {
                let success = response.success_count();
                tracing::debug!(id_label = kind.id_label(), id = %id, success, "Claim response");
                self.succeeded += success;
                self.last_response = Some(response);
            }
            Err(err) => {
                tracing::warn!(
                    id_label = kind.id_label(),
                    id = %id,
                    error = %err,
                    "Claim request failed"
                );
                self.failures += 1;
                self.last_error = Some(err.to_string());
            }
        }
    }

    fn into_outcome(self, attempted: usize) -> Result<ClaimOutcome, ClaimError> {
        if let Some(error) = self.last_error {
            if self.succeeded == 0 {
                return Err(ClaimError::AllFailed(error));
            }
        }

        if self.last_response.is_none() {
            return Err(ClaimError::NoResponse);
        }

        Ok(ClaimOutcome {
            succeeded: self.succeeded,
            last_response: self.last_response,
            attempted,
            failures: self.failures,
        })
    }
}

/// Fans claim calls for one batch over a bounded number of workers
#[derive(Debug, Clone, Copy)]
pub struct ClaimExecutor {
    width: usize,
}

impl ClaimExecutor {
    /// Create an executor running at most `width` claims at once
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Claim every identifier in `ids`, returning once all workers drained
    ///
    /// In-flight calls are never aborted; the batch always runs to
    /// completion.
    pub async fn execute(
        &self,
        api: Arc<dyn TaskApi>,
        session: &Session,
        kind: TaskKind,
        ids: &[String],
    ) -> Result<ClaimOutcome, ClaimError> {
        if ids.is_empty() {
            return Err(ClaimError::EmptyBatch);
        }

        let workers = self.width.min(ids.len());

        let (tx, rx) = mpsc::channel(ids.len());
        for id in ids {
            if tx.try_send(id.clone()).is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let tally = Arc::new(Mutex::new(BatchTally::default()));

        let handles = self.spawn_workers(workers, &queue, &tally, &api, session, kind);

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Claim worker terminated abnormally");
            }
        }

        let tally = std::mem::take(&mut *tally.lock());
        tracing::debug!(
            calls = tally.calls,
            succeeded = tally.succeeded,
            failures = tally.failures,
            "Claim batch drained"
        );

        tally.into_outcome(ids.len())
    }

    fn spawn_workers(
        &self,
        workers: usize,
        queue: &Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
        tally: &Arc<Mutex<BatchTally>>,
        api: &Arc<dyn TaskApi>,
        session: &Session,
        kind: TaskKind,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let queue = Arc::clone(queue);
            let tally = Arc::clone(tally);
            let api = Arc::clone(api);
            let session = session.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let id = {
                        let mut rx = queue.lock().await;
                        rx.recv().await
                    };

                    let Some(id) = id else {
                        break; // Queue drained
                    };

                    let result = api.claim_task(&session, &id, kind).await;
                    tally.lock().record(kind, &id, result);
                }

                tracing::trace!(worker_id, "Claim worker finished");
            });

            handles.push(handle);
        }

        handles
    }
}
