//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use autoclaim::client::{ApiError, Session, TaskApi};
use autoclaim::config::{ClaimPlan, ClaimSettings};
use autoclaim::models::{
    ClaimResponse, ListQuery, TaskItem, TaskKind, TaskListData, TaskListResponse,
};

/// How the mock answers listing requests
#[derive(Debug, Clone)]
pub enum ListBehavior {
    /// Return the configured pool
    Pool,
    /// Answer with a non-zero errno
    Errno(i64, String),
    /// Fail at the transport level
    Transport,
    /// Succeed with a null list
    NullList,
}

/// In-memory task pool
pub struct MockTaskApi {
    pool: Mutex<Vec<TaskItem>>,
    list_behavior: Mutex<ListBehavior>,

    /// Success count reported by each accepted claim
    success_per_claim: u64,

    /// Every n-th claim call (1-based) is rejected; 0 disables
    reject_every: usize,

    claim_delay: Duration,

    pub list_calls: AtomicUsize,
    pub claim_calls: AtomicUsize,
    pub claimed_ids: Mutex<Vec<String>>,
    pub pages: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MockTaskApi {
    pub fn with_pool(pool: Vec<TaskItem>) -> Self {
        Self {
            pool: Mutex::new(pool),
            list_behavior: Mutex::new(ListBehavior::Pool),
            success_per_claim: 1,
            reject_every: 0,
            claim_delay: Duration::from_millis(5),
            list_calls: AtomicUsize::new(0),
            claim_calls: AtomicUsize::new(0),
            claimed_ids: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_pool(Vec::new())
    }

    pub fn listing(self, behavior: ListBehavior) -> Self {
        *self.list_behavior.lock() = behavior;
        self
    }

    pub fn success_per_claim(mut self, success: u64) -> Self {
        self.success_per_claim = success;
        self
    }

    pub fn reject_every(mut self, n: usize) -> Self {
        self.reject_every = n;
        self
    }

    pub fn claim_delay(mut self, delay: Duration) -> Self {
        self.claim_delay = delay;
        self
    }

    pub fn claim_count(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskApi for MockTaskApi {
    async fn list_tasks(
        &self,
        _session: &Session,
        query: &ListQuery,
    ) -> Result<TaskListResponse, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pages.lock().push(query.page);

        let behavior = self.list_behavior.lock().clone();
        match behavior {
            ListBehavior::Transport => Err(ApiError::Timeout),
            ListBehavior::NullList => Ok(TaskListResponse {
                errno: 0,
                errmsg: "success".to_string(),
                data: TaskListData::default(),
            }),
            ListBehavior::Errno(errno, errmsg) => Ok(TaskListResponse {
                errno,
                errmsg,
                data: TaskListData::default(),
            }),
            ListBehavior::Pool => {
                let list = self.pool.lock().clone();
                Ok(TaskListResponse {
                    errno: 0,
                    errmsg: "success".to_string(),
                    data: TaskListData {
                        total: list.len() as u64,
                        list: Some(list),
                    },
                })
            }
        }
    }

    async fn claim_task(
        &self,
        _session: &Session,
        id: &str,
        _kind: TaskKind,
    ) -> Result<ClaimResponse, ApiError> {
        let call = self.claim_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.claim_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.reject_every > 0 && call % self.reject_every == 0 {
            return Ok(ClaimResponse {
                errno: 1003,
                errmsg: "task already claimed".to_string(),
                data: json!(null),
            });
        }

        self.claimed_ids.lock().push(id.to_string());
        Ok(ClaimResponse {
            errno: 0,
            errmsg: "success".to_string(),
            data: json!({ "success": self.success_per_claim, "fail": 0 }),
        })
    }
}

/// Audit/produce item with sequential identifiers
pub fn task(n: u64, brief: &str) -> TaskItem {
    TaskItem {
        task_id: n,
        clue_id: 1000 + n,
        brief: brief.to_string(),
        step: 1,
        subject: 2,
        clue_type: 1,
        ..Default::default()
    }
}

pub fn task_dispatched(n: u64, brief: &str, dispatch_time: &str) -> TaskItem {
    TaskItem {
        dispatch_time: dispatch_time.to_string(),
        ..task(n, brief)
    }
}

pub fn pool(n: u64) -> Vec<TaskItem> {
    (1..=n).map(|i| task(i, &format!("Task {i}"))).collect()
}

/// Settings with a short interval suitable for tests
pub fn fast_settings() -> ClaimSettings {
    ClaimSettings {
        interval_secs: 0.1,
        ..Default::default()
    }
}

pub fn plan(settings: ClaimSettings) -> ClaimPlan {
    ClaimPlan::from_settings(&settings).unwrap()
}

pub fn session() -> Session {
    Session::new("http://task-pool.test", "BDUSS=test-cookie")
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
