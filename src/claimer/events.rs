//! Observer event stream
//!
//! The engine never blocks on observers: events are pushed with `try_send`
//! into a bounded queue and dropped when it is full. The number of dropped
//! events is counted so saturation is visible.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::models::TaskKind;

// ============================================================================
// Claim Events
// ============================================================================

/// Progress notifications emitted by a run
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimEvent {
    /// A polling attempt began
    AttemptStarted {
        attempt: u64,
        claimed: u64,
        limit: u64,
    },

    /// A random listing page was chosen
    PageSelected { page: u32, max_pages: u32 },

    /// Listing was filtered down to the qualifying items
    Filtered { listed: usize, qualified: usize },

    /// A batch was handed to the claim workers
    BatchStarted { kind: TaskKind, ids: Vec<String> },

    /// A batch finished and its successes were merged
    BatchClaimed {
        kind: TaskKind,
        ids: Vec<String>,
        succeeded: u64,
        total: u64,
        limit: u64,
    },

    /// An attempt ended without claiming anything
    AttemptFailed { attempt: u64, error: String },

    /// The claim limit was reached and the run ended
    LimitReached { total: u64, limit: u64 },

    /// The polling loop exited
    Stopped { total: u64 },
}

impl fmt::Display for ClaimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptStarted {
                attempt,
                claimed,
                limit,
            } => write!(f, "Attempt #{attempt} started ({claimed}/{limit} claimed)"),
            Self::PageSelected { page, max_pages } => {
                write!(f, "Selected page {page} of {max_pages}")
            }
            Self::Filtered { listed, qualified } => {
                write!(f, "{qualified} of {listed} listed items qualified")
            }
            Self::BatchStarted { kind, ids } => write!(
                f,
                "Claiming {} item(s), {}s: {}",
                ids.len(),
                kind.id_label(),
                ids.join(", ")
            ),
            Self::BatchClaimed {
                kind,
                ids,
                succeeded,
                total,
                limit,
            } => write!(
                f,
                "Claimed {succeeded} ({}s: {}), total {total}/{limit}",
                kind.id_label(),
                ids.join(", ")
            ),
            Self::AttemptFailed { attempt, error } => {
                write!(f, "Attempt #{attempt} failed: {error}")
            }
            Self::LimitReached { total, limit } => {
                write!(f, "Claim limit reached ({total}/{limit}), stopping")
            }
            Self::Stopped { total } => write!(f, "Auto-claiming stopped, {total} claimed"),
        }
    }
}

/// A timestamped event
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub at: DateTime<Local>,
    pub event: ClaimEvent,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.event)
    }
}

// ============================================================================
// Event Log
// ============================================================================

/// Bounded, drop-on-full event queue with a single consumer
pub struct EventLog {
    sender: mpsc::Sender<EventRecord>,
    receiver: Mutex<Option<mpsc::Receiver<EventRecord>>>,
    dropped: AtomicU64,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` undelivered events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    /// Record an event without waiting
    pub fn emit(&self, event: ClaimEvent) {
        tracing::debug!(event = %event, "Claim event");

        let record = EventRecord {
            at: Local::now(),
            event,
        };

        if self.sender.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Hand out the receiving end; only the first call gets it
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<EventRecord>> {
        self.receiver.lock().take()
    }

    /// Events discarded because the queue was full or the receiver gone
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}
