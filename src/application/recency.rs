use crate::domain::account::OwnerId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-owner heuristic protecting freshly written balances from being
/// overwritten by a stale authoritative read.
///
/// Purely time-based: a mutation stamps the owner with `now()`, and
/// reconciliation treats balances as locally authoritative while the stamp
/// is inside the grace window. Within the window the local balance always
/// wins; a later, unguarded reconciliation accepts correction.
pub struct RecencyGuard {
    grace: Duration,
    marks: Mutex<HashMap<OwnerId, Instant>>,
}

impl RecencyGuard {
    /// Matches the five-minute window the mobile client uses between a
    /// transfer and the next trusted server snapshot.
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(5 * 60);

    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Records that a balance mutation was just applied locally.
    pub fn record_mutation(&self, owner: OwnerId) {
        let mut marks = self.marks.lock().expect("recency guard lock poisoned");
        marks.insert(owner, Instant::now());
    }

    /// True while the owner's last local mutation is within the grace window.
    pub fn is_recently_mutated(&self, owner: OwnerId) -> bool {
        let marks = self.marks.lock().expect("recency guard lock poisoned");
        marks
            .get(&owner)
            .is_some_and(|at| at.elapsed() < self.grace)
    }
}

impl Default for RecencyGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GRACE)
    }
}
