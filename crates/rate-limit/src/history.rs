use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use vestguard_common::{EndpointCategory, SessionId};

/// Maximum number of attempt records retained globally.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// Age beyond which attempt records are pruned, independent of the cap.
pub const HISTORY_RETENTION_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Allowed,
    Blocked,
}

/// One rate-limit check, as recorded in the global history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub at_ms: u64,
    pub category: EndpointCategory,
    pub session: SessionId,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Bounded append-only log of recent rate-limit checks.
///
/// Feeds the behavior analyzer, the backoff calculator, and the stats
/// endpoint. Oldest entries are evicted first when the cap is reached; the
/// cleanup sweep additionally prunes by age.
pub struct RequestHistory {
    entries: Mutex<VecDeque<AttemptRecord>>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_HISTORY_ENTRIES)),
        }
    }

    pub fn push(&self, record: AttemptRecord) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        if entries.len() >= MAX_HISTORY_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// All of a session's attempts at or after `since_ms`, oldest first.
    pub fn session_attempts_since(&self, session: &SessionId, since_ms: u64) -> Vec<AttemptRecord> {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries
            .iter()
            .filter(|r| r.at_ms >= since_ms && &r.session == session)
            .cloned()
            .collect()
    }

    /// Blocked attempts for an exact (category, session) pair since `since_ms`.
    pub fn violation_count(
        &self,
        category: EndpointCategory,
        session: &SessionId,
        since_ms: u64,
    ) -> u32 {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries
            .iter()
            .filter(|r| {
                r.at_ms >= since_ms
                    && r.category == category
                    && &r.session == session
                    && r.outcome == AttemptOutcome::Blocked
            })
            .count() as u32
    }

    /// Sessions with any attempt at or after `since_ms`.
    pub fn active_sessions_since(&self, since_ms: u64) -> HashSet<SessionId> {
        let entries = self.entries.lock().expect("history lock poisoned");
        entries
            .iter()
            .filter(|r| r.at_ms >= since_ms)
            .map(|r| r.session.clone())
            .collect()
    }

    /// Per-category attempt counts over the retained history, descending.
    pub fn top_categories(&self) -> Vec<(EndpointCategory, u64)> {
        let entries = self.entries.lock().expect("history lock poisoned");
        let mut counts: std::collections::HashMap<EndpointCategory, u64> =
            std::collections::HashMap::new();
        for record in entries.iter() {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// The most recent `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<AttemptRecord> {
        let entries = self.entries.lock().expect("history lock poisoned");
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Drop records strictly older than `cutoff_ms`.
    pub fn prune_older_than(&self, cutoff_ms: u64) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        while entries.front().is_some_and(|r| r.at_ms < cutoff_ms) {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestHistory {
    fn default() -> Self {
        Self::new()
    }
}
