use dashmap::DashMap;

use vestguard_common::{CallerKey, CategoryLimit, SessionId};

use super::{StrategyDecision, MIN_RETRY_AFTER_MS};

/// Per-key ordered log of attempt timestamps.
///
/// Expired timestamps are pruned lazily on each check or consume, so work is
/// bounded to keys that are actually active; the periodic sweep handles keys
/// that went quiet.
pub struct SlidingWindowStore {
    logs: DashMap<CallerKey, Vec<u64>>,
}

impl SlidingWindowStore {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
        }
    }

    /// Only timestamps in `(now - window, now]` count toward the limit.
    fn prune(timestamps: &mut Vec<u64>, window_ms: u64, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        timestamps.retain(|&ts| ts > cutoff);
    }

    /// Evaluate eligibility without consuming budget.
    pub fn check(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) -> StrategyDecision {
        let mut entry = self.logs.entry(key.clone()).or_default();
        let timestamps = entry.value_mut();
        Self::prune(timestamps, limit.window_ms, now_ms);

        let count = timestamps.len() as u32;
        let reset_at_ms = timestamps
            .first()
            .map(|&oldest| oldest + limit.window_ms)
            .unwrap_or(now_ms + limit.window_ms);

        if count < limit.max_requests {
            StrategyDecision {
                allowed: true,
                remaining: limit.max_requests - count - 1,
                reset_at_ms,
                retry_after_ms: None,
            }
        } else {
            // Wait hint is measured from the oldest retained timestamp. When
            // requests cluster near the window edge this slightly
            // under-estimates the true wait; callers depend on this lenient
            // timing, so it is kept as-is.
            let retry = reset_at_ms.saturating_sub(now_ms).max(MIN_RETRY_AFTER_MS);
            StrategyDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
                retry_after_ms: Some(retry),
            }
        }
    }

    /// Commit one unit of consumption.
    pub fn consume(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) {
        let mut entry = self.logs.entry(key.clone()).or_default();
        let timestamps = entry.value_mut();
        Self::prune(timestamps, limit.window_ms, now_ms);
        timestamps.push(now_ms);
    }

    /// Remove keys with no timestamps since `cutoff_ms`; compact the rest
    /// rather than dropping them.
    pub fn cleanup(&self, cutoff_ms: u64) {
        self.logs.retain(|_, timestamps| {
            timestamps.retain(|&ts| ts >= cutoff_ms);
            if timestamps.is_empty() {
                false
            } else {
                timestamps.shrink_to_fit();
                true
            }
        });
        tracing::debug!(remaining = self.logs.len(), "sliding window cleanup complete");
    }

    /// Drop every key belonging to `session`, across all categories.
    pub fn remove_session(&self, session: &SessionId) {
        self.logs.retain(|key, _| &key.session != session);
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl Default for SlidingWindowStore {
    fn default() -> Self {
        Self::new()
    }
}
