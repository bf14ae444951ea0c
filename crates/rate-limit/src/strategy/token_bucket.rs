use dashmap::DashMap;

use vestguard_common::{CallerKey, CategoryLimit, SessionId};

use super::{StrategyDecision, MIN_RETRY_AFTER_MS};

/// Buckets idle longer than this are evicted by the periodic sweep.
const IDLE_EVICTION_MS: u64 = 60 * 60 * 1000;

/// Internal state for a single token bucket entry.
struct TokenBucketState {
    tokens: f64,
    last_refill_ms: u64,
}

/// Refill-then-spend counter. The bucket refills one full capacity per
/// elapsed window and never exceeds capacity.
pub struct TokenBucketStore {
    buckets: DashMap<CallerKey, TokenBucketState>,
}

fn capacity(limit: &CategoryLimit) -> f64 {
    // Burst allowance is an additive bonus on bucket capacity only.
    (limit.max_requests + limit.burst_allowance.unwrap_or(0)) as f64
}

impl TokenBucketState {
    /// Add `floor(elapsed / window) * capacity` tokens, capped at capacity.
    /// The refill marker advances in whole window steps, and only when a
    /// refill actually happened, so fractional elapsed time is never lost to
    /// many near-simultaneous calls.
    fn refill(&mut self, cap: f64, window_ms: u64, now_ms: u64) {
        let window_ms = window_ms.max(1);
        let elapsed = now_ms.saturating_sub(self.last_refill_ms);
        let periods = elapsed / window_ms;
        if periods > 0 {
            self.tokens = (self.tokens + periods as f64 * cap).min(cap);
            self.last_refill_ms += periods * window_ms;
        }
    }
}

impl TokenBucketStore {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Evaluate eligibility without consuming budget.
    pub fn check(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) -> StrategyDecision {
        let cap = capacity(limit);
        let mut entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucketState {
                tokens: cap,
                last_refill_ms: now_ms,
            });
        let state = entry.value_mut();
        state.refill(cap, limit.window_ms, now_ms);

        let reset_at_ms = state.last_refill_ms + limit.window_ms;
        if state.tokens > 0.0 {
            // Burst tokens raise capacity above max_requests; the reported
            // remaining stays clamped to the configured ceiling.
            let remaining = ((state.tokens - 1.0).max(0.0) as u32).min(limit.max_requests);
            StrategyDecision {
                allowed: true,
                remaining,
                reset_at_ms,
                retry_after_ms: None,
            }
        } else {
            let window_ms = limit.window_ms.max(1);
            let elapsed = now_ms.saturating_sub(state.last_refill_ms);
            let retry = (window_ms - elapsed % window_ms).max(MIN_RETRY_AFTER_MS);
            StrategyDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
                retry_after_ms: Some(retry),
            }
        }
    }

    /// Commit one unit of consumption. Clamped at zero; a momentarily
    /// over-permissive bucket is preferable to an underflow.
    pub fn consume(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) {
        let cap = capacity(limit);
        let mut entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucketState {
                tokens: cap,
                last_refill_ms: now_ms,
            });
        let state = entry.value_mut();
        state.refill(cap, limit.window_ms, now_ms);
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    /// Evict buckets that have not refilled in over an hour.
    pub fn cleanup(&self, now_ms: u64) {
        self.buckets
            .retain(|_, state| now_ms.saturating_sub(state.last_refill_ms) < IDLE_EVICTION_MS);
        tracing::debug!(remaining = self.buckets.len(), "token bucket cleanup complete");
    }

    /// Drop every key belonging to `session`, across all categories.
    pub fn remove_session(&self, session: &SessionId) {
        self.buckets.retain(|key, _| &key.session != session);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for TokenBucketStore {
    fn default() -> Self {
        Self::new()
    }
}
