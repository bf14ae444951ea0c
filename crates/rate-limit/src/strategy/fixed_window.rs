use dashmap::DashMap;

use vestguard_common::{CallerKey, CategoryLimit, SessionId};

use super::{StrategyDecision, MIN_RETRY_AFTER_MS};

/// Internal state for a single fixed-window entry.
struct FixedWindowState {
    count: u32,
    window_reset_ms: u64,
}

impl FixedWindowState {
    /// Roll forward to the window containing `now_ms`. A request arriving
    /// exactly at the reset instant lands in the new window: the counter is
    /// reset first, then the request is counted. The boundary always advances
    /// in whole window steps so it never drifts, computed arithmetically so
    /// a key revisited after a long idle spell rolls over in O(1).
    fn rotate(&mut self, window_ms: u64, now_ms: u64) {
        if now_ms >= self.window_reset_ms {
            let window_ms = window_ms.max(1);
            let windows_behind = (now_ms - self.window_reset_ms) / window_ms + 1;
            self.count = 0;
            self.window_reset_ms += windows_behind * window_ms;
        }
    }
}

/// Classic per-key counter reset at fixed window boundaries.
pub struct FixedWindowStore {
    windows: DashMap<CallerKey, FixedWindowState>,
}

impl FixedWindowStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Evaluate eligibility without consuming budget.
    pub fn check(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) -> StrategyDecision {
        let mut entry = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| FixedWindowState {
                count: 0,
                window_reset_ms: now_ms + limit.window_ms,
            });
        let state = entry.value_mut();
        state.rotate(limit.window_ms, now_ms);

        if state.count < limit.max_requests {
            StrategyDecision {
                allowed: true,
                remaining: limit.max_requests - state.count - 1,
                reset_at_ms: state.window_reset_ms,
                retry_after_ms: None,
            }
        } else {
            StrategyDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms: state.window_reset_ms,
                retry_after_ms: Some(
                    state.window_reset_ms.saturating_sub(now_ms).max(MIN_RETRY_AFTER_MS),
                ),
            }
        }
    }

    /// Commit one unit of consumption.
    pub fn consume(&self, key: &CallerKey, limit: &CategoryLimit, now_ms: u64) {
        let mut entry = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| FixedWindowState {
                count: 0,
                window_reset_ms: now_ms + limit.window_ms,
            });
        let state = entry.value_mut();
        state.rotate(limit.window_ms, now_ms);
        state.count += 1;
    }

    /// Evict entries whose reset boundary has passed.
    pub fn cleanup(&self, now_ms: u64) {
        self.windows.retain(|_, state| state.window_reset_ms > now_ms);
        tracing::debug!(remaining = self.windows.len(), "fixed window cleanup complete");
    }

    /// Drop every key belonging to `session`, across all categories.
    pub fn remove_session(&self, session: &SessionId) {
        self.windows.retain(|key, _| &key.session != session);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for FixedWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vestguard_common::{EndpointCategory, LimitStrategy};

    fn limit(max: u32, window_ms: u64) -> CategoryLimit {
        CategoryLimit {
            max_requests: max,
            window_ms,
            strategy: LimitStrategy::FixedWindow,
            burst_allowance: None,
            backoff_multiplier: None,
            max_backoff_ms: None,
            allow_patterns: None,
            deny_patterns: None,
        }
    }

    fn key(session: &str) -> CallerKey {
        CallerKey::new(EndpointCategory::NetworkStatus, SessionId::new(session))
    }

    #[test]
    fn denies_fourth_request_in_window() {
        let store = FixedWindowStore::new();
        let limit = limit(3, 1000);
        let key = key("s");

        for _ in 0..3 {
            assert!(store.check(&key, &limit, 0).allowed);
            store.consume(&key, &limit, 0);
        }

        let decision = store.check(&key, &limit, 500);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_ms, Some(MIN_RETRY_AFTER_MS));
    }

    #[test]
    fn window_expiry_resets_count() {
        let store = FixedWindowStore::new();
        let limit = limit(3, 1000);
        let key = key("s");

        for _ in 0..3 {
            store.consume(&key, &limit, 0);
        }
        assert!(!store.check(&key, &limit, 999).allowed);

        // 1001ms later the counter has rolled over; the check reports the
        // post-consumption remaining.
        let decision = store.check(&key, &limit, 1001);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn request_at_exact_boundary_starts_new_window() {
        let store = FixedWindowStore::new();
        let limit = limit(1, 1000);
        let key = key("s");

        store.consume(&key, &limit, 0);
        assert!(!store.check(&key, &limit, 999).allowed);
        assert!(store.check(&key, &limit, 1000).allowed);
    }

    #[test]
    fn boundary_advances_whole_windows_without_drift() {
        let store = FixedWindowStore::new();
        let limit = limit(2, 1000);
        let key = key("s");

        store.consume(&key, &limit, 0);
        // Idle across several windows, then return.
        let decision = store.check(&key, &limit, 5500);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at_ms, 6000);
    }

    #[test]
    fn rollover_after_long_idle_stays_on_the_window_grid() {
        let store = FixedWindowStore::new();
        let limit = limit(2, 1000);
        let key = key("s");

        store.consume(&key, &limit, 0);
        // Years of idle time: the boundary lands on the next grid point past
        // now, not on some drifted offset.
        let decision = store.check(&key, &limit, 123_456_789);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at_ms, 123_457_000);
    }

    #[test]
    fn zero_window_does_not_hang_or_panic() {
        let store = FixedWindowStore::new();
        let limit = limit(1, 0);
        let key = key("s");

        store.consume(&key, &limit, 10);
        assert!(!store.check(&key, &limit, 10).allowed);
        // With a degenerate window every later instant is a fresh window.
        assert!(store.check(&key, &limit, 11).allowed);
    }

    #[test]
    fn checks_alone_do_not_consume() {
        let store = FixedWindowStore::new();
        let limit = limit(2, 1000);
        let key = key("s");

        for _ in 0..10 {
            assert_eq!(store.check(&key, &limit, 0).remaining, 1);
        }
    }

    #[test]
    fn cleanup_removes_expired_windows() {
        let store = FixedWindowStore::new();
        let limit = limit(2, 1000);
        store.consume(&key("stale"), &limit, 0);
        store.consume(&key("live"), &limit, 5000);

        store.cleanup(2000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_session_clears_all_categories() {
        let store = FixedWindowStore::new();
        let limit = limit(2, 1000);
        let a = CallerKey::new(EndpointCategory::NetworkStatus, SessionId::new("a"));
        let b = CallerKey::new(EndpointCategory::FeeCalculator, SessionId::new("a"));
        let other = key("b");
        store.consume(&a, &limit, 0);
        store.consume(&b, &limit, 0);
        store.consume(&other, &limit, 0);

        store.remove_session(&SessionId::new("a"));
        assert_eq!(store.len(), 1);
    }
}
