//! Adaptive rate limiting and abuse detection for outbound Bitcoin
//! data-provider calls (mempool, price, and timestamp APIs).
//!
//! The public entry point is [`RateLimitService`]: callers ask it whether an
//! endpoint category may be called ([`RateLimitService::check`]) and commit
//! the consumption after the call actually ran
//! ([`RateLimitService::record`]). Checks compose, in order: blocklist,
//! payload patterns, behavioral analysis, the category's configured counting
//! strategy, and violation backoff. Every check is logged to a bounded
//! in-memory history that feeds the analyzer, the backoff math, and the
//! stats surface.
//!
//! Three interchangeable counting algorithms are provided:
//!
//! - **Fixed window** -- a counter reset at window boundaries; cheap and
//!   predictable.
//! - **Sliding window log** -- per-key timestamp log pruned lazily; smooth
//!   limits with accurate retry hints.
//! - **Token bucket** -- refill-then-spend with a burst allowance on
//!   capacity.
//!
//! All state lives in process memory behind [`DashMap`](dashmap::DashMap)s
//! and self-expires via a periodic cleanup sweep. Nothing here performs I/O
//! or suspends; denials are ordinary [`Decision`] values, never errors.
//!
//! Because state is process-local, running more than one instance of the
//! host service weakens every guarantee: each instance enforces its own
//! budget independently. Externalizing the state is deliberately out of
//! scope.

pub mod backoff;
pub mod behavior;
pub mod clock;
pub mod history;
pub mod patterns;
pub mod penalty;
pub mod strategy;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vestguard_common::{CallerKey, EndpointCategory, LimitStrategy, LimitTable, SessionId};

use crate::behavior::ANALYSIS_WINDOW_MS;
use crate::clock::{Clock, SystemClock};
use crate::history::{
    AttemptOutcome, AttemptRecord, RequestHistory, HISTORY_RETENTION_MS,
};
use crate::patterns::PatternVerdict;
use crate::penalty::{PenaltyOutcome, PenaltyTracker, BLOCK_WARNING_THRESHOLD};
use crate::strategy::{
    FixedWindowStore, SlidingWindowStore, TokenBucketStore, MIN_RETRY_AFTER_MS,
};

/// Mandatory wait handed to callers flagged by the behavior analyzer.
pub const SUSPICIOUS_RETRY_MS: u64 = 10 * 60 * 1000;

/// Period of the background cleanup sweep.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Why a check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The session is on the blocklist.
    Blocked,
    /// The behavior analyzer flagged the session.
    SuspiciousPattern,
    /// The category's strategy counter is exhausted.
    RateLimited,
    /// The payload matched a deny pattern (or missed a required allow
    /// pattern).
    PayloadRejected,
}

/// Outcome of a rate-limit check. Denials carry a reason and a positive
/// retry hint; this is normal control flow for callers, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Budget left assuming this request proceeds, in `[0, max_requests]`.
    pub remaining_requests: u32,
    /// When the caller's budget next replenishes (epoch ms).
    pub reset_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Aggregate view for observability dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub blocked_session_count: usize,
    pub top_endpoints: Vec<EndpointCount>,
    pub recent_activity: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointCount {
    pub category: EndpointCategory,
    pub count: u64,
}

struct ServiceInner {
    limits: LimitTable,
    clock: Arc<dyn Clock>,
    fixed: FixedWindowStore,
    sliding: SlidingWindowStore,
    buckets: TokenBucketStore,
    history: RequestHistory,
    penalties: PenaltyTracker,
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
}

/// The rate limiter facade. Cheaply cloneable (backed by `Arc`) and safe to
/// share across tasks and threads; construct it once in the composition root
/// and hand out clones.
#[derive(Clone)]
pub struct RateLimitService {
    inner: Arc<ServiceInner>,
}

impl RateLimitService {
    /// Create a service over the given limit table, using the system clock.
    pub fn new(limits: LimitTable) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    /// Create a service with an injected clock. Tests use this with a
    /// [`clock::ManualClock`] to drive windows and expiry deterministically.
    pub fn with_clock(limits: LimitTable, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            categories = limits.categories.len(),
            "creating rate limit service"
        );
        Self {
            inner: Arc::new(ServiceInner {
                limits,
                clock,
                fixed: FixedWindowStore::new(),
                sliding: SlidingWindowStore::new(),
                buckets: TokenBucketStore::new(),
                history: RequestHistory::new(),
                penalties: PenaltyTracker::new(),
                total_requests: AtomicU64::new(0),
                blocked_requests: AtomicU64::new(0),
            }),
        }
    }

    /// Decide whether a call to `category` may proceed.
    ///
    /// This only evaluates eligibility; it never consumes budget. Callers
    /// that go on to perform the call must follow up with
    /// [`record`](Self::record). An unknown category resolves to the default
    /// limits rather than failing: the limiter is a defensive layer, not a
    /// correctness layer, and must never be the reason a feature breaks.
    ///
    /// Exactly one attempt record is appended to the history per invocation,
    /// whatever the outcome.
    pub fn check(
        &self,
        category: &str,
        session: Option<&str>,
        payload: Option<&serde_json::Value>,
    ) -> Decision {
        let inner = &self.inner;
        let category = EndpointCategory::from_name(category);
        let session = SessionId::from_opt(session);
        let limit = inner.limits.limit_for(category);
        let now_ms = inner.clock.now_ms();

        inner.total_requests.fetch_add(1, Ordering::Relaxed);

        // Blocked sessions are rejected before anything else: they consume
        // no strategy budget and trigger no further analysis.
        if let Some(until_ms) = inner.penalties.blocked_until(&session, now_ms) {
            self.log_attempt(now_ms, category, &session, AttemptOutcome::Blocked, payload);
            return Decision {
                allowed: false,
                remaining_requests: 0,
                reset_at_ms: until_ms,
                retry_after_ms: Some(until_ms - now_ms),
                reason: Some(DenyReason::Blocked),
                warning: None,
            };
        }

        let verdict = patterns::evaluate(
            limit.allow_patterns.as_deref(),
            limit.deny_patterns.as_deref(),
            payload,
        );
        if verdict == PatternVerdict::Reject {
            tracing::warn!(%category, %session, "payload rejected by pattern check");
            self.log_attempt(now_ms, category, &session, AttemptOutcome::Blocked, payload);
            return Decision {
                allowed: false,
                remaining_requests: 0,
                reset_at_ms: now_ms + limit.window_ms,
                retry_after_ms: None,
                reason: Some(DenyReason::PayloadRejected),
                warning: None,
            };
        }

        let recent = inner
            .history
            .session_attempts_since(&session, now_ms.saturating_sub(ANALYSIS_WINDOW_MS));
        if let Some(kind) = behavior::analyze(&recent, category, now_ms) {
            let outcome = inner.penalties.register_warning(&session, now_ms);
            let warning = match outcome {
                PenaltyOutcome::Warned { count } => format!(
                    "{} (warning {} of {})",
                    kind.message(),
                    count,
                    BLOCK_WARNING_THRESHOLD
                ),
                PenaltyOutcome::Blocked { .. } => {
                    format!("{}; session blocked", kind.message())
                }
            };
            self.log_attempt(now_ms, category, &session, AttemptOutcome::Blocked, payload);
            return Decision {
                allowed: false,
                remaining_requests: 0,
                reset_at_ms: now_ms + SUSPICIOUS_RETRY_MS,
                retry_after_ms: Some(SUSPICIOUS_RETRY_MS),
                reason: Some(DenyReason::SuspiciousPattern),
                warning: Some(warning),
            };
        }

        let key = CallerKey::new(category, session.clone());
        let decision = match limit.strategy {
            LimitStrategy::FixedWindow => inner.fixed.check(&key, limit, now_ms),
            LimitStrategy::SlidingWindow => inner.sliding.check(&key, limit, now_ms),
            LimitStrategy::TokenBucket => inner.buckets.check(&key, limit, now_ms),
        };

        if !decision.allowed {
            let violations = inner.history.violation_count(
                category,
                &session,
                now_ms.saturating_sub(HISTORY_RETENTION_MS),
            );
            let backoff_ms = backoff::escalated_backoff_ms(violations, limit);
            let retry = decision
                .retry_after_ms
                .unwrap_or(MIN_RETRY_AFTER_MS)
                .max(backoff_ms);
            tracing::debug!(
                %category,
                %session,
                violations,
                retry_after_ms = retry,
                "rate limit exceeded"
            );
            self.log_attempt(now_ms, category, &session, AttemptOutcome::Blocked, payload);
            return Decision {
                allowed: false,
                remaining_requests: 0,
                reset_at_ms: decision.reset_at_ms,
                retry_after_ms: Some(retry),
                reason: Some(DenyReason::RateLimited),
                warning: None,
            };
        }

        self.log_attempt(now_ms, category, &session, AttemptOutcome::Allowed, payload);
        Decision {
            allowed: true,
            remaining_requests: decision.remaining,
            reset_at_ms: decision.reset_at_ms,
            retry_after_ms: None,
            reason: None,
            warning: None,
        }
    }

    /// Commit one unit of consumption after a successful dispatch.
    ///
    /// Decoupled from [`check`](Self::check) so callers can probe without
    /// committing; budget is spent only on calls that actually executed.
    pub fn record(&self, category: &str, session: Option<&str>) {
        let inner = &self.inner;
        let category = EndpointCategory::from_name(category);
        let session = SessionId::from_opt(session);
        let limit = inner.limits.limit_for(category);
        let now_ms = inner.clock.now_ms();
        let key = CallerKey::new(category, session);

        match limit.strategy {
            LimitStrategy::FixedWindow => inner.fixed.consume(&key, limit, now_ms),
            LimitStrategy::SlidingWindow => inner.sliding.consume(&key, limit, now_ms),
            LimitStrategy::TokenBucket => inner.buckets.consume(&key, limit, now_ms),
        }
    }

    fn log_attempt(
        &self,
        at_ms: u64,
        category: EndpointCategory,
        session: &SessionId,
        outcome: AttemptOutcome,
        payload: Option<&serde_json::Value>,
    ) {
        if outcome == AttemptOutcome::Blocked {
            self.inner.blocked_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.history.push(AttemptRecord {
            at_ms,
            category,
            session: session.clone(),
            outcome,
            metadata: payload.cloned(),
        });
    }

    /// Aggregate counters and recent activity for dashboards.
    pub fn stats(&self) -> LimiterStats {
        let inner = &self.inner;
        let now_ms = inner.clock.now_ms();
        LimiterStats {
            total_requests: inner.total_requests.load(Ordering::Relaxed),
            blocked_requests: inner.blocked_requests.load(Ordering::Relaxed),
            blocked_session_count: inner.penalties.blocked_count(now_ms),
            top_endpoints: inner
                .history
                .top_categories()
                .into_iter()
                .map(|(category, count)| EndpointCount { category, count })
                .collect(),
            recent_activity: inner.history.recent(20),
        }
    }

    /// Administrative override: clear the session's blocklist entry,
    /// warnings, and strategy counters across every category.
    pub fn reset_session(&self, session: &str) {
        let session = SessionId::new(session);
        tracing::info!(%session, "administrative session reset");
        self.inner.penalties.reset(&session);
        self.inner.fixed.remove_session(&session);
        self.inner.sliding.remove_session(&session);
        self.inner.buckets.remove_session(&session);
    }

    /// One cleanup pass: evict expired counters, prune stale history, and
    /// drop warning state for sessions with no recent activity. The
    /// blocklist is never touched; blocked sessions stay blocked for their
    /// full duration regardless of activity.
    ///
    /// Public so tests (and embedders without the background task) can drive
    /// sweeps deterministically.
    pub fn sweep(&self) {
        let inner = &self.inner;
        let now_ms = inner.clock.now_ms();
        let retention_start = now_ms.saturating_sub(HISTORY_RETENTION_MS);

        inner.fixed.cleanup(now_ms);
        inner.sliding.cleanup(retention_start);
        inner.buckets.cleanup(now_ms);
        inner.history.prune_older_than(retention_start);

        let active = inner.history.active_sessions_since(retention_start);
        inner.penalties.cleanup_inactive(&active, now_ms);

        tracing::debug!(
            history_len = inner.history.len(),
            penalty_entries = inner.penalties.len(),
            "cleanup sweep complete"
        );
    }

    /// Spawn the periodic cleanup sweep on a dedicated thread.
    ///
    /// The returned handle stops the task on [`CleanupHandle::stop`] or
    /// drop, so the sweep shares the facade's lifecycle instead of running
    /// as an orphaned timer.
    pub fn start_cleanup_task(&self) -> CleanupHandle {
        let service = self.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("vestguard-cleanup".into())
            .spawn(move || {
                let tick = Duration::from_millis(500);
                let ticks_per_sweep = (CLEANUP_INTERVAL.as_millis() / tick.as_millis()) as u32;
                loop {
                    for _ in 0..ticks_per_sweep {
                        if stop_flag.load(Ordering::Relaxed) {
                            return;
                        }
                        std::thread::sleep(tick);
                    }
                    service.sweep();
                    tracing::trace!("rate limiter cleanup tick completed");
                }
            })
            .expect("failed to spawn cleanup thread");

        CleanupHandle {
            stop,
            handle: Some(handle),
        }
    }
}

/// Handle owning the background cleanup thread.
pub struct CleanupHandle {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl CleanupHandle {
    /// Signal the cleanup thread to exit and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn service(clock: &ManualClock) -> RateLimitService {
        RateLimitService::with_clock(LimitTable::builtin(), Arc::new(clock.clone()))
    }

    #[test]
    fn unknown_category_falls_back_to_default_limits() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);

        let decision = service.check("no-such-category", Some("s"), None);
        assert!(decision.allowed);
        // Default entry: 30 requests per window; first check reports 29.
        assert_eq!(decision.remaining_requests, 29);
    }

    #[test]
    fn checks_without_record_never_consume() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);

        for _ in 0..5 {
            let decision = service.check("network-status", Some("s"), None);
            assert_eq!(decision.remaining_requests, 119);
        }
    }

    #[test]
    fn burst_category_remaining_stays_within_configured_ceiling() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);

        // fee-calculator carries a burst allowance on top of max_requests=60;
        // the reported remaining must not exceed the ceiling.
        let decision = service.check("fee-calculator", Some("s"), None);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_requests, 60);
    }

    #[test]
    fn record_commits_consumption() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);

        service.check("network-status", Some("s"), None);
        service.record("network-status", Some("s"));
        let decision = service.check("network-status", Some("s"), None);
        assert_eq!(decision.remaining_requests, 118);
    }

    #[test]
    fn clone_shares_state() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);
        let other = service.clone();

        service.record("network-status", Some("s"));
        let decision = other.check("network-status", Some("s"), None);
        assert_eq!(decision.remaining_requests, 118);
    }

    #[test]
    fn stats_reflect_activity() {
        let clock = ManualClock::new(1_000_000);
        let service = service(&clock);

        service.check("fee-calculator", Some("a"), None);
        service.check("fee-calculator", Some("b"), None);
        service.check("network-status", Some("a"), None);

        let stats = service.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.blocked_requests, 0);
        assert_eq!(stats.top_endpoints[0].category, EndpointCategory::FeeCalculator);
        assert_eq!(stats.top_endpoints[0].count, 2);
        assert_eq!(stats.recent_activity.len(), 3);
    }
}
