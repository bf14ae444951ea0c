use dashmap::DashMap;
use std::collections::HashSet;

use vestguard_common::SessionId;

/// Warnings at which a session is promoted to blocked.
pub const BLOCK_WARNING_THRESHOLD: u32 = 2;

/// How long a promoted session stays blocked (1 hour).
pub const BLOCK_DURATION_MS: u64 = 60 * 60 * 1000;

/// Per-session penalty state. Warnings only ever go up; there is no decay
/// path other than an explicit administrative reset or inactivity cleanup.
#[derive(Debug, Clone, Default)]
struct PenaltyState {
    warnings: u32,
    blocked_until_ms: Option<u64>,
}

/// What a registered warning did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyOutcome {
    /// Below the threshold: a soft warning, one step closer to a block.
    Warned { count: u32 },
    /// Threshold crossed: the session is blocked until the given instant.
    Blocked { until_ms: u64 },
}

/// Session-wide penalty ledger and blocklist.
///
/// Keyed by session alone, not per category: abuse on one endpoint has
/// application-wide consequences.
pub struct PenaltyTracker {
    sessions: DashMap<SessionId, PenaltyState>,
}

impl PenaltyTracker {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// The instant the session's block expires, if it is currently blocked.
    pub fn blocked_until(&self, session: &SessionId, now_ms: u64) -> Option<u64> {
        self.sessions
            .get(session)
            .and_then(|state| state.blocked_until_ms)
            .filter(|&until| until > now_ms)
    }

    /// Record one suspicious-behavior warning against the session.
    pub fn register_warning(&self, session: &SessionId, now_ms: u64) -> PenaltyOutcome {
        let mut entry = self.sessions.entry(session.clone()).or_default();
        let state = entry.value_mut();
        state.warnings += 1;

        if state.warnings >= BLOCK_WARNING_THRESHOLD {
            let until = now_ms + BLOCK_DURATION_MS;
            state.blocked_until_ms = Some(until);
            tracing::warn!(
                session = %session,
                warnings = state.warnings,
                blocked_until_ms = until,
                "session promoted to blocklist"
            );
            PenaltyOutcome::Blocked { until_ms: until }
        } else {
            tracing::warn!(session = %session, warnings = state.warnings, "session warned");
            PenaltyOutcome::Warned {
                count: state.warnings,
            }
        }
    }

    /// Administrative override: forget the session entirely.
    pub fn reset(&self, session: &SessionId) {
        self.sessions.remove(session);
    }

    /// Drop warning state for sessions absent from `active`, keeping every
    /// currently-blocked session regardless of activity. Blocks must run
    /// their full course even if the caller goes quiet.
    pub fn cleanup_inactive(&self, active: &HashSet<SessionId>, now_ms: u64) {
        self.sessions.retain(|session, state| {
            state.blocked_until_ms.is_some_and(|until| until > now_ms)
                || active.contains(session)
        });
    }

    /// Number of sessions currently blocked.
    pub fn blocked_count(&self, now_ms: u64) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().blocked_until_ms.is_some_and(|until| until > now_ms))
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for PenaltyTracker {
    fn default() -> Self {
        Self::new()
    }
}
