use vestguard_common::CategoryLimit;

/// Backoff multiplier used when a category does not configure one.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Cap used when a category does not configure one (5 minutes).
const DEFAULT_MAX_BACKOFF_MS: u64 = 5 * 60 * 1000;

/// Escalating mandatory wait for a caller with recent violations on this
/// category: `min(multiplier ^ violations * window, max_backoff)`.
///
/// Returns zero when the caller has no prior violations in the trailing
/// hour, so a first denial reports the strategy's natural retry hint
/// unchanged. Violations are strictly per (category, caller) even though
/// session blocking is global.
pub fn escalated_backoff_ms(violations: u32, limit: &CategoryLimit) -> u64 {
    if violations == 0 {
        return 0;
    }

    let multiplier = limit.backoff_multiplier.unwrap_or(DEFAULT_MULTIPLIER);
    let cap = limit.max_backoff_ms.unwrap_or(DEFAULT_MAX_BACKOFF_MS);

    let raw = multiplier.powi(violations.min(i32::MAX as u32) as i32) * limit.window_ms as f64;
    if !raw.is_finite() || raw >= cap as f64 {
        cap
    } else {
        raw as u64
    }
}
