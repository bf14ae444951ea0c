//! The three interchangeable per-key counting algorithms.
//!
//! Each store shares the same shape: `check` evaluates eligibility without
//! consuming budget, `consume` commits one unit of consumption, `cleanup`
//! evicts stale keys, and `remove_session` drops every key belonging to one
//! caller. The facade picks the store matching the category's configured
//! strategy.

pub mod fixed_window;
pub mod sliding_window;
pub mod token_bucket;

pub use fixed_window::FixedWindowStore;
pub use sliding_window::SlidingWindowStore;
pub use token_bucket::TokenBucketStore;

/// Lower bound on any retry-after hint, so callers always receive a usable
/// positive wait.
pub const MIN_RETRY_AFTER_MS: u64 = 1000;

/// Outcome of a single strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDecision {
    pub allowed: bool,
    /// Budget left assuming the current request proceeds, clamped to
    /// `[0, max_requests]`.
    pub remaining: u32,
    /// When the key's budget next replenishes.
    pub reset_at_ms: u64,
    /// Positive wait hint, present only on denial.
    pub retry_after_ms: Option<u64>,
}
