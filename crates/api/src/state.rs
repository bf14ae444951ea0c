use std::sync::Arc;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use vestguard_common::AppConfig;
use vestguard_rate_limit::RateLimitService;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Central application state holding configuration, the limiter, and metrics.
pub struct AppState {
    pub config: AppConfig,
    pub limiter: RateLimitService,
    pub metrics: LimiterMetrics,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: AppConfig, limiter: RateLimitService) -> Self {
        Self {
            config,
            limiter,
            metrics: LimiterMetrics::new(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Prometheus counters for the rate-limit service.
pub struct LimiterMetrics {
    pub registry: Registry,
    pub checks_total: IntCounter,
    pub checks_blocked: IntCounter,
    pub suspicious_flags: IntCounter,
    pub category_checks: IntCounterVec,
}

impl LimiterMetrics {
    /// Create a new LimiterMetrics instance with all counters registered
    /// against a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let checks_total = IntCounter::with_opts(Opts::new(
            "vestguard_checks_total",
            "Total number of rate-limit checks performed",
        ))
        .expect("failed to create checks_total counter");

        let checks_blocked = IntCounter::with_opts(Opts::new(
            "vestguard_checks_blocked",
            "Total number of rate-limit checks denied",
        ))
        .expect("failed to create checks_blocked counter");

        let suspicious_flags = IntCounter::with_opts(Opts::new(
            "vestguard_suspicious_flags_total",
            "Number of checks flagged by the behavior analyzer",
        ))
        .expect("failed to create suspicious_flags counter");

        let category_checks = IntCounterVec::new(
            Opts::new(
                "vestguard_category_checks_total",
                "Rate-limit checks per endpoint category",
            ),
            &["category"],
        )
        .expect("failed to create category_checks counter");

        registry
            .register(Box::new(checks_total.clone()))
            .expect("failed to register checks_total");
        registry
            .register(Box::new(checks_blocked.clone()))
            .expect("failed to register checks_blocked");
        registry
            .register(Box::new(suspicious_flags.clone()))
            .expect("failed to register suspicious_flags");
        registry
            .register(Box::new(category_checks.clone()))
            .expect("failed to register category_checks");

        Self {
            registry,
            checks_total,
            checks_blocked,
            suspicious_flags,
            category_checks,
        }
    }
}

impl Default for LimiterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
