use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::EndpointCategory;

/// Top-level gateway configuration.
///
/// The limit table ships with compiled-in defaults and is loaded once at
/// startup; it is not hot-reloaded. Limiter state is process-local, so
/// running multiple gateway instances weakens every guarantee here unless
/// state is externalized (deliberately out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "LimitTable::builtin")]
    pub limits: LimitTable,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitTable::builtin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}

/// Which counting algorithm a category uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStrategy {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

/// Per-category limit configuration. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryLimit {
    /// Integer request ceiling per window.
    pub max_requests: u32,
    /// Window duration in milliseconds.
    pub window_ms: u64,
    pub strategy: LimitStrategy,
    /// Additive bonus applied to token-bucket capacity only.
    #[serde(default)]
    pub burst_allowance: Option<u32>,
    /// Base for exponential violation backoff.
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
    /// Ceiling for the computed backoff.
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    /// Glob patterns the payload must match at least one of, when present.
    #[serde(default)]
    pub allow_patterns: Option<Vec<String>>,
    /// Glob patterns that reject a matching payload outright.
    #[serde(default)]
    pub deny_patterns: Option<Vec<String>>,
}

impl CategoryLimit {
    fn new(max_requests: u32, window_ms: u64, strategy: LimitStrategy) -> Self {
        Self {
            max_requests,
            window_ms,
            strategy,
            burst_allowance: None,
            backoff_multiplier: None,
            max_backoff_ms: None,
            allow_patterns: None,
            deny_patterns: None,
        }
    }

    fn with_backoff(mut self, multiplier: f64, max_backoff_ms: u64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self.max_backoff_ms = Some(max_backoff_ms);
        self
    }

    fn with_burst(mut self, burst: u32) -> Self {
        self.burst_allowance = Some(burst);
        self
    }
}

/// Category -> limit mapping with a designated default fallback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitTable {
    pub categories: HashMap<EndpointCategory, CategoryLimit>,
    pub default: CategoryLimit,
}

impl LimitTable {
    /// The compiled-in limit table for the Bitcoin data-provider endpoints.
    pub fn builtin() -> Self {
        let mut categories = HashMap::new();
        categories.insert(
            EndpointCategory::TransactionLookup,
            CategoryLimit::new(30, 60_000, LimitStrategy::SlidingWindow)
                .with_backoff(2.0, 300_000),
        );
        categories.insert(
            EndpointCategory::AddressExplorer,
            CategoryLimit::new(20, 60_000, LimitStrategy::SlidingWindow)
                .with_backoff(2.0, 600_000),
        );
        categories.insert(
            EndpointCategory::FeeCalculator,
            CategoryLimit::new(60, 60_000, LimitStrategy::TokenBucket).with_burst(10),
        );
        categories.insert(
            EndpointCategory::NetworkStatus,
            CategoryLimit::new(120, 60_000, LimitStrategy::FixedWindow),
        );
        categories.insert(
            EndpointCategory::DocumentTimestamp,
            CategoryLimit::new(10, 300_000, LimitStrategy::FixedWindow)
                .with_backoff(3.0, 900_000),
        );

        Self {
            categories,
            default: CategoryLimit::new(30, 60_000, LimitStrategy::FixedWindow),
        }
    }

    /// Look up the limit for a category, falling back to the default entry.
    pub fn limit_for(&self, category: EndpointCategory) -> &CategoryLimit {
        self.categories.get(&category).unwrap_or(&self.default)
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        let entries = self
            .limits
            .categories
            .iter()
            .map(|(cat, limit)| (cat.as_str(), limit))
            .chain(std::iter::once(("default", &self.limits.default)));

        for (name, limit) in entries {
            if limit.max_requests == 0 {
                anyhow::bail!("category '{}': max_requests must be positive", name);
            }
            if limit.window_ms == 0 {
                anyhow::bail!("category '{}': window_ms must be positive", name);
            }
            if let Some(m) = limit.backoff_multiplier {
                if m < 1.0 {
                    anyhow::bail!("category '{}': backoff_multiplier must be >= 1.0", name);
                }
            }
        }

        Ok(())
    }
}
