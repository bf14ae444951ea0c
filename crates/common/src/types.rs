use serde::{Deserialize, Serialize};
use std::fmt;

/// Named class of upstream Bitcoin data-provider operation that a rate limit
/// applies to. Unknown category names resolve to [`EndpointCategory::Default`]
/// rather than erroring, so a misnamed caller degrades to the default limits
/// instead of bypassing the limiter or failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointCategory {
    TransactionLookup,
    AddressExplorer,
    FeeCalculator,
    NetworkStatus,
    DocumentTimestamp,
    Default,
}

impl EndpointCategory {
    /// Resolve a category name, falling back to `Default` for unknown names.
    pub fn from_name(name: &str) -> Self {
        match name {
            "transaction-lookup" => Self::TransactionLookup,
            "address-explorer" => Self::AddressExplorer,
            "fee-calculator" => Self::FeeCalculator,
            "network-status" => Self::NetworkStatus,
            "document-timestamp" => Self::DocumentTimestamp,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionLookup => "transaction-lookup",
            Self::AddressExplorer => "address-explorer",
            Self::FeeCalculator => "fee-calculator",
            Self::NetworkStatus => "network-status",
            Self::DocumentTimestamp => "document-timestamp",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller/session identifier. Callers that supply no identity are pooled
/// under a shared anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    /// Build from an optional caller-supplied identifier.
    pub fn from_opt(id: Option<&str>) -> Self {
        match id {
            Some(s) if !s.is_empty() => Self(s.to_string()),
            _ => Self::anonymous(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key under which per-caller strategy state is partitioned.
///
/// Penalty/blocklist state is deliberately keyed by [`SessionId`] alone: a
/// caller abusing one endpoint faces consequences application-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerKey {
    pub category: EndpointCategory,
    pub session: SessionId,
}

impl CallerKey {
    pub fn new(category: EndpointCategory, session: SessionId) -> Self {
        Self { category, session }
    }
}
