//! Heuristic abuse-shape detection over a caller's recent attempts.
//!
//! Four independent rules, each targeting a distinct shape, evaluated in
//! order with short-circuit on first match. Deliberately not a composite
//! score: each rule stays individually tunable and testable.

use vestguard_common::EndpointCategory;

use crate::history::{AttemptOutcome, AttemptRecord};

/// How far back the analyzer looks.
pub const ANALYSIS_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Rapid-fire rule: more than this many attempts within [`RAPID_FIRE_WINDOW_MS`].
const RAPID_FIRE_MAX: usize = 10;
const RAPID_FIRE_WINDOW_MS: u64 = 10 * 1000;

/// Address lookups are privacy-sensitive and get a stricter volume cap.
const ADDRESS_EXPLORER_MAX: usize = 20;

/// Scanning rule: breadth and volume together.
const SCAN_CATEGORY_MAX: usize = 3;
const SCAN_TOTAL_MAX: usize = 30;

/// Repeated-violator rule: blocked attempts among the recent history.
const VIOLATION_MAX: usize = 5;

/// Why the analyzer flagged a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionKind {
    RapidFire,
    AddressScraping,
    EndpointScanning,
    RepeatedViolations,
}

impl SuspicionKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::RapidFire => "rapid-fire request burst detected",
            Self::AddressScraping => "excessive address lookups detected",
            Self::EndpointScanning => "endpoint scanning pattern detected",
            Self::RepeatedViolations => "repeated rate limit violations",
        }
    }
}

/// Inspect a caller's attempts from the trailing five minutes, plus the
/// in-flight attempt to `current_category`, and return the first rule that
/// fires.
///
/// `recent` must already be filtered to this session; entries outside the
/// analysis window are ignored here as well, so passing a wider slice is
/// harmless. The in-flight attempt is counted toward volume rules, which is
/// what makes an 11th back-to-back check trip the rapid-fire rule rather
/// than the 12th.
pub fn analyze(
    recent: &[AttemptRecord],
    current_category: EndpointCategory,
    now_ms: u64,
) -> Option<SuspicionKind> {
    let window_start = now_ms.saturating_sub(ANALYSIS_WINDOW_MS);
    let windowed: Vec<&AttemptRecord> =
        recent.iter().filter(|r| r.at_ms >= window_start).collect();

    // Rule 1: rapid fire.
    let burst_start = now_ms.saturating_sub(RAPID_FIRE_WINDOW_MS);
    let burst = windowed.iter().filter(|r| r.at_ms >= burst_start).count() + 1;
    if burst > RAPID_FIRE_MAX {
        return Some(SuspicionKind::RapidFire);
    }

    // Rule 2: address-explorer volume.
    let address_attempts = windowed
        .iter()
        .filter(|r| r.category == EndpointCategory::AddressExplorer)
        .count()
        + usize::from(current_category == EndpointCategory::AddressExplorer);
    if address_attempts > ADDRESS_EXPLORER_MAX {
        return Some(SuspicionKind::AddressScraping);
    }

    // Rule 3: scanning (breadth and volume).
    let mut categories: std::collections::HashSet<EndpointCategory> =
        windowed.iter().map(|r| r.category).collect();
    categories.insert(current_category);
    let total = windowed.len() + 1;
    if categories.len() > SCAN_CATEGORY_MAX && total > SCAN_TOTAL_MAX {
        return Some(SuspicionKind::EndpointScanning);
    }

    // Rule 4: repeated violator.
    let blocked = windowed
        .iter()
        .filter(|r| r.outcome == AttemptOutcome::Blocked)
        .count();
    if blocked > VIOLATION_MAX {
        return Some(SuspicionKind::RepeatedViolations);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vestguard_common::SessionId;

    fn record(at_ms: u64, category: EndpointCategory, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            at_ms,
            category,
            session: SessionId::new("s"),
            outcome,
            metadata: None,
        }
    }

    #[test]
    fn eleventh_attempt_in_ten_seconds_is_rapid_fire() {
        let now = 100_000;
        let recent: Vec<_> = (0..10)
            .map(|i| record(now - 9_000 + i * 100, EndpointCategory::Default, AttemptOutcome::Allowed))
            .collect();

        assert_eq!(
            analyze(&recent, EndpointCategory::Default, now),
            Some(SuspicionKind::RapidFire)
        );
    }

    #[test]
    fn ten_attempts_in_ten_seconds_is_fine() {
        let now = 100_000;
        let recent: Vec<_> = (0..9)
            .map(|i| record(now - 9_000 + i * 100, EndpointCategory::Default, AttemptOutcome::Allowed))
            .collect();

        assert_eq!(analyze(&recent, EndpointCategory::Default, now), None);
    }

    #[test]
    fn rapid_fire_counts_denied_attempts_too() {
        let now = 100_000;
        let recent: Vec<_> = (0..10)
            .map(|i| record(now - 9_000 + i * 100, EndpointCategory::Default, AttemptOutcome::Blocked))
            .collect();

        assert_eq!(
            analyze(&recent, EndpointCategory::Default, now),
            Some(SuspicionKind::RapidFire)
        );
    }

    #[test]
    fn address_explorer_has_stricter_volume_cap() {
        let now = 400_000;
        // 20 spread-out prior address lookups; the 21st trips the rule.
        let recent: Vec<_> = (0..20)
            .map(|i| {
                record(
                    now - 250_000 + i * 12_000,
                    EndpointCategory::AddressExplorer,
                    AttemptOutcome::Allowed,
                )
            })
            .collect();

        assert_eq!(
            analyze(&recent, EndpointCategory::AddressExplorer, now),
            Some(SuspicionKind::AddressScraping)
        );
        // Same volume against a different category passes.
        assert_eq!(analyze(&recent, EndpointCategory::FeeCalculator, now), None);
    }

    #[test]
    fn scanning_needs_both_breadth_and_volume() {
        let now = 400_000;
        let categories = [
            EndpointCategory::TransactionLookup,
            EndpointCategory::FeeCalculator,
            EndpointCategory::NetworkStatus,
            EndpointCategory::DocumentTimestamp,
        ];
        // 32 spread-out attempts across 4 categories: breadth > 3 and volume > 30.
        let recent: Vec<_> = (0..32)
            .map(|i| {
                record(
                    now - 300_000 + i as u64 * 9_000,
                    categories[i % categories.len()],
                    AttemptOutcome::Allowed,
                )
            })
            .collect();
        assert_eq!(
            analyze(&recent, EndpointCategory::TransactionLookup, now),
            Some(SuspicionKind::EndpointScanning)
        );

        // Same volume on a single category: no breadth, no flag.
        let narrow: Vec<_> = (0..32)
            .map(|i| {
                record(
                    now - 300_000 + i * 9_000,
                    EndpointCategory::TransactionLookup,
                    AttemptOutcome::Allowed,
                )
            })
            .collect();
        assert_eq!(analyze(&narrow, EndpointCategory::TransactionLookup, now), None);
    }

    #[test]
    fn six_blocked_attempts_flag_repeated_violations() {
        let now = 400_000;
        let recent: Vec<_> = (0..6)
            .map(|i| {
                record(
                    now - 200_000 + i * 20_000,
                    EndpointCategory::Default,
                    AttemptOutcome::Blocked,
                )
            })
            .collect();

        assert_eq!(
            analyze(&recent, EndpointCategory::Default, now),
            Some(SuspicionKind::RepeatedViolations)
        );
    }

    #[test]
    fn attempts_outside_analysis_window_are_ignored() {
        let now = 10_000_000;
        let recent: Vec<_> = (0..40)
            .map(|i| record(i * 100, EndpointCategory::Default, AttemptOutcome::Blocked))
            .collect();

        assert_eq!(analyze(&recent, EndpointCategory::Default, now), None);
    }
}
