//! Glob pattern checks over caller-supplied payload metadata.
//!
//! Patterns apply to the string fields of a JSON object payload. Anything
//! malformed is ignored rather than rejected: a missing payload, a
//! non-object payload, or an invalid pattern simply does not participate in
//! the check. The limiter is a defensive layer and must not fail legitimate
//! requests over metadata it cannot read.

use glob::Pattern;
use serde_json::Value;

/// Collect the string values a pattern can match against.
fn payload_strings(payload: &Value) -> Option<Vec<&str>> {
    let object = payload.as_object()?;
    Some(
        object
            .values()
            .filter_map(|v| v.as_str())
            .collect(),
    )
}

fn any_match(patterns: &[String], candidates: &[&str]) -> bool {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|pattern| candidates.iter().any(|s| pattern.matches(s)))
}

/// Result of evaluating a category's allow/deny patterns against a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternVerdict {
    Pass,
    /// A deny pattern matched, or an allow-list was configured and nothing
    /// matched it.
    Reject,
}

pub fn evaluate(
    allow_patterns: Option<&[String]>,
    deny_patterns: Option<&[String]>,
    payload: Option<&Value>,
) -> PatternVerdict {
    let Some(payload) = payload else {
        return PatternVerdict::Pass;
    };
    let Some(candidates) = payload_strings(payload) else {
        return PatternVerdict::Pass;
    };

    if let Some(deny) = deny_patterns {
        if any_match(deny, &candidates) {
            return PatternVerdict::Reject;
        }
    }

    if let Some(allow) = allow_patterns {
        if !allow.is_empty() && !any_match(allow, &candidates) {
            return PatternVerdict::Reject;
        }
    }

    PatternVerdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_payload_skips_checks() {
        let deny = patterns(&["*"]);
        assert_eq!(evaluate(None, Some(&deny), None), PatternVerdict::Pass);
    }

    #[test]
    fn non_object_payload_is_ignored() {
        let deny = patterns(&["*"]);
        let payload = json!("just a string");
        assert_eq!(
            evaluate(None, Some(&deny), Some(&payload)),
            PatternVerdict::Pass
        );
    }

    #[test]
    fn deny_pattern_rejects_matching_field() {
        let deny = patterns(&["bc1q*"]);
        let payload = json!({ "address": "bc1qxyz123" });
        assert_eq!(
            evaluate(None, Some(&deny), Some(&payload)),
            PatternVerdict::Reject
        );

        let clean = json!({ "address": "1BitcoinEaterAddress" });
        assert_eq!(
            evaluate(None, Some(&deny), Some(&clean)),
            PatternVerdict::Pass
        );
    }

    #[test]
    fn allow_list_requires_a_match() {
        let allow = patterns(&["txid-*"]);
        let good = json!({ "ref": "txid-abc" });
        let bad = json!({ "ref": "something-else" });
        assert_eq!(
            evaluate(Some(&allow), None, Some(&good)),
            PatternVerdict::Pass
        );
        assert_eq!(
            evaluate(Some(&allow), None, Some(&bad)),
            PatternVerdict::Reject
        );
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let deny = patterns(&["[unclosed"]);
        let payload = json!({ "field": "[unclosed" });
        assert_eq!(
            evaluate(None, Some(&deny), Some(&payload)),
            PatternVerdict::Pass
        );
    }

    #[test]
    fn deny_wins_over_allow() {
        let allow = patterns(&["*"]);
        let deny = patterns(&["secret-*"]);
        let payload = json!({ "tag": "secret-thing" });
        assert_eq!(
            evaluate(Some(&allow), Some(&deny), Some(&payload)),
            PatternVerdict::Reject
        );
    }
}
