//! Pure decision functions for step retry/criticality classification
//! (spec §4.8). Grounded on `escalation/engine.rs`'s deterministic,
//! no-LLM decision functions (`decide_at_worker`/`decide_at_council`),
//! generalized from tier-escalation triggers to the spec's
//! error-signal retry table and critical-step predicate.

const CRITICAL_KEYWORDS: &[&str] = &["init", "setup", "bootstrap", "configure", "install"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Base,
    DoubleBase,
    QuintupleBase,
}

impl BackoffKind {
    pub fn multiplier(self) -> u64 {
        match self {
            BackoffKind::Base => 1,
            BackoffKind::DoubleBase => 2,
            BackoffKind::QuintupleBase => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retryable: bool,
    pub backoff: BackoffKind,
}

/// Classifies an error message per the spec's case-insensitive
/// substring table.
pub fn classify_error(message: &str) -> RetryDecision {
    let lower = message.to_lowercase();

    if lower.contains("unauthorized") || lower.contains("authentication") {
        return RetryDecision {
            retryable: false,
            backoff: BackoffKind::Base,
        };
    }
    if lower.contains("syntax error") || lower.contains("compile error") {
        return RetryDecision {
            retryable: false,
            backoff: BackoffKind::Base,
        };
    }
    if lower.contains("rate limit") || lower.contains("too many requests") {
        return RetryDecision {
            retryable: true,
            backoff: BackoffKind::QuintupleBase,
        };
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return RetryDecision {
            retryable: true,
            backoff: BackoffKind::DoubleBase,
        };
    }
    if lower.contains("network") || lower.contains("connection refused") || lower.contains("fetch") {
        return RetryDecision {
            retryable: true,
            backoff: BackoffKind::Base,
        };
    }

    RetryDecision {
        retryable: true,
        backoff: BackoffKind::Base,
    }
}

/// A step is critical if it is the first step in the plan, or its
/// description mentions one of the bootstrap-family keywords.
pub fn is_critical_step(index: usize, description: &str) -> bool {
    if index == 0 {
        return true;
    }
    let lower = description.to_lowercase();
    CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_not_retryable() {
        let d = classify_error("401 Unauthorized: bad token");
        assert!(!d.retryable);
    }

    #[test]
    fn syntax_error_is_not_retryable() {
        let d = classify_error("Syntax error on line 4");
        assert!(!d.retryable);
    }

    #[test]
    fn rate_limit_backs_off_five_times_base() {
        let d = classify_error("429 Too Many Requests");
        assert!(d.retryable);
        assert_eq!(d.backoff, BackoffKind::QuintupleBase);
    }

    #[test]
    fn timeout_backs_off_double_base() {
        let d = classify_error("operation timed out after 30s");
        assert!(d.retryable);
        assert_eq!(d.backoff, BackoffKind::DoubleBase);
    }

    #[test]
    fn network_errors_retry_at_base_backoff() {
        let d = classify_error("connection refused by peer");
        assert!(d.retryable);
        assert_eq!(d.backoff, BackoffKind::Base);
    }

    #[test]
    fn unknown_error_defaults_to_retryable_base() {
        let d = classify_error("something unexpected happened");
        assert!(d.retryable);
        assert_eq!(d.backoff, BackoffKind::Base);
    }

    #[test]
    fn first_step_is_always_critical() {
        assert!(is_critical_step(0, "write the README"));
    }

    #[test]
    fn bootstrap_keyword_marks_later_step_critical() {
        assert!(is_critical_step(2, "Configure the database connection pool"));
    }

    #[test]
    fn ordinary_later_step_is_not_critical() {
        assert!(!is_critical_step(2, "write unit tests for the handler"));
    }
}
