//! Deterministic classification rules — complexity, capability tags,
//! duration estimate and Table-M mode selection. Grounded on the
//! teacher's `router/task_classifier.rs` keyword-family scoring
//! (`estimate_complexity`'s bounded keyword list with a length-based
//! bump, capped at a ceiling) generalized to the spec's four-tier
//! complexity scale and capability-tag vocabulary. Pure functions, no
//! LLM calls, exhaustively unit tested.

use std::collections::BTreeSet;

use super::types::{Capability, Complexity, ExecutionMode};

const COMPLEX_KEYWORDS: &[&str] = &[
    "distributed", "migration", "concurrency", "multi-service", "architecture",
    "real-time", "scalab", "integration", "security", "encrypt",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "api", "endpoint", "refactor", "database", "auth", "test", "deploy", "component",
];

/// Estimates complexity from bounded keyword families plus a
/// length-based bump, mirroring `task_classifier.rs::estimate_complexity`.
pub fn estimate_complexity(requirement: &str) -> Complexity {
    let lower = requirement.to_lowercase();
    let mut score: u8 = 0;

    for keyword in COMPLEX_KEYWORDS {
        if lower.contains(keyword) {
            score = score.saturating_add(2);
        }
    }
    for keyword in MEDIUM_KEYWORDS {
        if lower.contains(keyword) {
            score = score.saturating_add(1);
        }
    }
    if requirement.len() > 400 {
        score = score.saturating_add(2);
    } else if requirement.len() > 150 {
        score = score.saturating_add(1);
    }

    match score {
        0..=1 => Complexity::Simple,
        2..=3 => Complexity::Medium,
        4..=6 => Complexity::Complex,
        _ => Complexity::VeryComplex,
    }
}

const CAPABILITY_KEYWORDS: &[(Capability, &[&str])] = &[
    (
        Capability::Frontend,
        &["frontend", "ui", "react", "component", "css", "page", "button"],
    ),
    (
        Capability::Backend,
        &["backend", "api", "endpoint", "server", "service", "handler"],
    ),
    (
        Capability::Database,
        &["database", "schema", "migration", "sql", "query", "table"],
    ),
    (
        Capability::Auth,
        &["auth", "login", "permission", "token", "session", "oauth"],
    ),
    (
        Capability::Testing,
        &["test", "spec", "coverage", "assert", "e2e"],
    ),
    (
        Capability::Deployment,
        &["deploy", "ci", "cd", "docker", "kubernetes", "release", "pipeline"],
    ),
];

/// Identifies required capability tags from bounded keyword families.
/// Falls back to `General` when nothing more specific matches.
pub fn identify_capabilities(requirement: &str) -> BTreeSet<Capability> {
    let lower = requirement.to_lowercase();
    let mut found = BTreeSet::new();

    for (capability, keywords) in CAPABILITY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            found.insert(*capability);
        }
    }

    if found.is_empty() {
        found.insert(Capability::General);
    }
    found
}

/// Fixed complexity → duration-range (minutes) table.
pub fn duration_range_minutes(complexity: Complexity) -> (u32, u32) {
    match complexity {
        Complexity::Simple => (5, 20),
        Complexity::Medium => (20, 60),
        Complexity::Complex => (60, 180),
        Complexity::VeryComplex => (180, 600),
    }
}

/// Table-M mode selection.
pub fn select_mode(complexity: Complexity, capabilities: &BTreeSet<Capability>) -> ExecutionMode {
    let n = capabilities.len();
    match complexity {
        Complexity::VeryComplex => ExecutionMode::D,
        Complexity::Complex if n >= 3 => ExecutionMode::C,
        Complexity::Complex => ExecutionMode::B,
        Complexity::Medium => ExecutionMode::B,
        Complexity::Simple if n <= 2 => ExecutionMode::A,
        Complexity::Simple => ExecutionMode::B,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_request_is_simple() {
        assert_eq!(estimate_complexity("add a footer link"), Complexity::Simple);
    }

    #[test]
    fn architecture_keywords_push_to_complex_or_above() {
        let c = estimate_complexity(
            "design a distributed migration strategy with real-time integration and security review",
        );
        assert!(matches!(c, Complexity::Complex | Complexity::VeryComplex));
    }

    #[test]
    fn capability_detection_finds_backend_and_database() {
        let caps = identify_capabilities("add a new api endpoint backed by a database migration");
        assert!(caps.contains(&Capability::Backend));
        assert!(caps.contains(&Capability::Database));
    }

    #[test]
    fn capability_detection_falls_back_to_general() {
        let caps = identify_capabilities("say hello");
        assert_eq!(caps, BTreeSet::from([Capability::General]));
    }

    #[test]
    fn mode_a_for_simple_narrow_scope() {
        let caps = BTreeSet::from([Capability::Frontend]);
        assert_eq!(select_mode(Complexity::Simple, &caps), ExecutionMode::A);
    }

    #[test]
    fn mode_c_for_complex_wide_scope() {
        let caps = BTreeSet::from([
            Capability::Frontend,
            Capability::Backend,
            Capability::Database,
        ]);
        assert_eq!(select_mode(Complexity::Complex, &caps), ExecutionMode::C);
    }

    #[test]
    fn mode_d_for_very_complex() {
        let caps = BTreeSet::from([Capability::General]);
        assert_eq!(select_mode(Complexity::VeryComplex, &caps), ExecutionMode::D);
    }

    #[test]
    fn duration_table_is_monotone() {
        let simple = duration_range_minutes(Complexity::Simple);
        let very_complex = duration_range_minutes(Complexity::VeryComplex);
        assert!(simple.1 <= very_complex.0);
    }
}
