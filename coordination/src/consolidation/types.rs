//! Types for the background consolidation loop (spec §4.10).

use std::time::Duration;

use crate::knowledge::KnowledgeCategory;

/// Tunables gating which sessions are scanned and which candidates
/// graduate to a knowledge item.
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Minimum session age before it is eligible for scanning.
    pub min_age: Duration,
    /// Minimum observed success rate (completed / (completed + failed)
    /// task events) for a session to be scanned.
    pub min_success_rate: f64,
    /// Minimum number of sessions a candidate must appear in before it
    /// is promoted to a knowledge item.
    pub min_occurrences: u32,
    /// Wall-clock spacing between scans in [`ConsolidationLoop::run`].
    pub scan_interval: Duration,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_age: Duration::from_secs(3600),
            min_success_rate: 0.5,
            min_occurrences: 2,
            scan_interval: Duration::from_secs(900),
        }
    }
}

/// A candidate pattern extracted from a single session's events, prior
/// to cross-session aggregation.
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    /// Normalized dedup key (lowercased, whitespace-collapsed digest of
    /// the candidate text).
    pub key: String,
    pub category: KnowledgeCategory,
    pub title: String,
    pub body: String,
    pub session_id: String,
}

/// One candidate aggregated across every session it was seen in.
#[derive(Debug, Clone)]
pub struct AggregatedCandidate {
    pub key: String,
    pub category: KnowledgeCategory,
    pub title: String,
    pub body: String,
    pub occurrences: u32,
    pub related_sessions: Vec<String>,
}

/// Summary of one consolidation pass, returned for logging/CLI display.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub sessions_scanned: usize,
    pub sessions_skipped: usize,
    pub candidates_found: usize,
    pub items_created: usize,
    pub items_skipped_existing: usize,
}
