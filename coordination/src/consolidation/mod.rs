//! Background consolidation loop: cross-session pattern extraction into
//! the knowledge and vector stores (spec §4.10).

mod extract;
mod runner;
mod types;

pub use runner::ConsolidationLoop;
pub use types::{AggregatedCandidate, ConsolidationConfig, ConsolidationReport, PatternCandidate};
