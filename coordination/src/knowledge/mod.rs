//! Curated knowledge substrate: auto/manual markdown files split across
//! pits, patterns, decisions, and solutions (spec §4.2).

mod front_matter;
mod store;
mod types;

pub use front_matter::{FrontMatter, FrontMatterValue};
pub use store::KnowledgeStore;
pub use types::{KnowledgeCategory, KnowledgeItem, KnowledgeSource};
