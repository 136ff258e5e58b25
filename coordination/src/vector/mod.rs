//! Vector memory tier: embeddings store plus hybrid retrieval fusing it
//! with the knowledge store (spec §4.3).

mod hybrid;
#[cfg(feature = "persistence")]
mod persistence;
mod similarity;
mod store;
mod types;

pub use hybrid::{FusedResult, FusedSource, HybridSearch, HybridSearchOptions};
pub use similarity::{cosine, jaccard_tokens};
pub use store::VectorStore;
pub use types::{
    MetadataFilter, VectorCleanupOptions, VectorEntry, VectorSearchOptions, VectorSearchResult,
};
