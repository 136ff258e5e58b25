//! `HybridSearch`: fuses `KnowledgeStore` content search with
//! `VectorStore` semantic search via Reciprocal Rank Fusion, then
//! dedups near-duplicate bodies (spec §4.3).

use std::collections::HashMap;

use tracing::debug;

use super::similarity::jaccard_tokens;
use super::store::VectorStore;
use super::types::{VectorSearchOptions, VectorSearchResult};
use crate::error::CoreResult;
use crate::knowledge::{KnowledgeItem, KnowledgeStore};

const DEFAULT_RRF_K: f32 = 60.0;
const DEFAULT_DEDUP_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
    pub knowledge_weight: f32,
    pub vector_weight: f32,
    pub limit: usize,
    pub rrf_k: f32,
    pub dedup_threshold: f32,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            knowledge_weight: 0.5,
            vector_weight: 0.5,
            limit: 10,
            rrf_k: DEFAULT_RRF_K,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FusedSource {
    Knowledge(KnowledgeItem),
    Vector(VectorSearchResult),
}

impl FusedSource {
    fn body(&self) -> &str {
        match self {
            FusedSource::Knowledge(item) => &item.body,
            FusedSource::Vector(result) => &result.entry.content,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FusedSource::Knowledge(_) => "knowledge",
            FusedSource::Vector(_) => "vector",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FusedResult {
    pub source: FusedSource,
    pub score: f32,
    pub merged_sources: Vec<&'static str>,
}

pub struct HybridSearch<'a> {
    knowledge: &'a KnowledgeStore,
    vector: &'a VectorStore,
}

impl<'a> HybridSearch<'a> {
    pub fn new(knowledge: &'a KnowledgeStore, vector: &'a VectorStore) -> Self {
        Self { knowledge, vector }
    }

    pub async fn search(&self, query: &str, opts: HybridSearchOptions) -> CoreResult<Vec<FusedResult>> {
        let (knowledge_hits, vector_hits) = tokio::join!(
            self.knowledge.search_by_content(query),
            self.vector.search(query, VectorSearchOptions::with_limit(opts.limit.max(20))),
        );
        let knowledge_hits = knowledge_hits?;
        let vector_hits = vector_hits?;

        let total_weight = opts.knowledge_weight + opts.vector_weight;
        let (kw, vw) = if total_weight > 0.0 {
            (opts.knowledge_weight / total_weight, opts.vector_weight / total_weight)
        } else {
            (0.5, 0.5)
        };

        // key each candidate by a stable identity: knowledge slug or vector id.
        let mut fused: HashMap<String, FusedResult> = HashMap::new();

        for (rank, item) in knowledge_hits.into_iter().enumerate() {
            let key = format!("knowledge:{}/{}", item.0.category.as_str(), item.0.slug);
            let contribution = rrf_contribution(kw, rank + 1, opts.rrf_k);
            fused
                .entry(key)
                .and_modify(|f| f.score += contribution)
                .or_insert(FusedResult {
                    source: FusedSource::Knowledge(item.0),
                    score: contribution,
                    merged_sources: vec!["knowledge"],
                });
        }

        for (rank, hit) in vector_hits.into_iter().enumerate() {
            let key = format!("vector:{}", hit.entry.id);
            let contribution = rrf_contribution(vw, rank + 1, opts.rrf_k);
            fused
                .entry(key)
                .and_modify(|f| f.score += contribution)
                .or_insert(FusedResult {
                    source: FusedSource::Vector(hit),
                    score: contribution,
                    merged_sources: vec!["vector"],
                });
        }

        let mut results: Vec<FusedResult> = fused.into_values().collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let deduped = dedup_by_jaccard(results, opts.dedup_threshold);
        debug!(query, results = deduped.len(), "hybrid search complete");

        let mut final_results = deduped;
        final_results.truncate(opts.limit);
        Ok(final_results)
    }
}

/// A single source's RRF contribution for a 1-indexed rank: `weight / (k + rank)`.
fn rrf_contribution(weight: f32, rank_1indexed: usize, rrf_k: f32) -> f32 {
    weight / (rrf_k + rank_1indexed as f32)
}

/// Merge near-duplicate results (Jaccard similarity over body tokens
/// above `threshold`), keeping the higher-scored one and recording
/// both source labels.
fn dedup_by_jaccard(results: Vec<FusedResult>, threshold: f32) -> Vec<FusedResult> {
    let mut kept: Vec<FusedResult> = Vec::new();
    'outer: for candidate in results {
        for existing in kept.iter_mut() {
            if jaccard_tokens(existing.source.body(), candidate.source.body()) >= threshold {
                let label = candidate.source.label();
                if !existing.merged_sources.contains(&label) {
                    existing.merged_sources.push(label);
                }
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::EmbeddingProvider;
    use crate::knowledge::{KnowledgeCategory, KnowledgeSource};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn fuses_and_ranks_across_both_stores() {
        let dir = tempdir().unwrap();
        let knowledge = KnowledgeStore::new(dir.path());
        knowledge
            .write_auto(KnowledgeItem::new(
                KnowledgeCategory::Patterns,
                "retry-pattern",
                KnowledgeSource::Auto,
                "retry backoff",
                "retry body text",
            ))
            .await
            .unwrap();

        let vector = VectorStore::new(Arc::new(FakeEmbedder));
        vector
            .add(crate::vector::VectorEntry::new(
                "docs",
                vec![1.0, 0.0],
                "unrelated vector content",
            ))
            .await
            .unwrap();

        let search = HybridSearch::new(&knowledge, &vector);
        let results = search
            .search("retry", HybridSearchOptions::default())
            .await
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn dedup_merges_near_identical_bodies() {
        let a = FusedResult {
            source: FusedSource::Vector(VectorSearchResult {
                entry: crate::vector::VectorEntry::new("c", vec![], "the quick brown fox jumps"),
                similarity: 0.9,
                distance: 0.1,
            }),
            score: 0.5,
            merged_sources: vec!["vector"],
        };
        let b = FusedResult {
            source: FusedSource::Vector(VectorSearchResult {
                entry: crate::vector::VectorEntry::new("c", vec![], "the quick brown fox jumps today"),
                similarity: 0.8,
                distance: 0.2,
            }),
            score: 0.3,
            merged_sources: vec!["vector"],
        };
        let deduped = dedup_by_jaccard(vec![a, b], 0.5);
        assert_eq!(deduped.len(), 1);
    }

    /// Scenario 6 / I9: Knowledge ranks [A, B, C], Vector ranks [B, D, A],
    /// equal weights, rrfK=60. Fused order must be B, A, D, C (each
    /// document's total RRF score sums its per-source contributions,
    /// `weight / (k + rank)`, and a document absent from a source simply
    /// contributes nothing from it).
    #[test]
    fn rrf_rank_monotonicity_scenario_six_i9() {
        let k = DEFAULT_RRF_K;
        let w = 0.5;

        let score_a = rrf_contribution(w, 1, k) + rrf_contribution(w, 3, k);
        let score_b = rrf_contribution(w, 2, k) + rrf_contribution(w, 1, k);
        let score_c = rrf_contribution(w, 3, k);
        let score_d = rrf_contribution(w, 2, k);

        assert!(score_b > score_a, "B should rank first: {score_b} vs {score_a}");
        assert!(score_a > score_d, "A should outrank D: {score_a} vs {score_d}");
        assert!(score_d > score_c, "D should outrank C: {score_d} vs {score_c}");

        // I9: improving a document's rank in one source, all else equal,
        // must not worsen its fused score. Move C from knowledge-rank 3 to
        // knowledge-rank 1 (vector absent throughout) and check it only rises.
        let score_c_improved = rrf_contribution(w, 1, k);
        assert!(score_c_improved > score_c);
    }
}
