//! In-memory `VectorStore`, with an optional RocksDB mirror behind the
//! `persistence` feature (spec §9 open question — resolved: persist
//! vectors too; the `HashMap` remains the source of truth per spec §5).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::similarity::cosine;
use super::types::{VectorCleanupOptions, VectorEntry, VectorSearchOptions, VectorSearchResult};
use crate::collaborators::EmbeddingProvider;
use crate::error::{CoreError, CoreResult};
use crate::ids::VectorId;

#[cfg(feature = "persistence")]
use super::persistence::VectorPersistence;

pub struct VectorStore {
    entries: RwLock<HashMap<VectorId, VectorEntry>>,
    embeddings: Arc<dyn EmbeddingProvider>,
    #[cfg(feature = "persistence")]
    persistence: Option<VectorPersistence>,
}

impl VectorStore {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            embeddings,
            #[cfg(feature = "persistence")]
            persistence: None,
        }
    }

    #[cfg(feature = "persistence")]
    pub fn with_persistence(
        embeddings: Arc<dyn EmbeddingProvider>,
        path: impl Into<std::path::PathBuf>,
    ) -> CoreResult<Self> {
        let persistence = VectorPersistence::open(path)?;
        let loaded = persistence.load_all()?;
        let mut entries = HashMap::with_capacity(loaded.len());
        for entry in loaded {
            entries.insert(entry.id.clone(), entry);
        }
        info!(count = entries.len(), "rehydrated vector store from persistence");
        Ok(Self {
            entries: RwLock::new(entries),
            embeddings,
            persistence: Some(persistence),
        })
    }

    /// Embeds arbitrary text through the configured collaborator, for
    /// callers (the planner, the consolidation loop) that need to build
    /// a [`VectorEntry`] themselves before calling [`Self::add`].
    pub async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embeddings.embed(text).await
    }

    /// Upsert an entry by id.
    pub async fn add(&self, entry: VectorEntry) -> CoreResult<()> {
        #[cfg(feature = "persistence")]
        if let Some(p) = &self.persistence {
            p.put(&entry)?;
        }
        let mut entries = self.entries.write().await;
        debug!(id = %entry.id, collection = %entry.collection, "vector entry upserted");
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Fetch an entry, incrementing its access count.
    pub async fn get(&self, id: &VectorId) -> CoreResult<VectorEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("vector entry {id}")))?;
        entry.access_count += 1;
        let snapshot = entry.clone();
        #[cfg(feature = "persistence")]
        if let Some(p) = &self.persistence {
            p.put(&snapshot)?;
        }
        Ok(snapshot)
    }

    pub async fn mark_consolidated(&self, id: &VectorId) -> CoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("vector entry {id}")))?;
        entry.consolidated = true;
        let snapshot = entry.clone();
        #[cfg(feature = "persistence")]
        if let Some(p) = &self.persistence {
            p.put(&snapshot)?;
        }
        Ok(())
    }

    /// Embed the query (cache-through the embedding collaborator),
    /// compute cosine similarity against candidates, sort descending,
    /// drop below `minScore`, return top `limit`.
    pub async fn search(
        &self,
        query: &str,
        opts: VectorSearchOptions,
    ) -> CoreResult<Vec<VectorSearchResult>> {
        let query_embedding = self.embeddings.embed(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<VectorSearchResult> = entries
            .values()
            .filter(|e| opts.collection.as_deref().is_none_or(|c| c == e.collection))
            .filter(|e| opts.filter.as_ref().is_none_or(|f| f.matches(&e.metadata)))
            .map(|e| {
                let similarity = cosine(&query_embedding, &e.embedding);
                VectorSearchResult {
                    entry: e.clone(),
                    similarity,
                    distance: 1.0 - similarity,
                }
            })
            .filter(|r| opts.min_score.is_none_or(|min| r.similarity >= min))
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        if opts.limit > 0 {
            scored.truncate(opts.limit);
        }
        Ok(scored)
    }

    /// Remove entries that are old, rarely accessed, and not
    /// consolidated.
    pub async fn cleanup(&self, opts: VectorCleanupOptions) -> CoreResult<Vec<VectorId>> {
        let cutoff = opts
            .max_age_ms
            .map(|ms| chrono::Utc::now() - chrono::Duration::milliseconds(ms));

        let mut entries = self.entries.write().await;
        let to_remove: Vec<VectorId> = entries
            .values()
            .filter(|e| !e.consolidated)
            .filter(|e| opts.collection.as_deref().is_none_or(|c| c == e.collection))
            .filter(|e| cutoff.is_none_or(|cut| e.created_at < cut))
            .filter(|e| opts.min_access_count.is_none_or(|min| e.access_count < min))
            .map(|e| e.id.clone())
            .collect();

        for id in &to_remove {
            entries.remove(id);
            #[cfg(feature = "persistence")]
            if let Some(p) = &self.persistence {
                p.delete(id)?;
            }
        }
        info!(count = to_remove.len(), "cleaned up vector entries");
        Ok(to_remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
            // Deterministic embedding: presence of marker words as one-hot dims.
            Ok(vec![
                if text.contains("alpha") { 1.0 } else { 0.0 },
                if text.contains("beta") { 1.0 } else { 0.0 },
            ])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn store() -> VectorStore {
        VectorStore::new(Arc::new(FakeEmbedder))
    }

    #[tokio::test]
    async fn add_then_get_increments_access_count() {
        let store = store();
        let entry = VectorEntry::new("docs", vec![1.0, 0.0], "alpha content");
        let id = entry.id.clone();
        store.add(entry).await.unwrap();

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.access_count, 1);
        let fetched_again = store.get(&id).await.unwrap();
        assert_eq!(fetched_again.access_count, 2);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_respects_limit() {
        let store = store();
        store
            .add(VectorEntry::new("docs", vec![1.0, 0.0], "alpha doc"))
            .await
            .unwrap();
        store
            .add(VectorEntry::new("docs", vec![0.0, 1.0], "beta doc"))
            .await
            .unwrap();

        let results = store
            .search("alpha query", VectorSearchOptions::with_limit(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.content, "alpha doc");
        assert!(results[0].similarity > results.get(1).map(|r| r.similarity).unwrap_or(0.0));
    }

    #[tokio::test]
    async fn cleanup_skips_consolidated_entries() {
        let store = store();
        let mut entry = VectorEntry::new("docs", vec![1.0, 0.0], "alpha doc");
        entry.created_at = chrono::Utc::now() - chrono::Duration::days(365);
        entry.consolidated = true;
        let id = entry.id.clone();
        store.add(entry).await.unwrap();

        let removed = store
            .cleanup(VectorCleanupOptions {
                max_age_ms: Some(1000),
                min_access_count: None,
                collection: None,
            })
            .await
            .unwrap();
        assert!(removed.is_empty());
        assert!(store.get(&id).await.is_ok());
    }
}
