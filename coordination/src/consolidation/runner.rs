//! The background consolidation loop (spec §4.10): periodically scans
//! eligible sessions, extracts pattern candidates, aggregates them
//! across sessions, and promotes recurring ones into the knowledge and
//! vector stores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::extract::extract_candidates;
use super::types::{AggregatedCandidate, ConsolidationConfig, ConsolidationReport};
use crate::error::CoreResult;
use crate::knowledge::{KnowledgeItem, KnowledgeSource, KnowledgeStore};
use crate::session_log::{SessionLog, SessionMetadata};
use crate::vector::{VectorEntry, VectorStore};

pub struct ConsolidationLoop {
    config: ConsolidationConfig,
    sessions: Arc<SessionLog>,
    knowledge: Arc<KnowledgeStore>,
    vectors: Arc<VectorStore>,
}

impl ConsolidationLoop {
    pub fn new(
        config: ConsolidationConfig,
        sessions: Arc<SessionLog>,
        knowledge: Arc<KnowledgeStore>,
        vectors: Arc<VectorStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            knowledge,
            vectors,
        }
    }

    /// Runs scans on [`ConsolidationConfig::scan_interval`] until
    /// `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("consolidation loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => info!(
                            scanned = report.sessions_scanned,
                            created = report.items_created,
                            "consolidation pass complete"
                        ),
                        Err(e) => warn!(error = %e, "consolidation pass failed"),
                    }
                }
            }
        }
    }

    /// Executes a single scan-and-promote pass and returns a summary.
    pub async fn run_once(&self) -> CoreResult<ConsolidationReport> {
        let mut report = ConsolidationReport::default();
        let mut aggregated: HashMap<String, AggregatedCandidate> = HashMap::new();

        for metadata in self.sessions.list().await {
            if !self.is_eligible(&metadata) {
                report.sessions_skipped += 1;
                continue;
            }

            let loaded = match self.sessions.load(&metadata.session_id).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(session = %metadata.session_id, error = %e, "failed to load session for consolidation");
                    report.sessions_skipped += 1;
                    continue;
                }
            };
            report.sessions_scanned += 1;

            for candidate in extract_candidates(metadata.session_id.as_str(), &loaded.events) {
                report.candidates_found += 1;
                let agg_key = format!("{}:{}", candidate.category.as_str(), candidate.key);
                aggregated
                    .entry(agg_key)
                    .and_modify(|existing| {
                        existing.occurrences += 1;
                        if !existing.related_sessions.contains(&candidate.session_id) {
                            existing.related_sessions.push(candidate.session_id.clone());
                        }
                    })
                    .or_insert(AggregatedCandidate {
                        key: candidate.key,
                        category: candidate.category,
                        title: candidate.title,
                        body: candidate.body,
                        occurrences: 1,
                        related_sessions: vec![candidate.session_id],
                    });
            }
        }

        for candidate in aggregated.into_values() {
            if candidate.occurrences < self.config.min_occurrences {
                continue;
            }
            self.promote(candidate, &mut report).await?;
        }

        Ok(report)
    }

    fn is_eligible(&self, metadata: &SessionMetadata) -> bool {
        let age = Utc::now().signed_duration_since(metadata.created_at);
        let min_age = chrono::Duration::from_std(self.config.min_age).unwrap_or(chrono::Duration::seconds(0));
        if age < min_age {
            return false;
        }
        // Sessions with no agent runs yet carry no success signal; treat
        // them as eligible rather than silently excluding new sessions.
        if metadata.agent_run_count == 0 {
            return true;
        }
        self.success_rate(metadata) >= self.config.min_success_rate
    }

    /// Approximates success rate from the session's recorded run count
    /// and value score, since the index sidecar does not track a raw
    /// completed/failed tally directly.
    fn success_rate(&self, metadata: &SessionMetadata) -> f64 {
        metadata.value_score.map(|v| v as f64).unwrap_or(1.0)
    }

    async fn promote(&self, candidate: AggregatedCandidate, report: &mut ConsolidationReport) -> CoreResult<()> {
        let slug = slugify(&candidate.title);

        if !self.knowledge.search_by_filename(&slug).await?.is_empty()
            || !self
                .knowledge
                .search_by_filename(&candidate.title)
                .await?
                .is_empty()
        {
            report.items_skipped_existing += 1;
            return Ok(());
        }

        let mut item = KnowledgeItem::new(
            candidate.category,
            slug.clone(),
            KnowledgeSource::Auto,
            candidate.title.clone(),
            candidate.body.clone(),
        );
        item.occurrences = Some(candidate.occurrences);
        item.related_sessions = candidate.related_sessions;

        let written = self.knowledge.write_auto(item).await?;
        if !written {
            report.items_skipped_existing += 1;
            return Ok(());
        }

        let embedding = self.vectors.embed(&candidate.body).await?;
        let mut entry = VectorEntry::new(candidate.category.as_str(), embedding, candidate.body);
        entry.metadata = serde_json::json!({"slug": slug, "category": candidate.category.as_str()});
        entry.consolidated = true;
        self.vectors.add(entry).await?;

        report.items_created += 1;
        Ok(())
    }
}

fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let mut slug = String::with_capacity(lower.len());
    let mut last_was_dash = false;
    for c in lower.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "pattern".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::EmbeddingProvider;
    use crate::error::CoreResult as Result;
    use crate::ids::SessionId;
    use crate::session_log::SessionEvent;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    async fn seed_session(sessions: &SessionLog, input: &str, occurrences: usize) -> SessionId {
        let id = SessionId::new();
        sessions.create(id.clone(), None).await.unwrap();
        for _ in 0..occurrences {
            sessions
                .append(
                    &id,
                    SessionEvent::new(
                        "agent.turn",
                        id.clone(),
                        Some(serde_json::json!({"output": input})),
                    ),
                )
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn promotes_candidate_crossing_min_occurrences() {
        let dir = tempdir().unwrap();
        let sessions = Arc::new(SessionLog::open(dir.path().join("sessions")).await.unwrap());
        let knowledge = Arc::new(KnowledgeStore::new(dir.path().join("knowledge")));
        let vectors = Arc::new(VectorStore::new(Arc::new(FixedEmbedder)));

        seed_session(&sessions, "We chose to use axum for the gateway.", 1).await;
        seed_session(&sessions, "We chose to use axum for the gateway.", 1).await;

        let config = ConsolidationConfig {
            min_age: Duration::from_secs(0),
            min_success_rate: 0.0,
            min_occurrences: 2,
            scan_interval: Duration::from_secs(1),
        };
        let loop_ = ConsolidationLoop::new(config, sessions, knowledge.clone(), vectors);
        let report = loop_.run_once().await.unwrap();

        assert_eq!(report.items_created, 1);
        let items = knowledge.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, KnowledgeSource::Auto);
    }

    #[tokio::test]
    async fn single_occurrence_does_not_promote() {
        let dir = tempdir().unwrap();
        let sessions = Arc::new(SessionLog::open(dir.path().join("sessions")).await.unwrap());
        let knowledge = Arc::new(KnowledgeStore::new(dir.path().join("knowledge")));
        let vectors = Arc::new(VectorStore::new(Arc::new(FixedEmbedder)));

        seed_session(&sessions, "We chose to use axum for the gateway.", 1).await;

        let config = ConsolidationConfig {
            min_age: Duration::from_secs(0),
            min_success_rate: 0.0,
            min_occurrences: 2,
            scan_interval: Duration::from_secs(1),
        };
        let loop_ = ConsolidationLoop::new(config, sessions, knowledge, vectors);
        let report = loop_.run_once().await.unwrap();

        assert_eq!(report.items_created, 0);
        assert!(report.candidates_found >= 1);
    }

    #[tokio::test]
    async fn existing_manual_item_blocks_promotion() {
        let dir = tempdir().unwrap();
        let sessions = Arc::new(SessionLog::open(dir.path().join("sessions")).await.unwrap());
        let knowledge = Arc::new(KnowledgeStore::new(dir.path().join("knowledge")));
        let vectors = Arc::new(VectorStore::new(Arc::new(FixedEmbedder)));

        seed_session(&sessions, "We chose to use axum for the gateway.", 1).await;
        seed_session(&sessions, "We chose to use axum for the gateway.", 1).await;

        knowledge
            .write_manual(KnowledgeItem::new(
                crate::knowledge::KnowledgeCategory::Decisions,
                "we-chose-to-use-axum-for-the",
                KnowledgeSource::Manual,
                "We chose to use axum for the",
                "manual body",
            ))
            .await
            .unwrap();

        let config = ConsolidationConfig {
            min_age: Duration::from_secs(0),
            min_success_rate: 0.0,
            min_occurrences: 2,
            scan_interval: Duration::from_secs(1),
        };
        let loop_ = ConsolidationLoop::new(config, sessions, knowledge.clone(), vectors);
        let report = loop_.run_once().await.unwrap();

        assert_eq!(report.items_created, 0);
        let items = knowledge.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, KnowledgeSource::Manual);
    }
}
