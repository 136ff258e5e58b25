//! The Planner itself (spec §4.7 steps a–g): turns a requirement string
//! into a validated, history-informed [`Plan`], and persists the plan
//! as a vector entry in the `plans` collection so future runs can learn
//! from it — mirroring how `router/task_classifier.rs`'s
//! `PerformanceHistory` informs routing from past records, but through
//! `HybridSearch` rather than an in-process history struct.

use std::sync::Arc;

use tracing::info;

use super::rules::{duration_range_minutes, estimate_complexity, identify_capabilities, select_mode};
use super::skeleton::expand_step_skeleton;
use super::types::Plan;
use super::validate::validate_plan;
use crate::error::CoreResult;
use crate::ids::{PlanId, TaskId};
use crate::knowledge::{KnowledgeCategory, KnowledgeStore};
use crate::vector::{FusedSource, HybridSearch, HybridSearchOptions, VectorEntry, VectorStore};

const PLANS_COLLECTION: &str = "plans";

pub struct Planner {
    knowledge: Arc<KnowledgeStore>,
    vector: Arc<VectorStore>,
}

impl Planner {
    pub fn new(knowledge: Arc<KnowledgeStore>, vector: Arc<VectorStore>) -> Self {
        Self { knowledge, vector }
    }

    /// Builds and validates a plan for `requirement`, folding in risks
    /// and history from `HybridSearch`, then persists it to the `plans`
    /// vector collection.
    pub async fn plan(&self, task_id: TaskId, requirement: &str) -> CoreResult<Plan> {
        let complexity = estimate_complexity(requirement);
        let capabilities = identify_capabilities(requirement);
        let duration = duration_range_minutes(complexity);
        let mode = select_mode(complexity, &capabilities);
        let steps = expand_step_skeleton(mode, &capabilities);

        let mut analysis = format!(
            "complexity={complexity:?}, mode={mode:?}, capabilities=[{}]",
            capabilities
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut risks = Vec::new();

        let hybrid = HybridSearch::new(&self.knowledge, &self.vector);
        let history = hybrid
            .search(requirement, HybridSearchOptions::default())
            .await?;
        for hit in &history {
            match &hit.source {
                FusedSource::Knowledge(item) if item.category == KnowledgeCategory::Pits => {
                    risks.push(format!("known pitfall: {}", item.title));
                }
                FusedSource::Knowledge(item) => {
                    analysis.push_str(&format!("; informed by {}/{}", item.category.as_str(), item.slug));
                }
                FusedSource::Vector(result) if result.entry.collection == PLANS_COLLECTION => {
                    analysis.push_str(&format!("; similar past plan {}", result.entry.id));
                }
                FusedSource::Vector(_) => {}
            }
        }

        let plan = Plan {
            id: PlanId::new(),
            task_id,
            analysis,
            steps,
            risks,
            complexity,
            capabilities: capabilities.into_iter().collect(),
            mode,
            estimated_duration_minutes: duration,
        };

        validate_plan(&plan)?;
        self.persist(&plan).await?;
        Ok(plan)
    }

    async fn persist(&self, plan: &Plan) -> CoreResult<()> {
        let content = serde_json::to_string(plan)?;
        let embedding = self.vector.embed(&content).await?;
        let mut entry = VectorEntry::new(PLANS_COLLECTION, embedding, content);
        entry.metadata = serde_json::json!({ "planId": plan.id, "taskId": plan.task_id });
        self.vector.add(entry).await?;
        info!(plan_id = %plan.id, mode = ?plan.mode, "plan persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::EmbeddingProvider;
    use async_trait::async_trait;
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
    async fn plan_is_valid_and_persisted_as_vector_entry() {
        let dir = tempdir().unwrap();
        let knowledge = Arc::new(KnowledgeStore::new(dir.path()));
        let vector = Arc::new(VectorStore::new(Arc::new(FakeEmbedder)));
        let planner = Planner::new(knowledge, vector.clone());

        let plan = planner
            .plan(TaskId::new(), "add a login page with an auth api and a database migration")
            .await
            .unwrap();

        assert!(!plan.steps.is_empty());
        assert!(validate_plan(&plan).is_ok());

        let stored = vector
            .search(
                "login page auth api database migration",
                crate::vector::VectorSearchOptions {
                    collection: Some(PLANS_COLLECTION.to_string()),
                    limit: 5,
                    min_score: None,
                    filter: None,
                },
            )
            .await
            .unwrap();
        assert!(!stored.is_empty());
    }

    #[tokio::test]
    async fn simple_request_selects_mode_a() {
        let dir = tempdir().unwrap();
        let knowledge = Arc::new(KnowledgeStore::new(dir.path()));
        let vector = Arc::new(VectorStore::new(Arc::new(FakeEmbedder)));
        let planner = Planner::new(knowledge, vector);

        let plan = planner
            .plan(TaskId::new(), "rename a css class")
            .await
            .unwrap();
        assert_eq!(plan.mode, super::super::types::ExecutionMode::A);
    }
}
