//! Cross-component integration tests driving the planner and
//! orchestrator together the way `evoagent execute` does, covering the
//! concrete end-to-end scenarios enumerated for this system: mode-A
//! plan-and-dispatch, retry-on-timeout, and critical-step-abort.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::ids::TaskId;
use coordination::orchestrator::StepStatus;
use coordination::{
    CoreError, CoreResult, EmbeddingProvider, KnowledgeStore, Orchestrator, OrchestratorConfig,
    OrchestratorStepExecutor, Planner, Step, VectorStore,
};
use tempfile::tempdir;

struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        Ok(vec![0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        2
    }
}

fn planner(dir: &std::path::Path) -> Planner {
    let knowledge = Arc::new(KnowledgeStore::new(dir.join("knowledge")));
    let vectors = Arc::new(VectorStore::new(Arc::new(FixedEmbedder)));
    Planner::new(knowledge, vectors)
}

struct ScriptedExecutor {
    outcomes: std::sync::Mutex<std::collections::HashMap<String, Vec<CoreResult<serde_json::Value>>>>,
}

#[async_trait]
impl OrchestratorStepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &Step) -> CoreResult<serde_json::Value> {
        let mut outcomes = self.outcomes.lock().unwrap();
        let queue = outcomes.entry(step.description.clone()).or_default();
        if queue.is_empty() {
            return Ok(serde_json::json!({"success": true}));
        }
        queue.remove(0)
    }
}

#[tokio::test]
async fn plan_and_dispatch_mode_a() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let plan = planner
        .plan(TaskId::new(), "Add a button to the header")
        .await
        .unwrap();

    assert_eq!(plan.mode, coordination::ExecutionMode::A);
    assert_eq!(plan.steps.len(), 1);

    struct AlwaysOk;
    #[async_trait]
    impl OrchestratorStepExecutor for AlwaysOk {
        async fn execute(&self, _step: &Step) -> CoreResult<serde_json::Value> {
            Ok(serde_json::json!({"success": true}))
        }
    }

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    let result = orchestrator.run(&plan, &AlwaysOk).await.unwrap();

    assert!(result.success);
    assert_eq!(result.completed_steps, 1);
    assert_eq!(result.total_steps, 1);
    assert!(!result.aggregated_output.is_empty());
}

#[tokio::test]
async fn retry_on_timeout_succeeds_on_third_attempt() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let mut plan = planner
        .plan(TaskId::new(), "Write a one-off script")
        .await
        .unwrap();
    plan.steps.truncate(1);
    let description = plan.steps[0].description.clone();

    let mut outcomes = std::collections::HashMap::new();
    outcomes.insert(
        description,
        vec![
            Err(CoreError::Timeout("step timed out".to_string())),
            Err(CoreError::Timeout("step timed out".to_string())),
            Ok(serde_json::json!({"success": true})),
        ],
    );
    let executor = ScriptedExecutor { outcomes: std::sync::Mutex::new(outcomes) };

    let config = OrchestratorConfig { max_retries: 3, base_backoff_ms: 1, step_timeout_ms: 30_000 };
    let orchestrator = Orchestrator::new(config);
    let result = orchestrator.run(&plan, &executor).await.unwrap();

    assert!(result.success);
    assert_eq!(result.step_results[0].status, StepStatus::Completed);
    assert_eq!(result.step_results[0].attempts, 3);
}

#[tokio::test]
async fn critical_step_failure_aborts_without_retry() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let mut plan = planner
        .plan(TaskId::new(), "bootstrap project, then add tests, then deploy")
        .await
        .unwrap();
    // The first step in any plan is always critical regardless of its
    // description (`is_critical_step`'s index-0 rule).
    plan.steps[0].description = "bootstrap project".to_string();

    struct AlwaysFails;
    #[async_trait]
    impl OrchestratorStepExecutor for AlwaysFails {
        async fn execute(&self, _step: &Step) -> CoreResult<serde_json::Value> {
            Err(CoreError::Fatal("syntax error".to_string()))
        }
    }

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    let result = orchestrator.run(&plan, &AlwaysFails).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.step_results[0].status, StepStatus::Failed);
    assert_eq!(result.step_results[0].attempts, 1);
    if result.step_results.len() > 1 {
        assert_eq!(result.step_results[1].status, StepStatus::Skipped);
    }
}

#[tokio::test]
async fn cancelled_task_is_idempotent_and_never_restarts() {
    // I7: repeated cancel calls on an already-terminal task are no-ops.
    let lanes = vec![coordination::LaneConfig { kind: "main".into(), max_concurrent: 1, priority: 10 }];
    let queue = coordination::LaneQueue::new(lanes).shared();
    let task = coordination::Task::new("main", 5, vec![], serde_json::json!({}));
    let task_id = queue.enqueue(task).await.unwrap();

    queue.cancel(&task_id).await.unwrap();
    let after_first = queue.get(&task_id).await.unwrap();
    queue.cancel(&task_id).await.unwrap();
    let after_second = queue.get(&task_id).await.unwrap();

    assert_eq!(after_first.state, coordination::TaskState::Cancelled);
    assert_eq!(after_second.state, coordination::TaskState::Cancelled);
    assert_eq!(after_first.completed_at, after_second.completed_at);
}

