use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreResult;
use crate::planner::Step;

/// Dispatches a single plan step to whatever concrete agent handles its
/// `agent_kind`. Implementations throw (return `Err`) on failure; the
/// orchestrator applies the retry/backoff/criticality policy around
/// this call, so implementations should not retry internally.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &Step) -> CoreResult<Value>;
}
