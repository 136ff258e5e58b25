//! Contract for kind-specific run bodies, injected into `AgentRuntime`.

use async_trait::async_trait;
use serde_json::Value;

use super::store::AgentRuntime;
use crate::error::CoreResult;
use crate::ids::RunId;

#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn run(&self, runtime: &AgentRuntime, run_id: RunId, options: Value) -> CoreResult<Value>;
}
