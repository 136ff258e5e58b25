//! Contract between the lane scheduler and whatever actually runs a
//! task (the agent runtime, in production; a fake in tests).

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::Task;
use crate::error::CoreResult;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, cancel: CancellationToken) -> CoreResult<Value>;
}
