//! Orchestrator result types (spec §4.8).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub status: StepStatus,
    pub attempts: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub success: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub step_results: Vec<StepResult>,
    pub aggregated_output: Vec<Value>,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub step_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 200,
            step_timeout_ms: 30_000,
        }
    }
}
