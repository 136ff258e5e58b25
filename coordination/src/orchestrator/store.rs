//! The Orchestrator (spec §4.8): consumes a [`Plan`], executes steps in
//! plan order respecting dependencies, applies the retry/backoff and
//! critical-step policy from [`retry`], and returns an aggregated
//! result. Grounded on `escalation/engine.rs`'s `decide` shape — a
//! single deterministic function walking a report to a decision — here
//! adapted into a step-by-step execution loop.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use super::executor::StepExecutor;
use super::retry::{classify_error, is_critical_step};
use super::types::{OrchestratorConfig, OrchestratorResult, StepResult, StepStatus};
use crate::error::CoreResult;
use crate::ids::StepId;
use crate::planner::Plan;

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, plan: &Plan, executor: &dyn StepExecutor) -> CoreResult<OrchestratorResult> {
        self.run_with_progress(plan, executor, None).await
    }

    /// Same as [`Self::run`], additionally pushing each step's result
    /// onto `progress` as it completes — the gateway uses this to
    /// stream `progress` events to the requesting client (spec §4.9)
    /// without the orchestrator itself knowing anything about
    /// WebSockets.
    pub async fn run_with_progress(
        &self,
        plan: &Plan,
        executor: &dyn StepExecutor,
        progress: Option<&tokio::sync::mpsc::UnboundedSender<StepResult>>,
    ) -> CoreResult<OrchestratorResult> {
        let started = std::time::Instant::now();
        let mut completed: HashSet<StepId> = HashSet::new();
        let mut step_results = Vec::with_capacity(plan.steps.len());
        let mut aggregated_output = Vec::new();
        let mut artifacts = Vec::new();
        let mut errors = Vec::new();
        let mut aborted = false;

        let push_result = |step_results: &mut Vec<StepResult>, result: StepResult| {
            if let Some(tx) = progress {
                let _ = tx.send(result.clone());
            }
            step_results.push(result);
        };

        for (index, step) in plan.steps.iter().enumerate() {
            if aborted {
                push_result(
                    &mut step_results,
                    StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Skipped,
                        attempts: 0,
                        output: None,
                        error: None,
                        duration_ms: 0,
                    },
                );
                continue;
            }

            let deps_ready = step.dependencies.iter().all(|dep| completed.contains(dep));
            if !deps_ready {
                push_result(
                    &mut step_results,
                    StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Skipped,
                        attempts: 0,
                        output: None,
                        error: None,
                        duration_ms: 0,
                    },
                );
                continue;
            }

            let step_started = std::time::Instant::now();
            let outcome = self.execute_with_retry(executor, step).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok((output, attempts)) => {
                    collect_artifacts(&output, &mut artifacts);
                    aggregated_output.push(output.clone());
                    completed.insert(step.id.clone());
                    push_result(
                        &mut step_results,
                        StepResult {
                            step_id: step.id.clone(),
                            status: StepStatus::Completed,
                            attempts,
                            output: Some(output),
                            error: None,
                            duration_ms,
                        },
                    );
                }
                Err((message, attempts)) => {
                    errors.push(message.clone());
                    push_result(
                        &mut step_results,
                        StepResult {
                            step_id: step.id.clone(),
                            status: StepStatus::Failed,
                            attempts,
                            output: None,
                            error: Some(message),
                            duration_ms,
                        },
                    );
                    if is_critical_step(index, &step.description) {
                        warn!(step = %step.id, "critical step failed, aborting plan");
                        aborted = true;
                    }
                }
            }
        }

        let completed_steps = step_results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count();
        let success = !aborted && errors.is_empty();

        Ok(OrchestratorResult {
            success,
            completed_steps,
            total_steps: plan.steps.len(),
            step_results,
            aggregated_output,
            artifacts,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Executes one step with the retry/backoff policy, applying the
    /// per-step timeout on each attempt. Returns `Ok((output, attempts))`
    /// or `Err((message, attempts))` once retries are exhausted or the
    /// error is non-retryable.
    async fn execute_with_retry(
        &self,
        executor: &dyn StepExecutor,
        step: &crate::planner::Step,
    ) -> Result<(Value, u32), (String, u32)> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let timeout = Duration::from_millis(self.config.step_timeout_ms);
            let result = tokio::time::timeout(timeout, executor.execute(step)).await;

            let message = match result {
                Ok(Ok(value)) => return Ok((value, attempts)),
                Ok(Err(err)) => err.to_string(),
                Err(_) => "timeout: step exceeded the configured timeout".to_string(),
            };

            let decision = classify_error(&message);
            if !decision.retryable || attempts > self.config.max_retries {
                return Err((message, attempts));
            }

            let backoff = self.config.base_backoff_ms * decision.backoff.multiplier();
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

/// Extracts an `artifacts` array from a step's JSON output, if present.
fn collect_artifacts(output: &Value, artifacts: &mut Vec<String>) {
    if let Some(items) = output.get("artifacts").and_then(|v| v.as_array()) {
        for item in items {
            if let Some(s) = item.as_str() {
                artifacts.push(s.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::planner::Step;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedExecutor {
        calls: Mutex<std::collections::HashMap<String, u32>>,
        scripts: std::collections::HashMap<String, Vec<Result<Value, String>>>,
    }

    impl ScriptedExecutor {
        fn new(scripts: std::collections::HashMap<String, Vec<Result<Value, String>>>) -> Self {
            Self {
                calls: Mutex::new(std::collections::HashMap::new()),
                scripts,
            }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, step: &Step) -> CoreResult<Value> {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(step.id.to_string()).or_insert(0);
            let script = self
                .scripts
                .get(step.id.as_str())
                .expect("step has a script");
            let attempt = *count as usize;
            *count += 1;
            match &script[attempt.min(script.len() - 1)] {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(CoreError::Internal(message.clone())),
            }
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: 2,
            base_backoff_ms: 1,
            step_timeout_ms: 1000,
        }
    }

    fn plan_with_steps(steps: Vec<Step>) -> Plan {
        Plan {
            id: crate::ids::PlanId::new(),
            task_id: crate::ids::TaskId::new(),
            analysis: String::new(),
            steps,
            risks: Vec::new(),
            complexity: crate::planner::Complexity::Simple,
            capabilities: vec![crate::planner::Capability::General],
            mode: crate::planner::ExecutionMode::A,
            estimated_duration_minutes: (5, 20),
        }
    }

    #[tokio::test]
    async fn dependent_step_is_skipped_when_dependency_fails() {
        let a = Step::new("writer", "write");
        let b = Step::new("tester", "test").depends_on(&a);

        let mut scripts = std::collections::HashMap::new();
        scripts.insert(a.id.to_string(), vec![Err("syntax error".to_string())]);
        scripts.insert(b.id.to_string(), vec![Ok(Value::Null)]);

        let plan = plan_with_steps(vec![a, b]);
        let orchestrator = Orchestrator::new(config());
        let result = orchestrator
            .run(&plan, &ScriptedExecutor::new(scripts))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.step_results[0].status, StepStatus::Failed);
        assert_eq!(result.step_results[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn retryable_error_succeeds_on_second_attempt() {
        let a = Step::new("writer", "write");
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(
            a.id.to_string(),
            vec![Err("connection refused".to_string()), Ok(Value::Null)],
        );

        let plan = plan_with_steps(vec![a]);
        let orchestrator = Orchestrator::new(config());
        let result = orchestrator
            .run(&plan, &ScriptedExecutor::new(scripts))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.step_results[0].attempts, 2);
    }

    #[tokio::test]
    async fn non_critical_step_failure_does_not_abort_plan() {
        let a = Step::new("writer", "write");
        let b = Step::new("reviewer", "review something unrelated");
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(a.id.to_string(), vec![Ok(Value::Null)]);
        scripts.insert(b.id.to_string(), vec![Err("unauthorized".to_string())]);

        let plan = plan_with_steps(vec![a, b]);
        let orchestrator = Orchestrator::new(config());
        let result = orchestrator
            .run(&plan, &ScriptedExecutor::new(scripts))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.completed_steps, 1);
        assert_eq!(result.step_results[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn artifacts_are_collected_from_step_output() {
        let a = Step::new("writer", "write");
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(
            a.id.to_string(),
            vec![Ok(serde_json::json!({"artifacts": ["src/main.rs"]}))],
        );

        let plan = plan_with_steps(vec![a]);
        let orchestrator = Orchestrator::new(config());
        let result = orchestrator
            .run(&plan, &ScriptedExecutor::new(scripts))
            .await
            .unwrap();

        assert_eq!(result.artifacts, vec!["src/main.rs".to_string()]);
    }
}
