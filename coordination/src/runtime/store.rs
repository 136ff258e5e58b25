//! Shared lifecycle surface for every agent kind (spec §4.6), grounded
//! on the teacher's `harness/session.rs` guarded-transition methods
//! (`start`/`pause`/`complete`/`fail` each check `self.state.status`
//! before mutating) generalized from harness-specific `SessionState` to
//! the generic [`Run`]/[`Checkpoint`] pair.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use super::executor::RunExecutor;
use super::listener::LifecycleListener;
use super::tools::{Tool, ToolPolicy, ToolRegistry};
use super::types::{Checkpoint, LifecycleEvent, Run, RunState};
use crate::error::{CoreError, CoreResult};
use crate::ids::RunId;

pub struct AgentRuntime {
    runs: RwLock<HashMap<RunId, Run>>,
    checkpoints: RwLock<HashMap<RunId, Checkpoint>>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
    tools: RwLock<ToolRegistry>,
    listener_error_count: AtomicU64,
}

impl AgentRuntime {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            tools: RwLock::new(ToolRegistry::default()),
            listener_error_count: AtomicU64::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_tool_policy(policy: Arc<dyn ToolPolicy>) -> Self {
        Self {
            tools: RwLock::new(ToolRegistry::new(policy)),
            ..Self::new()
        }
    }

    pub fn listener_error_count(&self) -> u64 {
        self.listener_error_count.load(Ordering::Relaxed)
    }

    pub async fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Notifies every listener. A listener that panics is isolated by
    /// running it on its own task: the panic unwinds that task only,
    /// never the emitter, and is counted rather than propagated.
    async fn emit(&self, event: LifecycleEvent) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            let event = event.clone();
            let outcome = tokio::spawn(async move { listener.on_event(&event).await }).await;
            if outcome.is_err() {
                self.listener_error_count.fetch_add(1, Ordering::Relaxed);
                warn!("lifecycle listener panicked handling {:?}", event);
            }
        }
    }

    pub async fn get(&self, run_id: &RunId) -> CoreResult<Run> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))
    }

    /// Lists all known runs, newest first.
    pub async fn list(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Starts a new run of `agent_kind`, driving `executor` to
    /// completion. Emits `start`, then `complete`/`error` depending on
    /// the outcome. Returns the executor's result.
    pub async fn run(
        self: &Arc<Self>,
        agent_kind: impl Into<String>,
        executor: Arc<dyn RunExecutor>,
        options: Value,
    ) -> CoreResult<Value> {
        let run = Run::new(agent_kind);
        let run_id = run.id.clone();
        self.runs.write().await.insert(run_id.clone(), run);
        self.emit(LifecycleEvent::Start {
            run_id: run_id.clone(),
        })
        .await;

        match executor.run(self, run_id.clone(), options).await {
            Ok(result) => {
                self.finish(&run_id, RunState::Completed, None).await?;
                self.emit(LifecycleEvent::Complete {
                    run_id,
                    result: result.clone(),
                })
                .await;
                Ok(result)
            }
            Err(error) => {
                self.finish(&run_id, RunState::Failed, Some(error.clone()))
                    .await?;
                self.emit(LifecycleEvent::Error {
                    run_id,
                    error: error.to_string(),
                })
                .await;
                Err(error)
            }
        }
    }

    /// Called by an [`RunExecutor`] to report progress mid-run.
    pub async fn report_progress(&self, run_id: &RunId, progress: u8) -> CoreResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))?;
        if run.state.is_terminal() {
            return Ok(());
        }
        run.progress = progress.min(100);
        drop(runs);
        self.emit(LifecycleEvent::Progress {
            run_id: run_id.clone(),
            progress,
        })
        .await;
        Ok(())
    }

    /// Terminal transition shared by completion, failure and cancel.
    /// A run that already reached a terminal state is left untouched,
    /// so a cancel racing a completion can never clobber the other.
    async fn finish(
        &self,
        run_id: &RunId,
        state: RunState,
        error: Option<CoreError>,
    ) -> CoreResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))?;
        if run.state.is_terminal() {
            return Ok(());
        }
        run.state = state;
        run.ended_at = Some(chrono::Utc::now());
        run.error = error;
        Ok(())
    }

    pub async fn pause(&self, run_id: &RunId) -> CoreResult<()> {
        {
            let mut runs = self.runs.write().await;
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))?;
            if run.state != RunState::Running {
                return Err(CoreError::precondition(format!(
                    "run {run_id} is not running"
                )));
            }
            run.state = RunState::Paused;
        }
        self.emit(LifecycleEvent::Paused {
            run_id: run_id.clone(),
        })
        .await;
        Ok(())
    }

    pub async fn resume(&self, run_id: &RunId) -> CoreResult<()> {
        {
            let mut runs = self.runs.write().await;
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))?;
            if run.state != RunState::Paused {
                return Err(CoreError::precondition(format!(
                    "run {run_id} is not paused"
                )));
            }
            run.state = RunState::Running;
        }
        self.emit(LifecycleEvent::Resumed {
            run_id: run_id.clone(),
        })
        .await;
        Ok(())
    }

    /// Only valid from a non-terminal state; sets `ended_at`.
    pub async fn cancel(&self, run_id: &RunId) -> CoreResult<()> {
        {
            let mut runs = self.runs.write().await;
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| CoreError::not_found(format!("run {run_id}")))?;
            if run.state.is_terminal() {
                return Err(CoreError::precondition(format!(
                    "run {run_id} already finished"
                )));
            }
            run.state = RunState::Cancelled;
            run.ended_at = Some(chrono::Utc::now());
        }
        self.emit(LifecycleEvent::Cancelled {
            run_id: run_id.clone(),
        })
        .await;
        Ok(())
    }

    pub async fn create_checkpoint(
        &self,
        run_id: &RunId,
        state: HashMap<String, Value>,
    ) -> CoreResult<Checkpoint> {
        let run = self.get(run_id).await?;
        let checkpoint = Checkpoint {
            run_id: run_id.clone(),
            timestamp: chrono::Utc::now(),
            progress: run.progress,
            state,
        };
        self.checkpoints
            .write()
            .await
            .insert(run_id.clone(), checkpoint.clone());
        Ok(checkpoint)
    }

    /// Restores progress from an opaque checkpoint. Never resurrects a
    /// run that has already reached a terminal state.
    pub async fn restore_from_checkpoint(&self, checkpoint: &Checkpoint) -> CoreResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&checkpoint.run_id)
            .ok_or_else(|| CoreError::not_found(format!("run {}", checkpoint.run_id)))?;
        if run.state.is_terminal() {
            return Err(CoreError::precondition(format!(
                "run {} already finished",
                checkpoint.run_id
            )));
        }
        run.progress = checkpoint.progress;
        Ok(())
    }

    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.write().await.register(tool);
    }

    /// Dispatches a tool call by name, emitting `tool_call` before and
    /// `tool_result` after. The policy pre-check hook can deny the
    /// call before it ever reaches the tool body.
    pub async fn execute_tool_call(
        &self,
        run_id: &RunId,
        name: &str,
        params: Value,
        ctx: &Value,
    ) -> CoreResult<Value> {
        self.emit(LifecycleEvent::ToolCall {
            run_id: run_id.clone(),
            tool: name.to_string(),
            params: params.clone(),
        })
        .await;

        let result = self.tools.read().await.execute(name, params, ctx).await?;

        self.emit(LifecycleEvent::ToolResult {
            run_id: run_id.clone(),
            tool: name.to_string(),
            result: result.clone(),
        })
        .await;

        Ok(result)
    }
}

impl Default for AgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct EchoExecutor;

    #[async_trait]
    impl RunExecutor for EchoExecutor {
        async fn run(
            &self,
            runtime: &AgentRuntime,
            run_id: RunId,
            options: Value,
        ) -> CoreResult<Value> {
            runtime.report_progress(&run_id, 50).await?;
            Ok(options)
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl RunExecutor for FailingExecutor {
        async fn run(
            &self,
            _runtime: &AgentRuntime,
            _run_id: RunId,
            _options: Value,
        ) -> CoreResult<Value> {
            Err(CoreError::Fatal("boom".into()))
        }
    }

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LifecycleListener for CountingListener {
        async fn on_event(&self, _event: &LifecycleEvent) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct PanickingListener;

    #[async_trait]
    impl LifecycleListener for PanickingListener {
        async fn on_event(&self, _event: &LifecycleEvent) {
            panic!("listener blew up");
        }
    }

    #[tokio::test]
    async fn successful_run_emits_start_and_complete() {
        let runtime = AgentRuntime::shared();
        let count = Arc::new(AtomicUsize::new(0));
        runtime
            .subscribe(Arc::new(CountingListener {
                count: count.clone(),
            }))
            .await;

        let result = runtime
            .run("coder", Arc::new(EchoExecutor), serde_json::json!({"ok": true}))
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!({"ok": true}));
        // start, progress, complete
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn failing_executor_marks_run_failed_and_emits_error() {
        let runtime = AgentRuntime::shared();
        let err = runtime
            .run("coder", Arc::new(FailingExecutor), Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn panicking_listener_is_isolated_and_counted() {
        let runtime = AgentRuntime::shared();
        runtime.subscribe(Arc::new(PanickingListener)).await;
        let result = runtime
            .run("coder", Arc::new(EchoExecutor), Value::Null)
            .await;
        assert!(result.is_ok());
        assert!(runtime.listener_error_count() >= 1);
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_run_is_terminal() {
        let runtime = AgentRuntime::shared();
        runtime
            .run("coder", Arc::new(EchoExecutor), Value::Null)
            .await
            .unwrap();
        let run_id = {
            let runs = runtime.runs.read().await;
            runs.keys().next().unwrap().clone()
        };
        let result = runtime.cancel(&run_id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pause_resume_round_trip() {
        let runtime = Arc::new(AgentRuntime::new());
        let run = Run::new("coder");
        let run_id = run.id.clone();
        runtime.runs.write().await.insert(run_id.clone(), run);

        runtime.pause(&run_id).await.unwrap();
        assert_eq!(runtime.get(&run_id).await.unwrap().state, RunState::Paused);
        runtime.resume(&run_id).await.unwrap();
        assert_eq!(runtime.get(&run_id).await.unwrap().state, RunState::Running);
    }

    #[tokio::test]
    async fn checkpoint_round_trip_restores_progress() {
        let runtime = Arc::new(AgentRuntime::new());
        let run = Run::new("coder");
        let run_id = run.id.clone();
        runtime.runs.write().await.insert(run_id.clone(), run);
        runtime.report_progress(&run_id, 40).await.unwrap();

        let mut state = HashMap::new();
        state.insert("step".to_string(), serde_json::json!(3));
        let checkpoint = runtime
            .create_checkpoint(&run_id, state)
            .await
            .unwrap();

        runtime.report_progress(&run_id, 90).await.unwrap();
        runtime.restore_from_checkpoint(&checkpoint).await.unwrap();
        assert_eq!(runtime.get(&run_id).await.unwrap().progress, 40);
    }
}
