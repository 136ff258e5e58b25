//! `LaneQueue`: priority queues over N lanes with dependency gating,
//! retries, and metrics (spec §4.5). Grounded on the teacher's
//! state-machine-over-a-shared-map shape (`router/circuit_breaker.rs`)
//! and the pure deterministic scheduling-loop idiom of
//! `escalation/engine.rs`.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::TaskExecutor;
use super::types::{HeapKey, LaneConfig, LaneMetrics, Task, TaskState};
use crate::error::{CoreError, CoreResult};
use crate::ids::TaskId;

struct LaneState {
    config: LaneConfig,
    heap: BinaryHeap<(HeapKey, TaskId)>,
    running: HashSet<TaskId>,
    metrics: LaneMetrics,
}

struct Inner {
    lanes: HashMap<String, LaneState>,
    tasks: HashMap<TaskId, Task>,
    notifiers: HashMap<TaskId, Arc<Notify>>,
    cancellations: HashMap<TaskId, CancellationToken>,
}

pub struct LaneQueue {
    inner: RwLock<Inner>,
    seq: AtomicU64,
}

impl LaneQueue {
    pub fn new(lanes: Vec<LaneConfig>) -> Self {
        let mut lane_map = HashMap::new();
        for config in lanes {
            lane_map.insert(
                config.kind.clone(),
                LaneState {
                    config,
                    heap: BinaryHeap::new(),
                    running: HashSet::new(),
                    metrics: LaneMetrics::default(),
                },
            );
        }
        Self {
            inner: RwLock::new(Inner {
                lanes: lane_map,
                tasks: HashMap::new(),
                notifiers: HashMap::new(),
                cancellations: HashMap::new(),
            }),
            seq: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn enqueue(&self, mut task: Task) -> CoreResult<TaskId> {
        let mut inner = self.inner.write().await;
        if !inner.lanes.contains_key(&task.lane) {
            return Err(CoreError::validation(format!("unknown lane {}", task.lane)));
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        task.seq = seq;
        task.state = TaskState::Queued;
        task.queued_at = Some(chrono::Utc::now());
        let id = task.id.clone();

        let lane = inner.lanes.get_mut(&task.lane).unwrap();
        lane.heap.push((HeapKey { priority: task.priority, seq }, id.clone()));
        inner.notifiers.insert(id.clone(), Arc::new(Notify::new()));
        inner.tasks.insert(id.clone(), task);
        debug!(task_id = %id, "task enqueued");
        Ok(id)
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<Task> {
        self.inner.read().await.tasks.get(task_id).cloned()
    }

    fn all_dependencies_completed(tasks: &HashMap<TaskId, Task>, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            tasks
                .get(dep)
                .map(|d| d.state == TaskState::Completed)
                .unwrap_or(false)
        })
    }

    /// One scheduling pass across all lanes, descending lane priority.
    /// Returns the tasks that were dequeued and should now be started.
    async fn schedule_pass(&self) -> Vec<Task> {
        let mut inner = self.inner.write().await;
        let mut lane_kinds: Vec<String> = inner.lanes.keys().cloned().collect();
        lane_kinds.sort_by_key(|k| std::cmp::Reverse(inner.lanes[k].config.priority));

        let mut started = Vec::new();
        for kind in lane_kinds {
            loop {
                let head = {
                    let lane = inner.lanes.get(&kind).unwrap();
                    if lane.running.len() >= lane.config.max_concurrent {
                        break;
                    }
                    lane.heap.peek().cloned()
                };
                let Some((_key, task_id)) = head else {
                    break;
                };
                let ready = {
                    let task = match inner.tasks.get(&task_id) {
                        Some(t) => t,
                        None => {
                            inner.lanes.get_mut(&kind).unwrap().heap.pop();
                            continue;
                        }
                    };
                    if task.state == TaskState::Cancelled {
                        inner.lanes.get_mut(&kind).unwrap().heap.pop();
                        continue;
                    }
                    Self::all_dependencies_completed(&inner.tasks, task)
                };
                if !ready {
                    break;
                }

                inner.lanes.get_mut(&kind).unwrap().heap.pop();
                inner.lanes.get_mut(&kind).unwrap().running.insert(task_id.clone());
                let cancel = CancellationToken::new();
                inner.cancellations.insert(task_id.clone(), cancel);

                let task = inner.tasks.get_mut(&task_id).unwrap();
                task.state = TaskState::Running;
                task.started_at = Some(chrono::Utc::now());
                started.push(task.clone());
            }
        }
        started
    }

    async fn finish_task(&self, task_id: &TaskId, outcome: Result<serde_json::Value, CoreError>) {
        let mut inner = self.inner.write().await;
        let lane_kind = inner.tasks.get(task_id).map(|t| t.lane.clone());
        let now = chrono::Utc::now();

        let (retry, final_state) = {
            let task = match inner.tasks.get_mut(task_id) {
                Some(t) => t,
                None => return,
            };
            // A concurrent `cancel` may have already moved this task to a
            // terminal state while the executor was running; don't clobber it.
            if task.state.is_terminal() {
                return;
            }
            task.completed_at = Some(now);
            match outcome {
                Ok(result) => {
                    task.result = Some(result);
                    task.state = TaskState::Completed;
                    (false, TaskState::Completed)
                }
                Err(e) => {
                    if task.retry_count < task.max_retries {
                        task.retry_count += 1;
                        task.state = TaskState::Queued;
                        task.error = Some(e);
                        (true, TaskState::Queued)
                    } else {
                        task.error = Some(e);
                        task.state = TaskState::Failed;
                        (false, TaskState::Failed)
                    }
                }
            }
        };

        if let Some(kind) = &lane_kind {
            if let Some(lane) = inner.lanes.get_mut(kind) {
                lane.running.remove(task_id);
                if let Some(task) = inner.tasks.get(task_id) {
                    if let (Some(started), Some(queued)) = (task.started_at, task.queued_at) {
                        let wait_ms = (started - queued).num_milliseconds() as f64;
                        lane.metrics.record_wait(wait_ms.max(0.0));
                    }
                    if let Some(started) = task.started_at {
                        let exec_ms = (now - started).num_milliseconds() as f64;
                        lane.metrics.record_exec(exec_ms.max(0.0));
                    }
                }
                match final_state {
                    TaskState::Completed => lane.metrics.completed_count += 1,
                    TaskState::Failed => lane.metrics.failed_count += 1,
                    _ => {}
                }
            }
        }

        if retry {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            if let Some(task) = inner.tasks.get_mut(task_id) {
                task.seq = seq;
            }
            if let Some(kind) = &lane_kind {
                if let (Some(lane), Some(task)) = (inner.lanes.get_mut(kind), inner.tasks.get(task_id)) {
                    lane.heap.push((HeapKey { priority: task.priority, seq }, task_id.clone()));
                }
            }
            info!(%task_id, "task retried");
        }

        inner.cancellations.remove(task_id);
        if let Some(notify) = inner.notifiers.get(task_id) {
            notify.notify_waiters();
        }
    }

    /// Flip pending/queued/running tasks to cancelled; running tasks
    /// are cooperatively cancelled via their `CancellationToken`.
    pub async fn cancel(&self, task_id: &TaskId) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return Err(CoreError::not_found(format!("task {task_id}")));
        };
        if task.state.is_terminal() {
            return Ok(());
        }
        let was_running = task.state == TaskState::Running;
        task.state = TaskState::Cancelled;
        task.completed_at = Some(chrono::Utc::now());

        if was_running {
            if let Some(lane) = inner.lanes.get_mut(&task.lane) {
                lane.running.remove(task_id);
            }
            if let Some(cancel) = inner.cancellations.get(task_id) {
                cancel.cancel();
            }
        }
        if let Some(notify) = inner.notifiers.get(task_id) {
            notify.notify_waiters();
        }
        warn!(%task_id, "task cancelled");
        Ok(())
    }

    /// Resolve once the task reaches a terminal state or `timeout` elapses.
    pub async fn wait_for(&self, task_id: &TaskId, timeout: std::time::Duration) -> CoreResult<Task> {
        let notify = {
            let inner = self.inner.read().await;
            inner
                .notifiers
                .get(task_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("task {task_id}")))?
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.get(task_id).await {
                if task.state.is_terminal() {
                    return Ok(task);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::Timeout(format!("task {task_id} did not complete in time")));
            }
            let _ = tokio::time::timeout(remaining, notify.notified()).await;
        }
    }

    pub async fn lane_metrics(&self, kind: &str) -> Option<LaneMetrics> {
        self.inner.read().await.lanes.get(kind).map(|l| l.metrics.clone())
    }

    /// Run the scheduling loop until `cancel` fires, dispatching ready
    /// tasks to `executor`.
    pub async fn run_scheduler(
        self: Arc<Self>,
        executor: Arc<dyn TaskExecutor>,
        cancel: CancellationToken,
        idle_backoff: std::time::Duration,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let started = self.schedule_pass().await;
            if started.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(idle_backoff) => {}
                }
                continue;
            }
            for task in started {
                let queue = self.clone();
                let executor = executor.clone();
                let task_cancel = {
                    let inner = self.inner.read().await;
                    inner.cancellations.get(&task.id).cloned().unwrap_or_default()
                };
                tokio::spawn(async move {
                    let outcome = executor.execute(&task, task_cancel).await;
                    queue.finish_task(&task.id, outcome).await;
                });
            }
        }
    }
}
