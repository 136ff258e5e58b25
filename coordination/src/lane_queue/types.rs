//! LaneQueue types (spec §3 Task, §4.5).

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CoreError;
use crate::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub lane: String,
    pub priority: u8,
    pub dependencies: Vec<TaskId>,
    pub parent_task_id: Option<TaskId>,
    pub state: TaskState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<CoreError>,
    /// Monotonic insertion sequence, used to break priority ties FIFO.
    pub(crate) seq: u64,
}

impl Task {
    pub fn new(lane: impl Into<String>, priority: u8, dependencies: Vec<TaskId>, payload: Value) -> Self {
        Self {
            id: TaskId::new(),
            lane: lane.into(),
            priority,
            dependencies,
            parent_task_id: None,
            state: TaskState::Pending,
            retry_count: 0,
            max_retries: 0,
            payload,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            seq: 0,
        }
    }
}

/// Ordering key for the lane's priority heap: higher priority first,
/// then lower (earlier) sequence number first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeapKey {
    pub priority: u8,
    pub seq: u64,
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
pub struct LaneConfig {
    pub kind: String,
    pub max_concurrent: usize,
    pub priority: u8,
}

#[derive(Debug, Clone, Default)]
pub struct LaneMetrics {
    pub completed_count: u64,
    pub failed_count: u64,
    pub avg_wait_ms: f64,
    pub avg_exec_ms: f64,
}

impl LaneMetrics {
    pub(crate) fn record_wait(&mut self, wait_ms: f64) {
        self.avg_wait_ms = running_average(self.avg_wait_ms, self.completed_count + self.failed_count, wait_ms);
    }

    pub(crate) fn record_exec(&mut self, exec_ms: f64) {
        self.avg_exec_ms = running_average(self.avg_exec_ms, self.completed_count + self.failed_count, exec_ms);
    }
}

fn running_average(current: f64, count: u64, sample: f64) -> f64 {
    if count == 0 {
        sample
    } else {
        (current * count as f64 + sample) / (count as f64 + 1.0)
    }
}
