//! AgentRuntime types (spec §3 Run/Checkpoint, §4.6).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::CoreError;
use crate::ids::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub agent_kind: String,
    pub state: RunState,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<CoreError>,
}

impl Run {
    pub fn new(agent_kind: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            agent_kind: agent_kind.into(),
            state: RunState::Running,
            progress: 0,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        }
    }
}

/// Opaque per-run state snapshot. At most one current checkpoint per
/// run-id; restoring sets progress and state but never resurrects a
/// terminal run.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
    pub state: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Start { run_id: RunId },
    Progress { run_id: RunId, progress: u8 },
    Paused { run_id: RunId },
    Resumed { run_id: RunId },
    Cancelled { run_id: RunId },
    Complete { run_id: RunId, result: Value },
    Error { run_id: RunId, error: String },
    ToolCall { run_id: RunId, tool: String, params: Value },
    ToolResult { run_id: RunId, tool: String, result: Value },
}

impl LifecycleEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            LifecycleEvent::Start { run_id }
            | LifecycleEvent::Progress { run_id, .. }
            | LifecycleEvent::Paused { run_id }
            | LifecycleEvent::Resumed { run_id }
            | LifecycleEvent::Cancelled { run_id }
            | LifecycleEvent::Complete { run_id, .. }
            | LifecycleEvent::Error { run_id, .. }
            | LifecycleEvent::ToolCall { run_id, .. }
            | LifecycleEvent::ToolResult { run_id, .. } => run_id,
        }
    }
}
