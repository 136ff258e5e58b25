//! Plan data model (spec §3 Plan/Step, §4.7).

use serde::{Deserialize, Serialize};

use crate::ids::{PlanId, StepId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    VeryComplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Frontend,
    Backend,
    Database,
    Auth,
    Testing,
    Deployment,
    General,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::Frontend => "frontend",
            Capability::Backend => "backend",
            Capability::Database => "database",
            Capability::Auth => "auth",
            Capability::Testing => "testing",
            Capability::Deployment => "deployment",
            Capability::General => "general",
        };
        write!(f, "{s}")
    }
}

/// Table-M execution mode shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Single specialist.
    A,
    /// Orchestrator + write + review + test.
    B,
    /// Orchestrator → parallel writers → integrate.
    C,
    /// Iterative planner→execute→planner.
    D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub agent_kind: String,
    pub description: String,
    pub dependencies: Vec<StepId>,
    pub estimate_minutes: Option<u32>,
    pub required_tools: Option<Vec<String>>,
}

impl Step {
    pub fn new(agent_kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            agent_kind: agent_kind.into(),
            description: description.into(),
            dependencies: Vec::new(),
            estimate_minutes: None,
            required_tools: None,
        }
    }

    pub fn depends_on(mut self, step: &Step) -> Self {
        self.dependencies.push(step.id.clone());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub task_id: TaskId,
    pub analysis: String,
    pub steps: Vec<Step>,
    pub risks: Vec<String>,
    pub complexity: Complexity,
    pub capabilities: Vec<Capability>,
    pub mode: ExecutionMode,
    pub estimated_duration_minutes: (u32, u32),
}
