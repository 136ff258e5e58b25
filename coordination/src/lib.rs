//! Execution core for the evoagent multi-agent coding platform.
//!
//! This crate implements the stateful machinery shared by every agent
//! run: the append-only session log, the knowledge and vector memory
//! tiers, the A2A message bus and agent registry, the per-lane task
//! queue, the agent runtime base, the planner, the orchestrator, the
//! WebSocket gateway state machine, and the background consolidation
//! loop. LLM access, embeddings, and skill execution are external
//! collaborators consumed through the traits in [`collaborators`].

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod bus;
pub mod collaborators;
pub mod consolidation;
pub mod error;
pub mod ids;
pub mod knowledge;
pub mod lane_queue;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod runtime;
pub mod session_log;
pub mod vector;

pub use bus::{Address, Message, MessageBus, MessagePayload, MessageType};
pub use collaborators::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, LlmProvider, SkillExecutionLimits,
    SkillExecutionResult, SkillExecutor,
};
pub use consolidation::{ConsolidationConfig, ConsolidationLoop, ConsolidationReport};
pub use error::{CoreError, CoreResult};
pub use knowledge::{KnowledgeCategory, KnowledgeItem, KnowledgeSource, KnowledgeStore};
pub use lane_queue::{LaneConfig, LaneQueue, Task, TaskExecutor, TaskState};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult, StepExecutor as OrchestratorStepExecutor};
pub use planner::{Capability, Complexity, ExecutionMode, Plan, Planner, Step};
pub use registry::{AgentRegistration, AgentStatus, Registry};
pub use runtime::{AgentRuntime, Checkpoint, LifecycleEvent, LifecycleListener, Run, RunExecutor, RunState};
pub use session_log::{
    CleanupOptions, LoadedSession, SessionEvent, SessionIndex, SessionLog, SessionMetadata,
    SessionStatus,
};
pub use vector::{HybridSearch, HybridSearchOptions, VectorEntry, VectorStore};
