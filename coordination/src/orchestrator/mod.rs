mod executor;
mod retry;
mod store;
mod types;

pub use executor::StepExecutor;
pub use retry::{classify_error, is_critical_step, BackoffKind, RetryDecision};
pub use store::Orchestrator;
pub use types::{OrchestratorConfig, OrchestratorResult, StepResult, StepStatus};
