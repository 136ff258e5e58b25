mod rules;
mod skeleton;
mod store;
mod types;
mod validate;

pub use rules::{duration_range_minutes, estimate_complexity, identify_capabilities, select_mode};
pub use skeleton::expand_step_skeleton;
pub use store::Planner;
pub use types::{Capability, Complexity, ExecutionMode, Plan, Step};
pub use validate::validate_plan;
