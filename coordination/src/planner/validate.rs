//! Plan validation (spec §3 Plan invariant / §4.7 step f): every
//! dependency must resolve to a step-id in the same plan, and the
//! dependency graph must be acyclic.

use std::collections::{HashMap, HashSet};

use super::types::{Plan, Step};
use crate::error::{CoreError, CoreResult};
use crate::ids::StepId;

pub fn validate_plan(plan: &Plan) -> CoreResult<()> {
    let ids: HashSet<&StepId> = plan.steps.iter().map(|s| &s.id).collect();

    for step in &plan.steps {
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                return Err(CoreError::validation(format!(
                    "step {} depends on unknown step {}",
                    step.id, dep
                )));
            }
        }
    }

    detect_cycle(&plan.steps)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycle(steps: &[Step]) -> CoreResult<()> {
    let by_id: HashMap<&StepId, &Step> = steps.iter().map(|s| (&s.id, s)).collect();
    let mut marks: HashMap<&StepId, Mark> = HashMap::new();

    for step in steps {
        if !marks.contains_key(&step.id) {
            visit(step, &by_id, &mut marks)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    step: &'a Step,
    by_id: &HashMap<&'a StepId, &'a Step>,
    marks: &mut HashMap<&'a StepId, Mark>,
) -> CoreResult<()> {
    marks.insert(&step.id, Mark::Visiting);
    for dep_id in &step.dependencies {
        match marks.get(dep_id) {
            Some(Mark::Visiting) => {
                return Err(CoreError::validation(format!(
                    "dependency cycle through step {dep_id}"
                )));
            }
            Some(Mark::Done) => continue,
            None => {
                if let Some(dep_step) = by_id.get(dep_id) {
                    visit(dep_step, by_id, marks)?;
                }
            }
        }
    }
    marks.insert(&step.id, Mark::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PlanId, TaskId};
    use crate::planner::types::{Capability, Complexity, ExecutionMode};

    fn empty_plan(steps: Vec<Step>) -> Plan {
        Plan {
            id: PlanId::new(),
            task_id: TaskId::new(),
            analysis: String::new(),
            steps,
            risks: Vec::new(),
            complexity: Complexity::Simple,
            capabilities: vec![Capability::General],
            mode: ExecutionMode::A,
            estimated_duration_minutes: (5, 20),
        }
    }

    #[test]
    fn linear_chain_is_valid() {
        let a = Step::new("writer", "write");
        let b = Step::new("reviewer", "review").depends_on(&a);
        let plan = empty_plan(vec![a, b]);
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn unresolved_dependency_is_rejected() {
        let mut a = Step::new("writer", "write");
        a.dependencies.push(StepId::new());
        let plan = empty_plan(vec![a]);
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn cycle_is_rejected() {
        let mut a = Step::new("writer", "write");
        let mut b = Step::new("reviewer", "review");
        b.dependencies.push(a.id.clone());
        a.dependencies.push(b.id.clone());
        let plan = empty_plan(vec![a, b]);
        assert!(validate_plan(&plan).is_err());
    }
}
