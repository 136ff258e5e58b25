//! Canonical step skeleton per Table-M mode (spec §4.7 step e).

use std::collections::BTreeSet;

use super::types::{Capability, ExecutionMode, Step};

/// Expands a mode into its canonical step shape. Agent kinds are
/// generic specialist labels; the orchestrator binds them to concrete
/// executors at dispatch time.
pub fn expand_step_skeleton(mode: ExecutionMode, capabilities: &BTreeSet<Capability>) -> Vec<Step> {
    match mode {
        ExecutionMode::A => {
            let specialist = capabilities
                .iter()
                .next()
                .copied()
                .unwrap_or(Capability::General);
            vec![Step::new(
                specialist.to_string(),
                format!("Implement the requirement directly as a {specialist} task"),
            )]
        }
        ExecutionMode::B => {
            let write = Step::new("writer", "Implement the requirement");
            let review = Step::new("reviewer", "Review the implementation").depends_on(&write);
            let test = Step::new("tester", "Write and run tests").depends_on(&write);
            let orchestrator = Step::new("orchestrator", "Plan and sequence the work below");
            vec![orchestrator, write, review, test]
        }
        ExecutionMode::C => {
            let orchestrator = Step::new("orchestrator", "Split the requirement across writers");
            let writers: Vec<Step> = capabilities
                .iter()
                .map(|cap| {
                    Step::new(
                        cap.to_string(),
                        format!("Implement the {cap} portion of the requirement"),
                    )
                    .depends_on(&orchestrator)
                })
                .collect();
            let mut integrate = Step::new("integrator", "Integrate writer outputs and resolve conflicts");
            integrate.dependencies = writers.iter().map(|s| s.id.clone()).collect();

            let mut steps = vec![orchestrator];
            steps.extend(writers);
            steps.push(integrate);
            steps
        }
        ExecutionMode::D => {
            let mut steps = Vec::new();
            let mut previous: Option<Step> = None;
            for round in 1..=3 {
                let plan_step = match &previous {
                    None => Step::new("planner", "Produce an initial plan for this iteration"),
                    Some(prev) => {
                        Step::new("planner", format!("Re-plan after iteration {}", round - 1))
                            .depends_on(prev)
                    }
                };
                let execute_step =
                    Step::new("executor", format!("Execute iteration {round}")).depends_on(&plan_step);
                previous = Some(execute_step.clone_for_dependency());
                steps.push(plan_step);
                steps.push(execute_step);
            }
            steps
        }
    }
}

impl Step {
    /// Cheap clone used only to thread a dependency id into the next
    /// loop iteration when building the iterative-mode skeleton.
    fn clone_for_dependency(&self) -> Step {
        Step {
            id: self.id.clone(),
            agent_kind: self.agent_kind.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
            estimate_minutes: self.estimate_minutes,
            required_tools: self.required_tools.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_a_produces_single_step() {
        let caps = BTreeSet::from([Capability::Backend]);
        let steps = expand_step_skeleton(ExecutionMode::A, &caps);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn mode_b_has_write_review_test_and_orchestrator() {
        let caps = BTreeSet::from([Capability::General]);
        let steps = expand_step_skeleton(ExecutionMode::B, &caps);
        assert_eq!(steps.len(), 4);
        let review = steps.iter().find(|s| s.agent_kind == "reviewer").unwrap();
        let write = steps.iter().find(|s| s.agent_kind == "writer").unwrap();
        assert!(review.dependencies.contains(&write.id));
    }

    #[test]
    fn mode_c_integrator_depends_on_every_writer() {
        let caps = BTreeSet::from([Capability::Frontend, Capability::Backend, Capability::Database]);
        let steps = expand_step_skeleton(ExecutionMode::C, &caps);
        let integrator = steps.iter().find(|s| s.agent_kind == "integrator").unwrap();
        assert_eq!(integrator.dependencies.len(), caps.len());
    }

    #[test]
    fn mode_d_chains_three_plan_execute_rounds() {
        let caps = BTreeSet::from([Capability::General]);
        let steps = expand_step_skeleton(ExecutionMode::D, &caps);
        assert_eq!(steps.len(), 6);
    }
}
