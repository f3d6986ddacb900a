use crate::validate_action_reference;
use models::{StepSpec, ValidationResult};

pub fn validate_steps(steps: &[StepSpec], job_id: &str, result: &mut ValidationResult) {
    for (i, step) in steps.iter().enumerate() {
        match (&step.uses, &step.run) {
            (None, None) => {
                result.add_issue(format!(
                    "Job '{}', step {}: Missing 'uses' or 'run' field",
                    job_id,
                    i + 1
                ));
            }
            (Some(_), Some(_)) => {
                result.add_issue(format!(
                    "Job '{}', step {}: Contains both 'uses' and 'run' (should only use one)",
                    job_id,
                    i + 1
                ));
            }
            (Some(uses), None) => validate_action_reference(uses, job_id, i, result),
            (None, Some(_)) => {
                if step.command().is_none() {
                    result.add_warning(format!(
                        "Job '{}', step {}: 'run' is empty",
                        job_id,
                        i + 1
                    ));
                }
            }
        }

        if let Some(condition) = &step.condition {
            if let Err(reason) = executor::condition::check(condition) {
                result.add_warning(format!(
                    "Job '{}', step {}: condition '{}' cannot be evaluated locally ({}); the step will run",
                    job_id,
                    i + 1,
                    condition,
                    reason
                ));
            }
        }
    }
}
