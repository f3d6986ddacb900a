// validators crate

mod actions;
mod jobs;
mod steps;

pub use actions::validate_action_reference;
pub use jobs::validate_jobs;
pub use steps::validate_steps;

use models::{ValidationResult, WorkflowDocument};

/// Structural and semantic checks over a parsed workflow. Dependency
/// problems (unknown needs, cycles) are issues; anything that would only
/// degrade a run is a warning.
pub fn validate_workflow(workflow: &WorkflowDocument) -> ValidationResult {
    let mut result = ValidationResult::new();

    if workflow.name.trim().is_empty() {
        result.add_warning("Workflow has no 'name'".to_string());
    }

    if workflow.jobs.is_empty() {
        result.add_issue("'jobs' section is empty".to_string());
        return result;
    }

    validate_jobs(&workflow.jobs, &mut result);

    if let Err(e) = executor::resolve(&workflow.jobs) {
        result.add_issue(e.to_string());
    }

    result
}
