use crate::validate_steps;
use indexmap::IndexMap;
use models::{JobSpec, ValidationResult};

pub fn validate_jobs(jobs: &IndexMap<String, JobSpec>, result: &mut ValidationResult) {
    for (job_id, job) in jobs {
        if job.steps.is_empty() {
            result.add_issue(format!("Job '{}' has empty 'steps' section", job_id));
        } else {
            validate_steps(&job.steps, job_id, result);
        }

        if runtime::map_runs_on(job.runs_on()).is_err() {
            let supported: Vec<&str> = runtime::images::supported_labels().collect();
            result.add_warning(format!(
                "Job '{}': runs-on '{}' has no container image (supported: {})",
                job_id,
                job.runs_on(),
                supported.join(", ")
            ));
        }

        if job.timeout_minutes == Some(0) {
            result.add_issue(format!(
                "Job '{}': 'timeout-minutes' must be greater than zero",
                job_id
            ));
        }

        if let Some(condition) = &job.condition {
            if let Err(reason) = executor::condition::check(condition) {
                result.add_warning(format!(
                    "Job '{}': condition '{}' cannot be evaluated locally ({}); the job will run",
                    job_id, condition, reason
                ));
            }
        }
    }
}
