use crate::condition::{self, ConditionOutcome};
use crate::environment::{self, RunContext};
use models::StepSpec;
use runtime::{ContainerError, ContainerHandle, ContainerManager};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    /// 1-based position in the job.
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub output: String,
}

/// The first step that failed, and why.
#[derive(Debug)]
pub struct StepError {
    pub index: usize,
    pub name: String,
    pub command: Option<String>,
    pub source: ContainerError,
}

/// Runs one job's steps, in order, against the job's container.
pub struct StepRunner<'a> {
    manager: &'a ContainerManager,
    job_id: &'a str,
    job_env: &'a BTreeMap<String, String>,
    context: &'a RunContext,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        manager: &'a ContainerManager,
        job_id: &'a str,
        job_env: &'a BTreeMap<String, String>,
        context: &'a RunContext,
    ) -> Self {
        StepRunner {
            manager,
            job_id,
            job_env,
            context,
        }
    }

    /// Execute `steps` until one fails. Each step's result is pushed to
    /// `results` as soon as it is known, so a caller that abandons this
    /// future still sees every step that finished.
    pub async fn run_steps(
        &self,
        handle: &ContainerHandle,
        steps: &[StepSpec],
        results: &mut Vec<StepResult>,
    ) -> Result<(), StepError> {
        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;
            let name = step.label(index);
            let env = environment::step_env(self.job_env, step);

            let ctx = self.context.expression_context(self.job_id, &env, false);
            match condition::evaluate(step.condition.as_deref(), &ctx) {
                ConditionOutcome::Run => {}
                ConditionOutcome::Skip => {
                    logging::info(&format!(
                        "Skipping step {} ({}) in job '{}': condition is false",
                        index, name, self.job_id
                    ));
                    results.push(skipped(index, name, "condition is false"));
                    continue;
                }
                ConditionOutcome::Unsupported(reason) => {
                    logging::warning(&format!(
                        "Cannot evaluate condition of step {} ({}) in job '{}': {}; running it anyway",
                        index, name, self.job_id, reason
                    ));
                }
            }

            let Some(command) = step.command() else {
                let reason = match &step.uses {
                    Some(action) => format!("action '{}' is not executed locally", action),
                    None => "nothing to run".to_string(),
                };
                logging::warning(&format!(
                    "Skipping step {} ({}) in job '{}': {}",
                    index, name, self.job_id, reason
                ));
                results.push(skipped(index, name, &reason));
                continue;
            };

            logging::info(&format!("Step {} ({}) in job '{}'", index, name, self.job_id));
            match self
                .manager
                .run_command(handle, command, &environment::to_pairs(&env))
                .await
            {
                Ok(output) => results.push(StepResult {
                    index,
                    name,
                    status: StepStatus::Success,
                    output: output.stdout,
                }),
                Err(source) => {
                    logging::error(&format!(
                        "Step {} ({}) in job '{}' failed: {}",
                        index, name, self.job_id, source
                    ));
                    results.push(StepResult {
                        index,
                        name: name.clone(),
                        status: StepStatus::Failure,
                        output: source.to_string(),
                    });
                    return Err(StepError {
                        index,
                        name,
                        command: Some(command.to_string()),
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}

fn skipped(index: usize, name: String, reason: &str) -> StepResult {
    StepResult {
        index,
        name,
        status: StepStatus::Skipped,
        output: reason.to_string(),
    }
}
