use crate::condition::ExpressionContext;
use chrono::Utc;
use models::{JobSpec, StepSpec, WorkflowDocument};
use runtime::ProcessRunner;
use std::collections::BTreeMap;
use std::path::Path;

const UNKNOWN_SHA: &str = "0000000000000000000000000000000000000000";
const DEFAULT_REF: &str = "refs/heads/main";

/// Mount point of the host workspace inside every job container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Facts about the run that every job sees, captured once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub workflow: String,
    pub event_name: String,
    pub sha: String,
    pub git_ref: String,
    pub run_id: String,
}

impl RunContext {
    /// Read the commit and ref from the current git checkout, falling back to
    /// placeholders outside a repository or without git.
    pub async fn capture(
        workflow: &WorkflowDocument,
        event_name: &str,
        git: &dyn ProcessRunner,
    ) -> Self {
        let sha = git_stdout(git, &["rev-parse", "HEAD"])
            .await
            .unwrap_or_else(|| UNKNOWN_SHA.to_string());
        let git_ref = git_stdout(git, &["symbolic-ref", "--short", "HEAD"])
            .await
            .map(|branch| format!("refs/heads/{}", branch))
            .unwrap_or_else(|| DEFAULT_REF.to_string());

        RunContext {
            workflow: workflow.name.clone(),
            event_name: event_name.to_string(),
            sha,
            git_ref,
            run_id: Utc::now().timestamp().to_string(),
        }
    }

    /// Variables a job sees before any workflow, job or step env is applied.
    pub fn runner_context(&self, job_id: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("GITHUB_ACTIONS".to_string(), "true".to_string());
        env.insert("GITHUB_WORKFLOW".to_string(), self.workflow.clone());
        env.insert("GITHUB_JOB".to_string(), job_id.to_string());
        env.insert("GITHUB_EVENT_NAME".to_string(), self.event_name.clone());
        env.insert("GITHUB_WORKSPACE".to_string(), CONTAINER_WORKSPACE.to_string());
        env.insert("GITHUB_SHA".to_string(), self.sha.clone());
        env.insert("GITHUB_REF".to_string(), self.git_ref.clone());
        env.insert("GITHUB_RUN_ID".to_string(), self.run_id.clone());
        env.insert("RUNNER_OS".to_string(), "Linux".to_string());
        env
    }

    pub fn expression_context<'a>(
        &'a self,
        job_id: &'a str,
        env: &'a BTreeMap<String, String>,
        needs_skipped: bool,
    ) -> ExpressionContext<'a> {
        ExpressionContext {
            event_name: &self.event_name,
            git_ref: &self.git_ref,
            job_id,
            workflow: &self.workflow,
            env,
            needs_skipped,
        }
    }
}

/// Runner context, then workflow env, then job env; later layers win.
pub fn job_env(
    context: &RunContext,
    workflow: &WorkflowDocument,
    job_id: &str,
    job: &JobSpec,
) -> BTreeMap<String, String> {
    let mut env = context.runner_context(job_id);
    env.extend(workflow.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.extend(job.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Job env overridden by the step's own env.
pub fn step_env(job_env: &BTreeMap<String, String>, step: &StepSpec) -> BTreeMap<String, String> {
    let mut env = job_env.clone();
    env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

pub fn to_pairs(env: &BTreeMap<String, String>) -> Vec<(String, String)> {
    env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Trimmed stdout of a successful git invocation.
async fn git_stdout(git: &dyn ProcessRunner, args: &[&str]) -> Option<String> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    match git.output(Path::new("git"), &args).await {
        Ok(output) if output.success() => {
            let text = output.stdout.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Ok(output) => {
            logging::debug(&format!("git {} failed: {}", args.join(" "), output.diagnostic()));
            None
        }
        Err(e) => {
            logging::debug(&format!("git unavailable: {}", e));
            None
        }
    }
}
