use crate::condition::{self, ConditionOutcome};
use crate::dependency::{self, ExecutionPlan};
use crate::environment::{self, RunContext, CONTAINER_WORKSPACE};
use crate::error::ExecutionError;
use crate::steps::{StepError, StepResult, StepRunner};
use futures::future;
use futures::FutureExt;
use models::{JobSpec, WorkflowDocument};
use runtime::{
    map_runs_on, ContainerConfig, ContainerHandle, ContainerManager, SystemProcessRunner,
};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A finished job, or the payload of a panic raised inside its step window.
/// The container is already released either way.
type JobRun = Result<(JobResult, Option<ExecutionError>), Box<dyn Any + Send>>;

#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    /// Run the jobs of each dependency level concurrently.
    pub parallel: bool,
    /// Host directory bind-mounted at `/workspace` in every job container.
    pub workspace: Option<PathBuf>,
    /// Applied to jobs without `timeout-minutes`.
    pub default_job_timeout: Option<Duration>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub name: String,
    pub status: JobStatus,
    /// The image the job ran in; `None` when no container was needed or possible.
    pub image: Option<String>,
    pub steps: Vec<StepResult>,
}

impl JobResult {
    fn new(job_id: &str, job: Option<&JobSpec>, status: JobStatus) -> Self {
        JobResult {
            job_id: job_id.to_string(),
            name: job
                .map(|j| j.display_name(job_id))
                .unwrap_or(job_id)
                .to_string(),
            status,
            image: None,
            steps: Vec::new(),
        }
    }
}

/// Everything known after a run, including how far it got before failing.
#[derive(Debug)]
pub struct ExecutionResult {
    pub plan: ExecutionPlan,
    pub jobs: Vec<JobResult>,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<JobResult>, ExecutionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.jobs),
        }
    }
}

/// The jobs a run would execute, in order. An empty filter means every job.
pub fn plan(workflow: &WorkflowDocument, job_filter: Option<&str>) -> Result<ExecutionPlan, ExecutionError> {
    match job_filter.map(str::trim).filter(|j| !j.is_empty()) {
        Some(job) => dependency::resolve_for(&workflow.jobs, job),
        None => dependency::resolve(&workflow.jobs),
    }
}

pub struct WorkflowExecutor {
    manager: Arc<ContainerManager>,
    config: ExecutionConfig,
}

impl WorkflowExecutor {
    pub fn new(manager: Arc<ContainerManager>, config: ExecutionConfig) -> Self {
        WorkflowExecutor { manager, config }
    }

    pub fn manager(&self) -> &Arc<ContainerManager> {
        &self.manager
    }

    /// Run the workflow and stop at the first failing job.
    pub async fn run(
        &self,
        workflow: &WorkflowDocument,
        job_filter: Option<&str>,
        event_name: &str,
    ) -> Result<Vec<JobResult>, ExecutionError> {
        self.run_with_report(workflow, job_filter, event_name)
            .await
            .into_result()
    }

    pub async fn run_with_report(
        &self,
        workflow: &WorkflowDocument,
        job_filter: Option<&str>,
        event_name: &str,
    ) -> ExecutionResult {
        let plan = match plan(workflow, job_filter) {
            Ok(plan) => plan,
            Err(err) => {
                logging::error(&format!("Failed to plan workflow: {}", err));
                return ExecutionResult {
                    plan: ExecutionPlan::default(),
                    jobs: Vec::new(),
                    error: Some(err),
                };
            }
        };

        logging::info(&format!(
            "Executing workflow '{}' ({} job(s), event: {})",
            workflow.name,
            plan.len(),
            event_name
        ));
        let context = RunContext::capture(workflow, event_name, &SystemProcessRunner).await;

        let (jobs, error) = if self.config.parallel {
            self.run_levels(workflow, &plan, &context).await
        } else {
            self.run_sequential(workflow, &plan, &context).await
        };

        if let Some(err) = &error {
            logging::error(&err.to_string());
        }
        ExecutionResult { plan, jobs, error }
    }

    async fn run_sequential(
        &self,
        workflow: &WorkflowDocument,
        plan: &ExecutionPlan,
        context: &RunContext,
    ) -> (Vec<JobResult>, Option<ExecutionError>) {
        let mut results: Vec<JobResult> = Vec::new();

        for job_id in plan.order() {
            let needs_skipped = needs_skipped(workflow, job_id, &results);
            let run = self.run_job(workflow, job_id, context, needs_skipped).await;
            let (result, error) = match run {
                Ok(run) => run,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            results.push(result);
            if error.is_some() {
                return (results, error);
            }
        }

        (results, None)
    }

    /// Jobs within a level start together; the next level starts only once
    /// the whole level has finished. A panic in one job is re-raised after
    /// every sibling has released its container.
    async fn run_levels(
        &self,
        workflow: &WorkflowDocument,
        plan: &ExecutionPlan,
        context: &RunContext,
    ) -> (Vec<JobResult>, Option<ExecutionError>) {
        let mut results: Vec<JobResult> = Vec::new();

        for level in plan.levels() {
            let runs = level.iter().map(|job_id| {
                let needs_skipped = needs_skipped(workflow, job_id, &results);
                self.run_job(workflow, job_id, context, needs_skipped)
            });
            let outcomes = future::join_all(runs.collect::<Vec<_>>()).await;

            let mut first_error = None;
            let mut first_panic = None;
            for outcome in outcomes {
                match outcome {
                    Ok((result, error)) => {
                        results.push(result);
                        if first_error.is_none() {
                            first_error = error;
                        }
                    }
                    Err(panic) => {
                        first_panic.get_or_insert(panic);
                    }
                }
            }
            if let Some(panic) = first_panic {
                std::panic::resume_unwind(panic);
            }
            if first_error.is_some() {
                return (results, first_error);
            }
        }

        (results, None)
    }

    async fn run_job(
        &self,
        workflow: &WorkflowDocument,
        job_id: &str,
        context: &RunContext,
        needs_skipped: bool,
    ) -> JobRun {
        let Some(job) = workflow.job(job_id) else {
            return Ok((
                JobResult::new(job_id, None, JobStatus::Failure),
                Some(ExecutionError::JobNotFound(job_id.to_string())),
            ));
        };

        let env = environment::job_env(context, workflow, job_id, job);
        let ctx = context.expression_context(job_id, &env, needs_skipped);
        match condition::evaluate(job.condition.as_deref(), &ctx) {
            ConditionOutcome::Run => {}
            ConditionOutcome::Skip => {
                logging::info(&format!("Skipping job '{}'", job_id));
                return Ok((JobResult::new(job_id, Some(job), JobStatus::Skipped), None));
            }
            ConditionOutcome::Unsupported(reason) => logging::warning(&format!(
                "Cannot evaluate condition of job '{}': {}; running it anyway",
                job_id, reason
            )),
        }

        let mut result = JobResult::new(job_id, Some(job), JobStatus::Failure);

        let image = match map_runs_on(job.runs_on()) {
            Ok(image) => image,
            Err(_) => {
                return Ok((
                    result,
                    Some(ExecutionError::UnsupportedRuntime {
                        job: job_id.to_string(),
                        label: job.runs_on().to_string(),
                    }),
                ))
            }
        };
        result.image = Some(image.to_string());

        logging::info(&format!("Starting job '{}' on {}", job_id, image));
        let config = self.container_config(&env);
        let handle = match self
            .manager
            .create_container(image, &container_name(job_id), &config)
            .await
        {
            Ok(handle) => handle,
            Err(source) => {
                return Ok((
                    result,
                    Some(ExecutionError::Container {
                        job: job_id.to_string(),
                        source,
                    }),
                ))
            }
        };

        let timeout = job
            .timeout_minutes
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
            .or(self.config.default_job_timeout);
        let runner = StepRunner::new(&self.manager, job_id, &env, context);
        let window = async {
            let steps = runner.run_steps(&handle, &job.steps, &mut result.steps);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, steps).await {
                    Ok(outcome) => outcome.map_err(|e| step_failure(job_id, e)),
                    Err(_) => Err(ExecutionError::JobTimedOut {
                        job: job_id.to_string(),
                        timeout: limit,
                    }),
                },
                None => steps.await.map_err(|e| step_failure(job_id, e)),
            }
        };
        let outcome = AssertUnwindSafe(window).catch_unwind().await;

        self.release(&handle).await;

        match outcome? {
            Ok(()) => {
                logging::info(&format!("Job '{}' succeeded", job_id));
                result.status = JobStatus::Success;
                Ok((result, None))
            }
            Err(err) => Ok((result, Some(err))),
        }
    }

    /// Stop then remove. Failures here are logged and never replace the
    /// job's own outcome.
    async fn release(&self, handle: &ContainerHandle) {
        if let Err(e) = self.manager.stop_container(handle).await {
            logging::warning(&format!("Failed to stop container {}: {}", handle, e));
        }
        if let Err(e) = self.manager.remove_container(handle).await {
            logging::warning(&format!("Failed to remove container {}: {}", handle, e));
        }
    }

    fn container_config(&self, env: &BTreeMap<String, String>) -> ContainerConfig {
        let workspace = self.config.workspace.as_ref();
        ContainerConfig {
            env: environment::to_pairs(env),
            volumes: workspace
                .map(|dir| format!("{}:{}", dir.display(), CONTAINER_WORKSPACE))
                .into_iter()
                .collect(),
            working_dir: workspace.map(|_| CONTAINER_WORKSPACE.to_string()),
            user: self.config.user.clone(),
        }
    }
}

fn step_failure(job_id: &str, err: StepError) -> ExecutionError {
    ExecutionError::StepFailed {
        job: job_id.to_string(),
        step: err.index,
        name: err.name,
        command: err.command,
        source: err.source,
    }
}

fn needs_skipped(workflow: &WorkflowDocument, job_id: &str, finished: &[JobResult]) -> bool {
    let statuses: HashMap<&str, JobStatus> = finished
        .iter()
        .map(|r| (r.job_id.as_str(), r.status))
        .collect();
    workflow
        .job(job_id)
        .map(|job| {
            job.needs()
                .iter()
                .any(|need| statuses.get(need.as_str()) == Some(&JobStatus::Skipped))
        })
        .unwrap_or(false)
}

/// Unique per run so concurrent and repeated runs never collide.
fn container_name(job_id: &str) -> String {
    let sanitized: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("jobbox-{}-{}", sanitized, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::steps::StepStatus;
    use runtime::testing::ScriptedRunner;
    use runtime::{BufferSink, OutputSink, OutputStream, RuntimeClient};

    fn executor(runner: &Arc<ScriptedRunner>, config: ExecutionConfig) -> (WorkflowExecutor, Arc<BufferSink>) {
        let sink = Arc::new(BufferSink::new());
        let client = RuntimeClient::with_binary("podman", runner.clone());
        let manager = Arc::new(ContainerManager::new(client, sink.clone()));
        (WorkflowExecutor::new(manager, config), sink)
    }

    fn workflow(yaml: &str) -> WorkflowDocument {
        parser::parse_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_single_job_runs_and_cleans_up() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, sink) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
name: hello
on: push
jobs:
  greet:
    runs-on: ubuntu-latest
    steps:
      - run: echo hello
"#,
        );

        let results = executor.run(&wf, None, "push").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, JobStatus::Success);
        assert_eq!(results[0].image.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(results[0].steps[0].output, "hello\n");
        assert!(sink.stdout().contains("hello"));

        let pull = &runner.calls_to("pull")[0];
        assert_eq!(pull, &vec!["pull".to_string(), "ubuntu:22.04".to_string()]);
        let create = &runner.calls_to("create")[0];
        assert!(create.iter().any(|a| a == "ubuntu:22.04"));
        assert!(create.iter().any(|a| a == "GITHUB_JOB=greet"));
        assert_eq!(runner.count("rm"), 1);
        assert!(executor.manager().live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_runner_fails_before_any_container() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, _) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  win:
    runs-on: windows-latest
    steps:
      - run: echo hi
"#,
        );

        let err = executor.run(&wf, None, "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedRuntime);
        assert_eq!(err.job(), Some("win"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_stops_job_and_still_removes_container() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, _) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  build:
    steps:
      - name: Broken
        run: exit 1
      - run: echo unreachable
"#,
        );

        let report = executor.run_with_report(&wf, None, "push").await;
        let err = report.error.as_ref().unwrap();

        assert_eq!(err.kind(), ErrorKind::StepExecutionFailed);
        match err {
            ExecutionError::StepFailed {
                job, step, name, command, ..
            } => {
                assert_eq!(job, "build");
                assert_eq!(*step, 1);
                assert_eq!(name, "Broken");
                assert_eq!(command.as_deref(), Some("exit 1"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(runner.count("exec"), 1);
        assert_eq!(runner.count("rm"), 1);
        assert_eq!(report.jobs[0].status, JobStatus::Failure);
        assert_eq!(report.jobs[0].steps.len(), 1);
    }

    #[tokio::test]
    async fn test_jobs_run_in_dependency_order_and_failure_aborts_the_rest() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, sink) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  deploy:
    needs: [test]
    steps:
      - run: echo deploy
  test:
    needs: build
    steps:
      - run: exit 2
  build:
    steps:
      - run: echo build
"#,
        );

        let report = executor.run_with_report(&wf, None, "push").await;

        assert_eq!(report.plan.order(), ["build", "test", "deploy"]);
        let ran: Vec<&str> = report.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ran, vec!["build", "test"]);
        assert_eq!(report.error.as_ref().and_then(|e| e.job()), Some("test"));
        assert!(!sink.stdout().contains("deploy"));
        assert_eq!(runner.count("create"), 2);
        assert_eq!(runner.count("rm"), 2);
    }

    #[tokio::test]
    async fn test_job_filter_runs_prerequisites_only() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, _) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  setup:
    steps:
      - run: echo setup
  lint:
    steps:
      - run: echo lint
  test:
    needs: setup
    steps:
      - run: echo test
"#,
        );

        let results = executor.run(&wf, Some("test"), "push").await.unwrap();
        let ran: Vec<&str> = results.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ran, vec!["setup", "test"]);

        let err = executor.run(&wf, Some("nope"), "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::JobNotFound);
    }

    #[tokio::test]
    async fn test_cycle_creates_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, _) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  a:
    needs: b
    steps:
      - run: echo a
  b:
    needs: a
    steps:
      - run: echo b
"#,
        );

        let err = executor.run(&wf, None, "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_still_cleans_up() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = ExecutionConfig {
            default_job_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (executor, _) = executor(&runner, config);
        let wf = workflow(
            r#"
jobs:
  slow:
    steps:
      - run: sleep 5
"#,
        );

        let err = executor.run(&wf, None, "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::JobTimedOut);
        assert_eq!(runner.count("rm"), 1);
    }

    #[tokio::test]
    async fn test_skipped_job_cascades_to_dependents() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, _) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
jobs:
  release:
    if: github.event_name == 'release'
    steps:
      - run: echo release
  publish:
    needs: release
    steps:
      - run: echo publish
  notify:
    needs: release
    if: always()
    steps:
      - run: echo notify
"#,
        );

        let results = executor.run(&wf, None, "push").await.unwrap();
        let statuses: Vec<(&str, JobStatus)> = results
            .iter()
            .map(|j| (j.job_id.as_str(), j.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("release", JobStatus::Skipped),
                ("publish", JobStatus::Skipped),
                ("notify", JobStatus::Success),
            ]
        );
        assert_eq!(runner.count("create"), 1);
    }

    #[tokio::test]
    async fn test_env_layers_reach_exec() {
        let runner = Arc::new(ScriptedRunner::new());
        let (executor, sink) = executor(&runner, ExecutionConfig::default());
        let wf = workflow(
            r#"
env:
  GREETING: workflow
jobs:
  build:
    env:
      GREETING: job
    steps:
      - run: echo $GREETING
      - run: echo $GREETING
        env:
          GREETING: step
      - uses: actions/checkout@v4
"#,
        );

        let results = executor.run(&wf, None, "push").await.unwrap();
        assert_eq!(sink.stdout(), "job\nstep");
        assert_eq!(results[0].steps[2].status, StepStatus::Skipped);
        let create = &runner.calls_to("create")[0];
        assert!(create.iter().any(|a| a == "GREETING=job"));
    }

    #[tokio::test]
    async fn test_workspace_mount_and_user() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = ExecutionConfig {
            workspace: Some(PathBuf::from("/src/project")),
            user: Some("1000:1000".to_string()),
            ..Default::default()
        };
        let (executor, _) = executor(&runner, config);
        let wf = workflow("jobs:\n  build:\n    steps:\n      - run: echo hi\n");

        executor.run(&wf, None, "push").await.unwrap();

        let create = runner.calls_to("create")[0].join(" ");
        assert!(create.contains("-v /src/project:/workspace"));
        assert!(create.contains("-w /workspace"));
        assert!(create.contains("-u 1000:1000"));
    }

    #[tokio::test]
    async fn test_parallel_levels() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = ExecutionConfig {
            parallel: true,
            ..Default::default()
        };
        let (executor, _) = executor(&runner, config);
        let wf = workflow(
            r#"
jobs:
  one:
    steps:
      - run: echo one
  two:
    steps:
      - run: echo two
  both:
    needs: [one, two]
    steps:
      - run: echo both
"#,
        );

        let results = executor.run(&wf, None, "push").await.unwrap();
        let ran: Vec<&str> = results.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ran, vec!["one", "two", "both"]);
        assert_eq!(runner.count("rm"), 3);

        let names: Vec<String> = runner
            .calls_to("create")
            .iter()
            .map(|args| args[2].clone())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("jobbox-")));
    }

    #[tokio::test]
    async fn test_no_runtime_and_pull_failure_are_reported() {
        let runner = Arc::new(ScriptedRunner::new());
        let manager = Arc::new(ContainerManager::new(
            RuntimeClient::unavailable(runner.clone()),
            Arc::new(BufferSink::new()),
        ));
        let executor = WorkflowExecutor::new(manager, ExecutionConfig::default());
        let wf = workflow("jobs:\n  build:\n    steps:\n      - run: echo hi\n");

        let err = executor.run(&wf, None, "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRuntimeAvailable);
        assert!(runner.calls().is_empty());

        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("pull", 125, "manifest unknown");
        let (executor, _) = executor_with(&runner);
        let err = executor.run(&wf, None, "push").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImagePullFailed);
        assert_eq!(runner.count("create"), 0);
    }

    fn executor_with(runner: &Arc<ScriptedRunner>) -> (WorkflowExecutor, Arc<BufferSink>) {
        executor(runner, ExecutionConfig::default())
    }

    struct PanickingSink;

    impl OutputSink for PanickingSink {
        fn write_line(&self, _stream: OutputStream, _line: &str) {
            panic!("sink exploded");
        }
    }

    #[tokio::test]
    async fn test_panic_in_job_still_removes_container() {
        let runner = Arc::new(ScriptedRunner::new());
        let client = RuntimeClient::with_binary("podman", runner.clone());
        let manager = Arc::new(ContainerManager::new(client, Arc::new(PanickingSink)));
        let executor = WorkflowExecutor::new(manager, ExecutionConfig::default());
        let wf = workflow("jobs:\n  build:\n    steps:\n      - run: echo boom\n");

        let joined = tokio::spawn(async move { executor.run(&wf, None, "push").await }).await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(runner.count("rm"), 1);
    }

    /// Panics only on lines containing `trigger`.
    struct TripwireSink {
        trigger: &'static str,
    }

    impl OutputSink for TripwireSink {
        fn write_line(&self, _stream: OutputStream, line: &str) {
            if line.contains(self.trigger) {
                panic!("sink tripped on {}", line);
            }
        }
    }

    #[tokio::test]
    async fn test_parallel_panic_releases_every_sibling() {
        let runner = Arc::new(ScriptedRunner::new());
        let client = RuntimeClient::with_binary("podman", runner.clone());
        let manager = Arc::new(ContainerManager::new(
            client,
            Arc::new(TripwireSink { trigger: "boom" }),
        ));
        let config = ExecutionConfig {
            parallel: true,
            ..Default::default()
        };
        let executor = WorkflowExecutor::new(manager.clone(), config);
        let wf = workflow(
            r#"
jobs:
  slow:
    steps:
      - run: sleep 0.3; echo ok
  loud:
    steps:
      - run: echo boom
"#,
        );

        let joined = tokio::spawn(async move { executor.run(&wf, None, "push").await }).await;

        assert!(joined.unwrap_err().is_panic());
        assert!(
            manager.live_containers().is_empty(),
            "left behind: {:?}",
            manager.live_containers()
        );
        assert_eq!(runner.count("rm"), 2);
        assert_eq!(runner.count("exec"), 2);
    }

    #[test]
    fn test_container_names_are_sanitized_and_unique() {
        let a = container_name("build/linux x64");
        let b = container_name("build/linux x64");
        assert!(a.starts_with("jobbox-build-linux-x64-"));
        assert_eq!(a.len(), "jobbox-build-linux-x64-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_plan_without_filter_covers_every_job() {
        let wf = workflow("jobs:\n  a:\n    steps:\n      - run: echo a\n  b:\n    needs: a\n    steps:\n      - run: echo b\n");
        assert_eq!(plan(&wf, None).unwrap().order(), ["a", "b"]);
        assert_eq!(plan(&wf, Some("")).unwrap().len(), 2);
        assert_eq!(plan(&wf, Some("a")).unwrap().order(), ["a"]);
    }
}
