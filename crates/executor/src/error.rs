use runtime::ContainerError;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownDependency,
    CycleDetected,
    NoRuntimeAvailable,
    UnsupportedRuntime,
    ImagePullFailed,
    ContainerStartFailed,
    StepExecutionFailed,
    JobTimedOut,
    JobNotFound,
    /// Any other runtime failure (exec could not be launched, invalid lifecycle use).
    Runtime,
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Job '{job}' depends on non-existent job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Circular dependency detected between jobs: {}", .jobs.join(" -> "))]
    CycleDetected { jobs: Vec<String> },

    #[error("Job '{0}' not found in workflow")]
    JobNotFound(String),

    #[error("Job '{job}': unsupported runs-on '{label}'")]
    UnsupportedRuntime { job: String, label: String },

    #[error("Job '{job}': {source}")]
    Container {
        job: String,
        #[source]
        source: ContainerError,
    },

    #[error("Job '{job}' failed at step {step} ({name}): {source}")]
    StepFailed {
        job: String,
        /// 1-based
        step: usize,
        name: String,
        command: Option<String>,
        #[source]
        source: ContainerError,
    },

    #[error("Job '{job}' timed out after {}s", .timeout.as_secs_f64())]
    JobTimedOut { job: String, timeout: Duration },
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::UnknownDependency { .. } => ErrorKind::UnknownDependency,
            ExecutionError::CycleDetected { .. } => ErrorKind::CycleDetected,
            ExecutionError::JobNotFound(_) => ErrorKind::JobNotFound,
            ExecutionError::UnsupportedRuntime { .. } => ErrorKind::UnsupportedRuntime,
            ExecutionError::JobTimedOut { .. } => ErrorKind::JobTimedOut,
            ExecutionError::Container { source, .. } | ExecutionError::StepFailed { source, .. } => {
                container_kind(source)
            }
        }
    }

    /// The job the error belongs to, when there is one.
    pub fn job(&self) -> Option<&str> {
        match self {
            ExecutionError::UnknownDependency { job, .. }
            | ExecutionError::UnsupportedRuntime { job, .. }
            | ExecutionError::Container { job, .. }
            | ExecutionError::StepFailed { job, .. }
            | ExecutionError::JobTimedOut { job, .. } => Some(job.as_str()),
            ExecutionError::JobNotFound(job) => Some(job.as_str()),
            ExecutionError::CycleDetected { .. } => None,
        }
    }
}

fn container_kind(err: &ContainerError) -> ErrorKind {
    match err {
        ContainerError::NoRuntimeAvailable => ErrorKind::NoRuntimeAvailable,
        ContainerError::UnsupportedRuntime(_) => ErrorKind::UnsupportedRuntime,
        ContainerError::ImagePullFailed { .. } => ErrorKind::ImagePullFailed,
        ContainerError::ContainerCreateFailed { .. } | ContainerError::ContainerStartFailed { .. } => {
            ErrorKind::ContainerStartFailed
        }
        ContainerError::StepExecutionFailed { .. } => ErrorKind::StepExecutionFailed,
        _ => ErrorKind::Runtime,
    }
}
