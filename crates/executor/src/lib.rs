// executor crate

pub mod condition;
pub mod dependency;
pub mod engine;
pub mod environment;
pub mod error;
pub mod steps;

// Re-export public items
pub use dependency::{resolve, resolve_for, ExecutionPlan};
pub use engine::{
    plan, ExecutionConfig, ExecutionResult, JobResult, JobStatus, WorkflowExecutor,
};
pub use error::{ErrorKind, ExecutionError};
pub use steps::{StepResult, StepStatus};
