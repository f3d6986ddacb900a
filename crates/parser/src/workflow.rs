use indexmap::IndexMap;
use models::{EnvMap, JobSpec, StepSpec, WorkflowDocument, DEFAULT_RUNS_ON};
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read workflow file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow structure: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidField { field: String, message: String },
}

/// A field that may be written as a single string or as a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    on: Option<Value>,
    #[serde(default)]
    env: IndexMap<String, Value>,
    #[serde(default)]
    jobs: IndexMap<String, RawJob>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "runs-on", default)]
    runs_on: Option<OneOrMany>,
    #[serde(default)]
    needs: Option<OneOrMany>,
    #[serde(default)]
    env: IndexMap<String, Value>,
    #[serde(rename = "if", default)]
    condition: Option<Value>,
    #[serde(rename = "timeout-minutes", default)]
    timeout_minutes: Option<u64>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uses: Option<String>,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    with: IndexMap<String, Value>,
    #[serde(default)]
    env: IndexMap<String, Value>,
    #[serde(rename = "if", default)]
    condition: Option<Value>,
}

pub fn parse_workflow(path: &Path) -> Result<WorkflowDocument, ParseError> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_str(&content)
}

/// Parse workflow YAML text into a normalized document.
pub fn parse_str(content: &str) -> Result<WorkflowDocument, ParseError> {
    let raw: RawWorkflow = serde_yaml::from_str(content)?;

    let triggers = match &raw.on {
        Some(on) => normalize_triggers(on)?,
        None => Vec::new(),
    };

    let mut jobs = IndexMap::with_capacity(raw.jobs.len());
    for (job_id, job) in raw.jobs {
        let spec = normalize_job(&job_id, job)?;
        jobs.insert(job_id, spec);
    }

    Ok(WorkflowDocument {
        name: raw.name.unwrap_or_default(),
        triggers,
        env: normalize_env("env", raw.env)?,
        jobs,
    })
}

fn normalize_job(job_id: &str, job: RawJob) -> Result<JobSpec, ParseError> {
    let field = |name: &str| format!("jobs.{}.{}", job_id, name);

    let runs_on = match job.runs_on {
        Some(OneOrMany::One(label)) => label,
        Some(OneOrMany::Many(labels)) => labels
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_RUNS_ON.to_string()),
        Some(OneOrMany::Other(_)) | None => DEFAULT_RUNS_ON.to_string(),
    };

    let needs = match job.needs {
        Some(OneOrMany::One(need)) => vec![need],
        Some(OneOrMany::Many(needs)) => needs,
        Some(OneOrMany::Other(Value::Null)) | None => Vec::new(),
        Some(OneOrMany::Other(other)) => {
            return Err(ParseError::InvalidField {
                field: field("needs"),
                message: format!("expected a job id or a list of job ids, got {:?}", other),
            })
        }
    };

    let steps = job
        .steps
        .into_iter()
        .enumerate()
        .map(|(idx, step)| normalize_step(&format!("jobs.{}.steps[{}]", job_id, idx), step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(JobSpec {
        name: job.name,
        runs_on,
        needs,
        env: normalize_env(&field("env"), job.env)?,
        condition: normalize_condition(&field("if"), job.condition)?,
        timeout_minutes: job.timeout_minutes,
        steps,
    })
}

fn normalize_step(prefix: &str, step: RawStep) -> Result<StepSpec, ParseError> {
    Ok(StepSpec {
        name: step.name,
        uses: step.uses,
        run: step.run,
        with: step.with,
        env: normalize_env(&format!("{}.env", prefix), step.env)?,
        condition: normalize_condition(&format!("{}.if", prefix), step.condition)?,
    })
}

fn normalize_env(field: &str, env: IndexMap<String, Value>) -> Result<EnvMap, ParseError> {
    env.into_iter()
        .map(|(key, value)| {
            let value = scalar_to_string(&value).ok_or_else(|| ParseError::InvalidField {
                field: format!("{}.{}", field, key),
                message: "environment values must be scalars".to_string(),
            })?;
            Ok((key, value))
        })
        .collect()
}

fn normalize_condition(field: &str, condition: Option<Value>) -> Result<Option<String>, ParseError> {
    match condition {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| ParseError::InvalidField {
                field: field.to_string(),
                message: "condition must be an expression string".to_string(),
            }),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn normalize_triggers(on_value: &Value) -> Result<Vec<String>, ParseError> {
    let mut triggers = Vec::new();

    match on_value {
        // on: push
        Value::String(event) => triggers.push(event.clone()),
        // on: [push, pull_request]
        Value::Sequence(events) => {
            triggers.extend(events.iter().filter_map(|e| e.as_str().map(str::to_string)))
        }
        // on: {push: {branches: [main]}}
        Value::Mapping(events) => {
            triggers.extend(events.keys().filter_map(|e| e.as_str().map(str::to_string)))
        }
        _ => {
            return Err(ParseError::InvalidField {
                field: "on".to_string(),
                message: "expected an event name, a list or a mapping".to_string(),
            })
        }
    }

    Ok(triggers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_runs_on_and_needs_are_normalized() {
        let doc = parse_str(
            r#"
name: CI
on: [push, pull_request]
jobs:
  lint:
    runs-on: [ubuntu-22.04, self-hosted]
    steps:
      - run: make lint
  test:
    needs: lint
    steps:
      - run: make test
  release:
    runs-on: ubuntu-latest
    needs: [lint, test]
    steps:
      - uses: actions/checkout@v4
"#,
        )
        .unwrap();

        assert_eq!(doc.name, "CI");
        assert_eq!(doc.triggers, vec!["push", "pull_request"]);

        let ids: Vec<&str> = doc.job_ids().collect();
        assert_eq!(ids, vec!["lint", "test", "release"]);

        assert_eq!(doc.jobs["lint"].runs_on(), "ubuntu-22.04");
        assert!(doc.jobs["lint"].needs().is_empty());
        assert_eq!(doc.jobs["test"].runs_on(), DEFAULT_RUNS_ON);
        assert_eq!(doc.jobs["test"].needs(), ["lint".to_string()]);
        assert_eq!(doc.jobs["release"].needs(), ["lint".to_string(), "test".to_string()]);
    }

    #[test]
    fn test_triggers_from_mapping() {
        let doc = parse_str(
            r#"
on:
  push:
    branches: [main]
  workflow_dispatch:
jobs: {}
"#,
        )
        .unwrap();
        assert_eq!(doc.triggers, vec!["push", "workflow_dispatch"]);
    }

    #[test]
    fn test_scalar_env_and_conditions_are_stringified() {
        let doc = parse_str(
            r#"
env:
  RETRIES: 3
jobs:
  build:
    runs-on: ubuntu-latest
    if: false
    timeout-minutes: 5
    env:
      DEBUG: true
    steps:
      - name: Greet
        run: echo "$GREETING"
        env:
          GREETING: hello
        if: github.event_name == 'push'
"#,
        )
        .unwrap();

        assert_eq!(doc.env["RETRIES"], "3");
        let job = &doc.jobs["build"];
        assert_eq!(job.env["DEBUG"], "true");
        assert_eq!(job.condition.as_deref(), Some("false"));
        assert_eq!(job.timeout_minutes, Some(5));
        assert_eq!(job.steps[0].env["GREETING"], "hello");
        assert_eq!(
            job.steps[0].condition.as_deref(),
            Some("github.event_name == 'push'")
        );
    }

    #[test]
    fn test_nested_env_value_is_rejected() {
        let err = parse_str(
            r#"
jobs:
  build:
    env:
      NESTED:
        key: value
    steps: []
"#,
        )
        .unwrap_err();

        match err {
            ParseError::InvalidField { field, .. } => assert_eq!(field, "jobs.build.env.NESTED"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_needs_is_rejected() {
        let err = parse_str(
            r#"
jobs:
  build:
    needs: {other: true}
    steps: []
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("jobs.build.needs"));
    }

    #[test]
    fn test_parse_workflow_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: From disk\njobs:\n  hello:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hello"
        )
        .unwrap();

        let doc = parse_workflow(file.path()).unwrap();
        assert_eq!(doc.name, "From disk");
        assert_eq!(doc.jobs["hello"].steps[0].command(), Some("echo hello"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = parse_workflow(Path::new("/nonexistent/workflow.yml")).unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/workflow.yml"));
    }
}
