use indexmap::IndexMap;
use serde::Serialize;

/// Environment variables in declaration order.
pub type EnvMap = IndexMap<String, String>;

/// Runner label used when a job does not declare `runs-on`.
pub const DEFAULT_RUNS_ON: &str = "ubuntu-latest";

/// A loaded workflow. Polymorphic fields have already been normalized by the
/// parser, so nothing downstream inspects raw YAML shapes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowDocument {
    pub name: String,

    /// Event names from `on`, whether it was declared as a string, a list or a mapping.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: EnvMap,

    /// Job id => job, in document order.
    pub jobs: IndexMap<String, JobSpec>,
}

impl WorkflowDocument {
    pub fn job(&self, job_id: &str) -> Option<&JobSpec> {
        self.jobs.get(job_id)
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSpec {
    /// Display name; the job id is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "runs-on")]
    pub runs_on: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: EnvMap,

    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(rename = "timeout-minutes", skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,

    pub steps: Vec<StepSpec>,
}

impl JobSpec {
    pub fn runs_on(&self) -> &str {
        &self.runs_on
    }

    pub fn needs(&self) -> &[String] {
        &self.needs
    }

    pub fn display_name<'a>(&'a self, job_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(job_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Reference to a reusable action. Recognized, never executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub with: IndexMap<String, serde_yaml::Value>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: EnvMap,

    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl StepSpec {
    /// Label for logs and reports: explicit name, then the command or action, then the index.
    pub fn label(&self, index: usize) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(run) = &self.run {
            let first_line = run.lines().next().unwrap_or_default().trim();
            if !first_line.is_empty() {
                return format!("Run {}", first_line);
            }
        }
        if let Some(uses) = &self.uses {
            return format!("Uses {}", uses);
        }
        format!("Step {}", index)
    }

    /// The shell command, if the step has a non-blank one.
    pub fn command(&self) -> Option<&str> {
        self.run.as_deref().filter(|run| !run.trim().is_empty())
    }
}

pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            is_valid: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_issue(&mut self, issue: String) {
        self.is_valid = false;
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Turn every warning into an issue.
    pub fn promote_warnings(&mut self) {
        for warning in std::mem::take(&mut self.warnings) {
            self.add_issue(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_label_prefers_name_then_command() {
        let named = StepSpec {
            name: Some("Build".to_string()),
            run: Some("make".to_string()),
            ..Default::default()
        };
        assert_eq!(named.label(1), "Build");

        let unnamed = StepSpec {
            run: Some("echo one\necho two".to_string()),
            ..Default::default()
        };
        assert_eq!(unnamed.label(2), "Run echo one");

        let action = StepSpec {
            uses: Some("actions/checkout@v4".to_string()),
            ..Default::default()
        };
        assert_eq!(action.label(3), "Uses actions/checkout@v4");
        assert_eq!(StepSpec::default().label(4), "Step 4");
    }

    #[test]
    fn test_blank_run_is_not_a_command() {
        let step = StepSpec {
            run: Some("   \n".to_string()),
            ..Default::default()
        };
        assert!(step.command().is_none());
    }

    #[test]
    fn test_promote_warnings() {
        let mut result = ValidationResult::new();
        result.add_warning("workflow has no name".to_string());
        assert!(result.is_valid);

        result.promote_warnings();
        assert!(!result.is_valid);
        assert_eq!(result.issues, vec!["workflow has no name".to_string()]);
        assert!(result.warnings.is_empty());
    }
}
