use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::Path;

const WORKFLOW_SCHEMA: &str = include_str!("../../../schemas/workflow.json");

/// Structural check of raw workflow YAML against the bundled JSON schema.
pub struct SchemaValidator {
    schema: JSONSchema,
}

impl SchemaValidator {
    pub fn new() -> Result<Self, String> {
        let schema_json: Value = serde_json::from_str(WORKFLOW_SCHEMA)
            .map_err(|e| format!("Failed to parse workflow schema: {}", e))?;

        let schema = JSONSchema::compile(&schema_json)
            .map_err(|e| format!("Failed to compile JSON schema: {}", e))?;

        Ok(Self { schema })
    }

    pub fn validate_workflow(&self, workflow_path: &Path) -> Result<(), Vec<String>> {
        let content = fs::read_to_string(workflow_path)
            .map_err(|e| vec![format!("Failed to read workflow file: {}", e)])?;

        self.validate_str(&content)
    }

    /// Returns one message per schema violation.
    pub fn validate_str(&self, content: &str) -> Result<(), Vec<String>> {
        let workflow_json: Value = serde_yaml::from_str(content)
            .map_err(|e| vec![format!("Failed to parse workflow YAML: {}", e)])?;

        if let Err(errors) = self.schema.validate(&workflow_json) {
            return Err(errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect());
        }

        Ok(())
    }
}
