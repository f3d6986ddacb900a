use models::ValidationResult;

/// Accepts `owner/repo@ref`, `owner/repo/path@ref`, `./local/path` and
/// `docker://image`.
pub fn validate_action_reference(
    action_ref: &str,
    job_id: &str,
    step_idx: usize,
    result: &mut ValidationResult,
) {
    if let Some(image) = action_ref.strip_prefix("docker://") {
        if image.trim().is_empty() {
            result.add_issue(format!(
                "Job '{}', step {}: Docker action '{}' names no image",
                job_id,
                step_idx + 1,
                action_ref
            ));
        }
        return;
    }

    if action_ref.starts_with("./") {
        // The working directory may not be the repository root, so only warn.
        if !std::path::Path::new(action_ref).exists() {
            result.add_warning(format!(
                "Job '{}', step {}: Local action path '{}' may not exist at runtime",
                job_id,
                step_idx + 1,
                action_ref
            ));
        }
        return;
    }

    let (path, version) = match action_ref.split_once('@') {
        Some((path, version)) => (path, Some(version)),
        None => (action_ref, None),
    };

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.trim().is_empty()) {
        result.add_issue(format!(
            "Job '{}', step {}: Invalid action reference format '{}'",
            job_id,
            step_idx + 1,
            action_ref
        ));
        return;
    }

    match version {
        Some(version) if version.is_empty() || version.contains('@') => {
            result.add_issue(format!(
                "Job '{}', step {}: Action '{}' has invalid version/ref format",
                job_id,
                step_idx + 1,
                action_ref
            ));
        }
        Some(_) => {}
        None => {
            result.add_warning(format!(
                "Job '{}', step {}: Action '{}' is missing version tag (@v2, @main, etc.)",
                job_id,
                step_idx + 1,
                action_ref
            ));
        }
    }
}
