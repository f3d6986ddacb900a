use crate::container::ContainerError;

/// Runner label => image. Labels are matched exactly after trimming.
const RUNNER_IMAGES: &[(&str, &str)] = &[
    ("ubuntu-latest", "ubuntu:22.04"),
    ("ubuntu-24.04", "ubuntu:24.04"),
    ("ubuntu-22.04", "ubuntu:22.04"),
    ("ubuntu-20.04", "ubuntu:20.04"),
];

pub fn map_runs_on(label: &str) -> Result<&'static str, ContainerError> {
    let label = label.trim();
    RUNNER_IMAGES
        .iter()
        .find(|(runner, _)| *runner == label)
        .map(|(_, image)| *image)
        .ok_or_else(|| ContainerError::UnsupportedRuntime(label.to_string()))
}

pub fn supported_labels() -> impl Iterator<Item = &'static str> {
    RUNNER_IMAGES.iter().map(|(runner, _)| *runner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_labels() {
        assert_eq!(map_runs_on("ubuntu-latest").unwrap(), "ubuntu:22.04");
        assert_eq!(map_runs_on(" ubuntu-20.04 ").unwrap(), "ubuntu:20.04");
        assert_eq!(map_runs_on("ubuntu-24.04").unwrap(), "ubuntu:24.04");
    }

    #[test]
    fn test_unmapped_label_is_unsupported() {
        match map_runs_on("windows-latest") {
            Err(ContainerError::UnsupportedRuntime(label)) => assert_eq!(label, "windows-latest"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_supported_labels_listed() {
        assert!(supported_labels().any(|l| l == "ubuntu-latest"));
    }
}
