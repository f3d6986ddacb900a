use crate::container::ContainerConfig;
use crate::process::{OutputSink, ProcessOutput, ProcessRunner, SystemProcessRunner};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Keeps a container alive between execs so every step of a job shares it.
pub const KEEPALIVE_COMMAND: [&str; 3] = ["tail", "-f", "/dev/null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Podman,
    Docker,
}

/// Detection order: the first binary found on `PATH` wins.
pub const RUNTIME_PREFERENCE: [RuntimeKind; 2] = [RuntimeKind::Podman, RuntimeKind::Docker];

impl RuntimeKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            RuntimeKind::Podman => "podman",
            RuntimeKind::Docker => "docker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RUNTIME_PREFERENCE
            .into_iter()
            .find(|kind| kind.binary_name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no container CLI found: please install podman or docker")]
    NoRuntimeAvailable,

    #[error("command failed: {command}: {message}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Diagnostic text from the runtime, if the command ran at all.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::CommandFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Thin wrapper over the container CLI. Holds the detected binary; every
/// operation fails with `NoRuntimeAvailable` when there is none.
pub struct RuntimeClient {
    binary: Option<PathBuf>,
    runner: Arc<dyn ProcessRunner>,
}

impl RuntimeClient {
    /// Probe `PATH` for a runtime and spawn real processes.
    pub fn detect() -> Self {
        Self::detect_with(Arc::new(SystemProcessRunner))
    }

    pub fn detect_with(runner: Arc<dyn ProcessRunner>) -> Self {
        for kind in RUNTIME_PREFERENCE {
            if let Ok(path) = which::which(kind.binary_name()) {
                logging::debug(&format!("Detected container runtime: {}", path.display()));
                return Self::with_binary(path, runner);
            }
        }

        logging::debug("No container runtime found on PATH");
        Self::unavailable(runner)
    }

    /// Use one specific runtime; unavailable if its binary is not on `PATH`.
    pub fn for_kind(kind: RuntimeKind, runner: Arc<dyn ProcessRunner>) -> Self {
        match which::which(kind.binary_name()) {
            Ok(path) => Self::with_binary(path, runner),
            Err(_) => {
                logging::warning(&format!("Requested runtime '{}' was not found on PATH", kind));
                Self::unavailable(runner)
            }
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        RuntimeClient {
            binary: Some(binary.into()),
            runner,
        }
    }

    pub fn unavailable(runner: Arc<dyn ProcessRunner>) -> Self {
        RuntimeClient {
            binary: None,
            runner,
        }
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn require_binary(&self) -> Result<&Path, ClientError> {
        self.binary().ok_or(ClientError::NoRuntimeAvailable)
    }

    fn describe(binary: &Path, args: &[String]) -> String {
        format!("{} {}", binary.display(), args.join(" "))
    }

    /// Run a CLI command to completion; a non-zero exit is an error.
    async fn capture(&self, args: Vec<String>) -> Result<ProcessOutput, ClientError> {
        let binary = self.require_binary()?;
        let command = Self::describe(binary, &args);
        logging::debug(&format!("exec: {}", command));

        let output = self
            .runner
            .output(binary, &args)
            .await
            .map_err(|source| ClientError::Spawn {
                program: binary.display().to_string(),
                source,
            })?;

        if output.success() {
            Ok(output)
        } else {
            Err(ClientError::CommandFailed {
                command,
                exit_code: output.exit_code,
                message: output.diagnostic(),
            })
        }
    }

    pub async fn pull(&self, image: &str) -> Result<(), ClientError> {
        self.capture(vec!["pull".to_string(), image.to_string()])
            .await
            .map(|_| ())
    }

    /// Create a stopped container and return whatever the runtime printed
    /// as its id (possibly empty).
    pub async fn create(
        &self,
        name: &str,
        image: &str,
        config: &ContainerConfig,
    ) -> Result<String, ClientError> {
        let output = self.capture(create_args(name, image, config)).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn start(&self, id: &str) -> Result<(), ClientError> {
        self.capture(vec!["start".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }

    /// Run `command` through a login shell inside the container, streaming
    /// its output to `sink`. A non-zero exit is reported in the returned
    /// output, not as an error.
    pub async fn exec(
        &self,
        id: &str,
        command: &str,
        env: &[(String, String)],
        sink: &dyn OutputSink,
    ) -> Result<ProcessOutput, ClientError> {
        let binary = self.require_binary()?;
        let args = exec_args(id, command, env);
        logging::debug(&format!("exec: {}", Self::describe(binary, &args)));

        self.runner
            .stream(binary, &args, sink)
            .await
            .map_err(|source| ClientError::Spawn {
                program: binary.display().to_string(),
                source,
            })
    }

    pub async fn stop(&self, id: &str) -> Result<(), ClientError> {
        self.capture(vec!["stop".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }

    /// Force-remove, whatever state the container is in.
    pub async fn remove(&self, id: &str) -> Result<(), ClientError> {
        self.capture(vec!["rm".to_string(), "-f".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }
}

pub fn create_args(name: &str, image: &str, config: &ContainerConfig) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];

    for (key, value) in &config.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for volume in &config.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    if let Some(dir) = &config.working_dir {
        args.push("-w".to_string());
        args.push(dir.clone());
    }
    if let Some(user) = &config.user {
        args.push("-u".to_string());
        args.push(user.clone());
    }

    args.push(image.to_string());
    args.extend(KEEPALIVE_COMMAND.iter().map(|s| s.to_string()));
    args
}

pub fn exec_args(id: &str, command: &str, env: &[(String, String)]) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-i".to_string()];
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(id.to_string());
    args.push("sh".to_string());
    args.push("-lc".to_string());
    args.push(command.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_runtime_kind_from_name() {
        assert_eq!(RuntimeKind::from_name("podman"), Some(RuntimeKind::Podman));
        assert_eq!(RuntimeKind::from_name(" Docker "), Some(RuntimeKind::Docker));
        assert_eq!(RuntimeKind::from_name("containerd"), None);
    }

    #[test]
    fn test_create_args_carry_config_and_keepalive() {
        let config = ContainerConfig {
            env: vec![("FOO".to_string(), "bar".to_string())],
            volumes: vec!["/host:/workspace:ro".to_string()],
            working_dir: Some("/workspace".to_string()),
            user: Some("1000:1000".to_string()),
        };

        let args = create_args("job-build", "ubuntu:22.04", &config);
        assert_eq!(
            args,
            vec![
                "create", "--name", "job-build", "-e", "FOO=bar", "-v", "/host:/workspace:ro",
                "-w", "/workspace", "-u", "1000:1000", "ubuntu:22.04", "tail", "-f", "/dev/null"
            ]
        );
    }

    #[test]
    fn test_exec_args_use_login_shell() {
        let env = vec![("A".to_string(), "1".to_string())];
        let args = exec_args("abc123", "echo hello && ls", &env);
        assert_eq!(
            args,
            vec!["exec", "-i", "-e", "A=1", "abc123", "sh", "-lc", "echo hello && ls"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_client_never_spawns() {
        let runner = Arc::new(ScriptedRunner::new());
        let client = RuntimeClient::unavailable(runner.clone());

        let err = client.pull("ubuntu:22.04").await.unwrap_err();
        assert!(matches!(err, ClientError::NoRuntimeAvailable));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_command_carries_cli_diagnostic() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("pull", 1, "manifest unknown");
        let client = RuntimeClient::with_binary("podman", runner);

        let err = client.pull("nope:latest").await.unwrap_err();
        match err {
            ClientError::CommandFailed {
                command,
                exit_code,
                message,
            } => {
                assert_eq!(command, "podman pull nope:latest");
                assert_eq!(exit_code, Some(1));
                assert_eq!(message, "manifest unknown");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_create_returns_last_stdout_line() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.succeed("create", "Trying to pull...\nabcdef012345\n");
        let client = RuntimeClient::with_binary("podman", runner);

        let id = client
            .create("name", "ubuntu:22.04", &ContainerConfig::default())
            .await
            .unwrap();
        assert_eq!(id, "abcdef012345");
    }
}
