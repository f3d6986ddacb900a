use crate::client::{ClientError, RuntimeClient};
use crate::process::{OutputSink, ProcessOutput};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Settings fixed at creation time for the whole life of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    pub env: Vec<(String, String)>,
    /// `host:container[:options]` bind specifications.
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("no container CLI found: please install podman or docker")]
    NoRuntimeAvailable,

    #[error("unsupported runs-on: {0}")]
    UnsupportedRuntime(String),

    #[error("failed to pull image {image}: {message}")]
    ImagePullFailed { image: String, message: String },

    #[error("failed to create container {name} from image {image}: {message}")]
    ContainerCreateFailed {
        name: String,
        image: String,
        message: String,
    },

    #[error("failed to start container {id}: {message}")]
    ContainerStartFailed { id: String, message: String },

    #[error("command exited with {} in container {id}{}", exit_label(.exit_code), stderr_suffix(.stderr))]
    StepExecutionFailed {
        id: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to exec in container {id}: {message}")]
    ExecFailed { id: String, message: String },

    #[error("failed to stop container {id}: {message}")]
    StopFailed { id: String, message: String },

    #[error("failed to remove container {id}: {message}")]
    RemoveFailed { id: String, message: String },

    #[error("container {name} cannot go from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: ContainerState,
        to: ContainerState,
    },

    #[error("container name must not be empty")]
    InvalidHandle,
}

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit status {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", stderr.trim())
    }
}

/// Map a client failure into a lifecycle error, keeping `NoRuntimeAvailable` as is.
fn lifecycle_error(err: ClientError, wrap: impl FnOnce(String) -> ContainerError) -> ContainerError {
    match err {
        ClientError::NoRuntimeAvailable => ContainerError::NoRuntimeAvailable,
        other => wrap(other.to_string()),
    }
}

fn is_missing(err: &ClientError) -> bool {
    err.message()
        .map(|m| {
            let m = m.to_lowercase();
            m.contains("no such container") || m.contains("no container with name or id")
        })
        .unwrap_or(false)
}

fn is_not_running(err: &ClientError) -> bool {
    is_missing(err)
        || err
            .message()
            .map(|m| {
                let m = m.to_lowercase();
                m.contains("not running") || m.contains("is stopped")
            })
            .unwrap_or(false)
}

/// `Absent → Pulling → Created → Started → Stopped → Removed`; `Removed` is
/// also reachable straight from `Created` and `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Pulling,
    Created,
    Started,
    Stopped,
    Removed,
}

impl ContainerState {
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Absent | Removed, Pulling)
                | (Pulling, Created)
                | (Created, Started)
                | (Started, Stopped)
                | (Created | Started | Stopped, Removed)
        )
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContainerState::Absent => "absent",
            ContainerState::Pulling => "pulling",
            ContainerState::Created => "created",
            ContainerState::Started => "started",
            ContainerState::Stopped => "stopped",
            ContainerState::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// Identifier of a container owned by one job's execution window.
#[derive(Debug, PartialEq, Eq)]
pub struct ContainerHandle {
    id: String,
    name: String,
}

impl ContainerHandle {
    /// Runtimes that do not echo an id are addressed by name instead.
    pub fn new(id: &str, name: &str) -> Result<Self, ContainerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContainerError::InvalidHandle);
        }
        let id = match id.trim() {
            "" => name,
            id => id,
        };
        Ok(ContainerHandle {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

struct Tracked {
    id: Option<String>,
    state: ContainerState,
}

/// Typed container lifecycle on top of [`RuntimeClient`].
///
/// Every container it creates is tracked by name until removed, so
/// [`ContainerManager::cleanup_all`] can release whatever is left after an
/// interrupted run.
pub struct ContainerManager {
    client: RuntimeClient,
    sink: Arc<dyn OutputSink>,
    tracked: Mutex<IndexMap<String, Tracked>>,
}

impl ContainerManager {
    pub fn new(client: RuntimeClient, sink: Arc<dyn OutputSink>) -> Self {
        ContainerManager {
            client,
            sink,
            tracked: Mutex::new(IndexMap::new()),
        }
    }

    pub fn client(&self) -> &RuntimeClient {
        &self.client
    }

    /// A panic elsewhere must not hide which containers are still alive, so
    /// a poisoned lock is recovered rather than reported.
    fn lock_tracked(&self) -> MutexGuard<'_, IndexMap<String, Tracked>> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self, name: &str) -> ContainerState {
        self.lock_tracked()
            .get(name)
            .map(|t| t.state)
            .unwrap_or(ContainerState::Absent)
    }

    /// Names of containers that are not yet removed.
    pub fn live_containers(&self) -> Vec<String> {
        self.lock_tracked()
            .iter()
            .filter(|(_, t)| t.state != ContainerState::Removed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn transition(
        &self,
        name: &str,
        next: ContainerState,
        id: Option<&str>,
    ) -> Result<(), ContainerError> {
        let mut tracked = self.lock_tracked();
        let entry = tracked.entry(name.to_string()).or_insert(Tracked {
            id: None,
            state: ContainerState::Absent,
        });

        if !entry.state.can_transition_to(next) {
            return Err(ContainerError::InvalidTransition {
                name: name.to_string(),
                from: entry.state,
                to: next,
            });
        }

        entry.state = next;
        if let Some(id) = id {
            entry.id = Some(id.to_string());
        }
        Ok(())
    }

    fn forget(&self, name: &str) {
        self.lock_tracked().shift_remove(name);
    }

    /// Pull `image`, create a container that stays alive between commands,
    /// and start it. A container that fails to start is removed before the
    /// error is returned.
    pub async fn create_container(
        &self,
        image: &str,
        name: &str,
        config: &ContainerConfig,
    ) -> Result<ContainerHandle, ContainerError> {
        if !self.client.is_available() {
            return Err(ContainerError::NoRuntimeAvailable);
        }
        if name.trim().is_empty() {
            return Err(ContainerError::InvalidHandle);
        }

        logging::info(&format!("Creating container: {} (image: {})", name, image));
        self.transition(name, ContainerState::Pulling, None)?;

        if let Err(e) = self.client.pull(image).await {
            self.forget(name);
            return Err(lifecycle_error(e, |message| ContainerError::ImagePullFailed {
                image: image.to_string(),
                message,
            }));
        }

        let echoed_id = match self.client.create(name, image, config).await {
            Ok(id) => id,
            Err(e) => {
                self.forget(name);
                return Err(lifecycle_error(e, |message| {
                    ContainerError::ContainerCreateFailed {
                        name: name.to_string(),
                        image: image.to_string(),
                        message,
                    }
                }));
            }
        };
        let handle = ContainerHandle::new(&echoed_id, name)?;
        self.transition(name, ContainerState::Created, Some(handle.id()))?;

        if let Err(e) = self.client.start(handle.id()).await {
            logging::warning(&format!(
                "Container {} failed to start, removing it",
                handle.id()
            ));
            match self.client.remove(handle.id()).await {
                Ok(()) => {
                    let _ = self.transition(name, ContainerState::Removed, None);
                }
                Err(rm) => logging::warning(&format!(
                    "Failed to remove container {} after start failure: {}",
                    handle.id(),
                    rm
                )),
            }
            return Err(lifecycle_error(e, |message| {
                ContainerError::ContainerStartFailed {
                    id: handle.id().to_string(),
                    message,
                }
            }));
        }
        self.transition(name, ContainerState::Started, None)?;

        logging::info(&format!(
            "Container {} started (via {})",
            handle.id(),
            self.client
                .binary()
                .map(|b| b.display().to_string())
                .unwrap_or_default()
        ));
        Ok(handle)
    }

    /// Run `command` in the container through `sh -lc`, streaming its output.
    /// A non-zero exit becomes `StepExecutionFailed` with the captured stderr.
    pub async fn run_command(
        &self,
        handle: &ContainerHandle,
        command: &str,
        env: &[(String, String)],
    ) -> Result<ProcessOutput, ContainerError> {
        let state = self.state(handle.name());
        if state != ContainerState::Started {
            return Err(ContainerError::InvalidTransition {
                name: handle.name().to_string(),
                from: state,
                to: ContainerState::Started,
            });
        }

        logging::info(&format!("Running command in {}: {}", handle.id(), command));
        let output = self
            .client
            .exec(handle.id(), command, env, self.sink.as_ref())
            .await
            .map_err(|e| {
                lifecycle_error(e, |message| ContainerError::ExecFailed {
                    id: handle.id().to_string(),
                    message,
                })
            })?;

        if output.success() {
            Ok(output)
        } else {
            Err(ContainerError::StepExecutionFailed {
                id: handle.id().to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Stop a started container. Stopping one that is not running is not an error.
    pub async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        if self.state(handle.name()) != ContainerState::Started {
            return Ok(());
        }

        logging::info(&format!("Stopping container: {}", handle.id()));
        match self.client.stop(handle.id()).await {
            Ok(()) => {}
            Err(e) if is_not_running(&e) => {
                logging::debug(&format!("Container {} was not running", handle.id()));
            }
            Err(e) => {
                return Err(lifecycle_error(e, |message| ContainerError::StopFailed {
                    id: handle.id().to_string(),
                    message,
                }))
            }
        }
        self.transition(handle.name(), ContainerState::Stopped, None)
    }

    /// Stop (best effort) and force-remove. Removing a container that is
    /// already gone succeeds.
    pub async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        match self.state(handle.name()) {
            ContainerState::Removed | ContainerState::Absent => return Ok(()),
            // Nothing exists yet while the image is still being pulled.
            ContainerState::Pulling => {
                logging::debug(&format!(
                    "Container {} was never created, nothing to remove",
                    handle.name()
                ));
                return Ok(());
            }
            ContainerState::Started => {
                if let Err(e) = self.stop_container(handle).await {
                    logging::debug(&format!("Ignoring stop failure before removal: {}", e));
                }
            }
            _ => {}
        }

        logging::info(&format!("Removing container: {}", handle.id()));
        match self.client.remove(handle.id()).await {
            Ok(()) => {}
            Err(e) if is_missing(&e) => {
                logging::debug(&format!("Container {} was already gone", handle.id()));
            }
            Err(e) => {
                return Err(lifecycle_error(e, |message| ContainerError::RemoveFailed {
                    id: handle.id().to_string(),
                    message,
                }))
            }
        }

        self.transition(handle.name(), ContainerState::Removed, None)?;
        logging::info(&format!("Container {} removed", handle.id()));
        Ok(())
    }

    /// Remove every tracked container that is still around. Failures are
    /// logged and skipped. Returns how many were removed.
    pub async fn cleanup_all(&self) -> usize {
        let leftovers: Vec<(String, String)> = self
            .lock_tracked()
            .iter()
            .filter(|(_, t)| {
                matches!(
                    t.state,
                    ContainerState::Created | ContainerState::Started | ContainerState::Stopped
                )
            })
            .filter_map(|(name, t)| t.id.clone().map(|id| (name.clone(), id)))
            .collect();

        let mut removed = 0;
        for (name, id) in leftovers {
            let handle = match ContainerHandle::new(&id, &name) {
                Ok(handle) => handle,
                Err(_) => continue,
            };
            match self.remove_container(&handle).await {
                Ok(()) => removed += 1,
                Err(e) => logging::warning(&format!("Cleanup of {} failed: {}", name, e)),
            }
        }
        removed
    }
}
