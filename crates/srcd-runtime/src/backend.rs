use crate::spec::StartSpec;
use crate::RuntimeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A published port of a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}/{}",
            self.host_ip, self.host_port, self.container_port, self.protocol
        )
    }
}

/// Container state as reported by the runtime at query time.
///
/// Never cached: the runtime is the source of truth because containers can
/// be stopped or removed out of band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerState {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub ports: Vec<PortBinding>,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ContainerState {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}

/// Query/command interface to an external container runtime. No policy.
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Look up a container by name. Fails with [`RuntimeError::NotFound`]
    /// when no container has that name.
    fn info(&self, name: &str) -> Result<ContainerState, RuntimeError>;

    /// Create and start a container; returns its id. May pull the image.
    fn start(&self, spec: &StartSpec) -> Result<String, RuntimeError>;

    /// Force-remove a container. Fails with [`RuntimeError::NotFound`] when
    /// absent; callers decide whether that matters.
    fn kill(&self, name: &str) -> Result<(), RuntimeError>;

    /// Every container known to the runtime, running or not.
    fn list(&self) -> Result<Vec<ContainerState>, RuntimeError>;

    /// Create the named network if it does not exist yet.
    fn ensure_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Pull an image, handing each progress line to `on_line`.
    fn pull(&self, image: &str, on_line: &mut dyn FnMut(&str)) -> Result<(), RuntimeError>;
}

pub fn select_runtime(name: &str) -> Result<Box<dyn ContainerRuntime>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerBackend::new())),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
