//! Container runtime gateway for srcd.
//!
//! This crate is the thin boundary between the orchestration engine and the
//! external container runtime: the pluggable `ContainerRuntime` trait with a
//! docker CLI backend and an in-memory mock, the idempotent `info_or_start`
//! primitive, the start configuration handed to backends, prerequisite
//! checks, and the classifier that turns runtime diagnostic text into
//! structured errors.

pub mod backend;
pub mod classify;
pub mod docker;
pub mod gateway;
pub mod mock;
pub mod prereq;
pub mod spec;

pub use backend::{select_runtime, ContainerRuntime, ContainerState, PortBinding};
pub use classify::classify;
pub use gateway::{info_or_start, kill_if_exists, Outcome};
pub use mock::MockRuntime;
pub use prereq::{check_docker_prereqs, format_missing, MissingPrereq};
pub use spec::{Mount, PortMapping, StartSpec};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("container '{0}' not found")]
    NotFound(String),
    #[error("could not create {name}: {source}")]
    StartFailed {
        name: String,
        source: Box<RuntimeError>,
    },
    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("failed to parse runtime output: {0}")]
    Parse(String),
    /// Runtime diagnostic recognized by [`classify`], with the service
    /// (network endpoint) it mentioned, if any.
    #[error("{message}")]
    Daemon {
        service: Option<String>,
        message: String,
    },
    #[error("port {port} on {host} is already allocated, {service} could not bind to it")]
    BindConflict {
        host: String,
        port: String,
        service: String,
    },
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
