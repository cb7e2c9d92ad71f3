//! Core orchestration engine for srcd.
//!
//! This crate ties the component registry, the container runtime gateway, and
//! the image tag resolver into the `Engine`: the API that brings a component
//! and its dependencies up in order, stops them, reports their status, and
//! pulls or checks their images. It also provides the per-component start
//! configurations, the deferred progress reporter, and Ctrl-C handling.

pub mod deferred;
pub mod engine;
pub mod signal;
pub mod start;

pub use deferred::{Deferred, DeferredHandle, DEFAULT_SPIN_INTERVAL};
pub use engine::{ComponentStatus, Engine, EnsureReport, UpdateStatus};
pub use signal::{install_signal_handler, shutdown_requested};

use srcd_runtime::RuntimeError;
use srcd_schema::CONTAINER_PREFIX;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("registry error: {0}")]
    Registry(#[from] srcd_schema::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] srcd_schema::ConfigError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("image registry error: {0}")]
    Hub(#[from] srcd_hub::HubError),
    #[error("interrupted")]
    Interrupted,
    #[error("no image registry configured")]
    NoTagSource,
}

impl CoreError {
    pub fn is_bind_conflict(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::BindConflict { .. }))
    }

    /// Guidance for errors the user can fix without reading logs.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Runtime(RuntimeError::BindConflict {
                host,
                port,
                service,
            }) => {
                let short = service.strip_prefix(CONTAINER_PREFIX).unwrap_or(service);
                Some(format!(
                    "port {port} on {host} is already in use, so {service} cannot listen on it. \
                     Stop the process holding the port, or pick another one with \
                     `[components.{short}] port = <free port>` in the srcd config file."
                ))
            }
            Self::Runtime(RuntimeError::BackendUnavailable(name)) => Some(format!(
                "set `[runtime] backend` to \"docker\" or \"mock\" (got \"{name}\")"
            )),
            Self::Runtime(RuntimeError::Timeout { .. }) => {
                Some("is the docker daemon responsive? try `srcd doctor`".to_owned())
            }
            _ => None,
        }
    }
}
