//! Component registry and engine configuration for srcd.
//!
//! This crate defines the static layer of the orchestration engine: the
//! immutable table of known components (`ComponentRegistry`) with its
//! validated, acyclic dependency graph, and the TOML engine configuration
//! (`EngineConfig`) that supplies host ports, the container network, CPU
//! limits, and image registry endpoints.

pub mod component;
pub mod config;
pub mod registry;

pub use component::{Component, CONTAINER_PREFIX};
pub use config::{
    ComponentSection, ConfigError, EngineConfig, RegistrySection, RuntimeSection, UpdatesSection,
};
pub use registry::{ComponentRegistry, RegistryError};
