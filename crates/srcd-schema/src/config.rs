use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("runtime.cpu_fraction must be in (0, 1], got {0}")]
    InvalidCpuFraction(f64),
    #[error("HOME is not set; pass an explicit config path")]
    HomeNotSet,
}

/// Engine configuration, read from `~/.srcd/config.toml`.
///
/// Every section is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory with the repositories served by gitbase. Defaults to the
    /// current directory at start time.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub updates: UpdatesSection,
    #[serde(default)]
    pub registry: RegistrySection,
    /// Per-component overrides, keyed by short name (`gitbase`, `bblfshd`, ...).
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_cpu_fraction")]
    pub cpu_fraction: f64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            network: default_network(),
            cpu_fraction: default_cpu_fraction(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UpdatesSection {
    /// Pick the newest non-breaking published tag instead of the pinned one.
    #[serde(default)]
    pub resolve_compatible_tags: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_registry_url")]
    pub url: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            url: default_registry_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComponentSection {
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_backend() -> String {
    "docker".to_owned()
}

fn default_network() -> String {
    "srcd-cli-network".to_owned()
}

fn default_cpu_fraction() -> f64 {
    0.9
}

fn default_auth_url() -> String {
    "https://auth.docker.io/token".to_owned()
}

fn default_registry_url() -> String {
    "https://registry-1.docker.io".to_owned()
}

/// Host ports used when the config does not override them.
fn default_port(short_name: &str) -> Option<u16> {
    match short_name {
        "bblfshd" => Some(9432),
        "bblfsh-web" => Some(8081),
        "gitbase" => Some(3306),
        "gitbase-web" => Some(8080),
        _ => None,
    }
}

impl EngineConfig {
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::HomeNotSet)?;
        Ok(PathBuf::from(home).join(".srcd/config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.runtime.cpu_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidCpuFraction(fraction));
        }
        Ok(())
    }

    /// Host port published for a component, by short name.
    pub fn port(&self, short_name: &str) -> Option<u16> {
        self.components
            .get(short_name)
            .and_then(|c| c.port)
            .or_else(|| default_port(short_name))
    }

    /// The gitbase workdir as an absolute path, falling back to the current
    /// directory. Relative paths are taken from the current directory; docker
    /// would read them as named volumes.
    pub fn workdir(&self) -> Result<PathBuf, ConfigError> {
        match &self.workdir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => Ok(std::env::current_dir()?.join(dir)),
            None => Ok(std::env::current_dir()?),
        }
    }
}
