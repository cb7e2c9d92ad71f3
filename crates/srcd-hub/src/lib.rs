//! Image registry access for srcd.
//!
//! This crate lists the published tags of an image through the registry's
//! bearer-token HTTP flow, and picks the newest tag that is compatible with a
//! pinned version while reporting whether a breaking upgrade exists.

pub mod config;
pub mod http;
pub mod resolve;
pub mod version;

pub use config::HubConfig;
pub use http::HttpTagSource;
pub use resolve::{get_compatible_tag, select_compatible, CompatibleTag};
pub use version::VersionTag;

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {code} for {url}")]
    Status { url: String, code: u16 },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("cannot parse version '{0}'")]
    VersionUnparsable(String),
    #[error("no compatible version found for {0}")]
    NoCompatibleVersion(String),
}

/// Source of the published tags of an image.
pub trait TagSource: Send + Sync {
    fn tags(&self, image: &str) -> Result<Vec<String>, HubError>;
}

/// Fixed tag lists keyed by image, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTags {
    images: BTreeMap<String, Vec<String>>,
}

impl StaticTags {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, image: &str, tags: &[&str]) -> Self {
        self.images.insert(
            image.to_owned(),
            tags.iter().map(|t| (*t).to_owned()).collect(),
        );
        self
    }
}

impl TagSource for StaticTags {
    fn tags(&self, image: &str) -> Result<Vec<String>, HubError> {
        self.images.get(image).cloned().ok_or_else(|| HubError::Status {
            url: format!("static://{image}"),
            code: 404,
        })
    }
}
