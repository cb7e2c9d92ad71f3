use serde::{Deserialize, Serialize};

/// Endpoints of the image registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubConfig {
    /// Token endpoint, queried before every tag listing.
    pub auth_url: String,
    /// Registry API root (the part before `/v2/`).
    pub url: String,
    /// `service` parameter sent to the token endpoint.
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    "registry.docker.io".to_owned()
}

impl HubConfig {
    pub fn new(auth_url: &str, url: &str) -> Self {
        Self {
            auth_url: auth_url.trim_end_matches('/').to_owned(),
            url: url.trim_end_matches('/').to_owned(),
            service: default_service(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new("https://auth.docker.io/token", "https://registry-1.docker.io")
    }
}
