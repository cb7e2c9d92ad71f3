use crate::{HubConfig, HubError, TagSource};
use serde::Deserialize;
use std::io::Read;

/// Tag listing over the registry HTTP API.
///
/// Two requests per lookup:
/// - `GET {auth_url}?service=<service>&scope=repository:<image>:pull` → `{"token": ...}`
/// - `GET {url}/v2/<image>/tags/list` with `Authorization: Bearer <token>`
///   → `{"name": ..., "tags": [...]}`
pub struct HttpTagSource {
    config: HubConfig,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Official images live under `library/` in the registry API.
pub fn repository_path(image: &str) -> String {
    if image.contains('/') {
        image.to_owned()
    } else {
        format!("library/{image}")
    }
}

impl HttpTagSource {
    pub fn new(config: HubConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    fn do_get(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>, HubError> {
        let mut req = self.agent.get(url);
        if let Some(token) = token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(HubError::Status {
                    url: url.to_owned(),
                    code,
                });
            }
            Err(e) => return Err(HubError::Http(e.to_string())),
        };

        let code = resp.status().as_u16();
        if code != 200 {
            return Err(HubError::Status {
                url: url.to_owned(),
                code,
            });
        }

        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| HubError::Http(e.to_string()))?;
        Ok(body)
    }

    fn token(&self, repository: &str) -> Result<String, HubError> {
        let url = format!(
            "{}?service={}&scope=repository:{repository}:pull",
            self.config.auth_url, self.config.service
        );
        tracing::debug!("GET {url}");
        let body = self.do_get(&url, None)?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| HubError::Serialization(e.to_string()))?;
        Ok(parsed.token)
    }
}

impl TagSource for HttpTagSource {
    fn tags(&self, image: &str) -> Result<Vec<String>, HubError> {
        let repository = repository_path(image);
        let token = self.token(&repository)?;

        let url = format!("{}/v2/{repository}/tags/list", self.config.url);
        tracing::debug!("GET {url}");
        let body = self.do_get(&url, Some(&token))?;
        let parsed: TagList =
            serde_json::from_slice(&body).map_err(|e| HubError::Serialization(e.to_string()))?;
        Ok(parsed.tags.unwrap_or_default())
    }
}
