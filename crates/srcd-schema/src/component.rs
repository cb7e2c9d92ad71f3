use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every container the engine owns.
pub const CONTAINER_PREFIX: &str = "srcd-cli-";

pub const BBLFSHD: &str = "srcd-cli-bblfshd";
pub const BBLFSH_WEB: &str = "srcd-cli-bblfsh-web";
pub const GITBASE: &str = "srcd-cli-gitbase";
pub const GITBASE_WEB: &str = "srcd-cli-gitbase-web";

/// A named, independently lifecycle-managed containerized service.
///
/// `name` doubles as the container name, so it is the stable identity used
/// for every runtime lookup. Dependencies are stored by name and resolved
/// through the owning [`ComponentRegistry`](crate::ComponentRegistry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub image: String,
    /// Pinned semantic version, or empty for `latest`.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Component {
    pub fn new(name: &str, image: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            image: image.to_owned(),
            version: version.to_owned(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn depends_on(mut self, name: &str) -> Self {
        self.dependencies.push(name.to_owned());
        self
    }

    /// The name without the container prefix, e.g. `gitbase`.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(CONTAINER_PREFIX)
            .unwrap_or(&self.name)
    }

    /// Image reference with the pinned version, `latest` when unpinned.
    pub fn pinned_reference(&self) -> String {
        if self.version.is_empty() {
            format!("{}:latest", self.image)
        } else {
            format!("{}:{}", self.image, self.version)
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The fixed component table shipped with the engine.
pub fn builtin_components() -> Vec<Component> {
    vec![
        Component::new(BBLFSHD, "bblfsh/bblfshd", "v2.14.0-drivers"),
        Component::new(BBLFSH_WEB, "bblfsh/web", "v0.11.0").depends_on(BBLFSHD),
        Component::new(GITBASE, "srcd/gitbase", "v0.24.0-rc2").depends_on(BBLFSHD),
        Component::new(GITBASE_WEB, "srcd/gitbase-web", "v0.6.2")
            .depends_on(GITBASE)
            .depends_on(BBLFSHD),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_prefix() {
        let c = Component::new(GITBASE_WEB, "srcd/gitbase-web", "v0.6.2");
        assert_eq!(c.short_name(), "gitbase-web");

        let custom = Component::new("postgres", "library/postgres", "16");
        assert_eq!(custom.short_name(), "postgres");
    }

    #[test]
    fn pinned_reference_defaults_to_latest() {
        let pinned = Component::new(GITBASE, "srcd/gitbase", "v0.24.0-rc2");
        assert_eq!(pinned.pinned_reference(), "srcd/gitbase:v0.24.0-rc2");

        let unpinned = Component::new(GITBASE, "srcd/gitbase", "");
        assert_eq!(unpinned.pinned_reference(), "srcd/gitbase:latest");
    }

    #[test]
    fn builtin_table_has_diamond() {
        let components = builtin_components();
        let web = components.iter().find(|c| c.name == GITBASE_WEB).unwrap();
        assert_eq!(web.dependencies, vec![GITBASE, BBLFSHD]);
        let gitbase = components.iter().find(|c| c.name == GITBASE).unwrap();
        assert_eq!(gitbase.dependencies, vec![BBLFSHD]);
    }
}
