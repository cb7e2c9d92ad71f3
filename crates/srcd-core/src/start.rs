//! How each component's container is created.
//!
//! Dependencies are referenced by container name; the shared network makes
//! those names resolvable from inside the containers.

use crate::CoreError;
use srcd_runtime::StartSpec;
use srcd_schema::component::{BBLFSHD, BBLFSH_WEB, GITBASE, GITBASE_WEB};
use srcd_schema::{Component, EngineConfig};

/// Label attached to every container the engine creates.
pub const OWNER_LABEL: &str = "srcd-cli.component";

pub const BBLFSHD_PORT: u16 = 9432;
pub const GITBASE_PORT: u16 = 3306;
pub const WEB_PORT: u16 = 8080;

pub const BBLFSH_STORAGE_VOLUME: &str = "srcd-cli-bblfsh-storage";
pub const GITBASE_INDEX_VOLUME: &str = "srcd-cli-gitbase-index";
pub const REPOSITORIES_DIR: &str = "/opt/repos";
const GITBASE_INDEX_DIR: &str = "/var/lib/gitbase/index";

/// Build the start configuration for `component` running image tag `tag`.
pub fn start_spec(
    component: &Component,
    tag: &str,
    config: &EngineConfig,
) -> Result<StartSpec, CoreError> {
    let image = format!("{}:{tag}", component.image);
    let short = component.short_name();
    let spec = StartSpec::new(&component.name, &image)
        .network(&config.runtime.network)
        .label(OWNER_LABEL, short);

    let spec = match component.name.as_str() {
        BBLFSHD => spec
            .privileged()
            .mount(BBLFSH_STORAGE_VOLUME, "/var/lib/bblfshd", false),
        BBLFSH_WEB => spec.arg("-bblfsh-addr").arg(&endpoint(BBLFSHD, BBLFSHD_PORT)),
        GITBASE => {
            let workdir = config.workdir()?;
            spec.env("BBLFSH_ENDPOINT", endpoint(BBLFSHD, BBLFSHD_PORT))
                .env("GITBASE_INDEX_DIR", GITBASE_INDEX_DIR)
                .mount(workdir.display().to_string(), REPOSITORIES_DIR, true)
                .mount(GITBASE_INDEX_VOLUME, GITBASE_INDEX_DIR, false)
                .cpus(gitbase_cpus(config.runtime.cpu_fraction))
        }
        GITBASE_WEB => spec
            .env(
                "GITBASEPG_DB_CONNECTION",
                format!("root@tcp({})/none", endpoint(GITBASE, GITBASE_PORT)),
            )
            .env("GITBASEPG_BBLFSH_SERVER_URL", endpoint(BBLFSHD, BBLFSHD_PORT))
            .env("GITBASEPG_PORT", WEB_PORT.to_string()),
        _ => spec,
    };

    Ok(match config.port(short) {
        Some(host_port) => spec.port(host_port, container_port(component).unwrap_or(host_port)),
        None => spec,
    })
}

/// Port the service listens on inside its container.
fn container_port(component: &Component) -> Option<u16> {
    match component.name.as_str() {
        BBLFSHD => Some(BBLFSHD_PORT),
        GITBASE => Some(GITBASE_PORT),
        BBLFSH_WEB | GITBASE_WEB => Some(WEB_PORT),
        _ => None,
    }
}

fn endpoint(container: &str, port: u16) -> String {
    format!("{container}:{port}")
}

/// CPU quota for gitbase: a fraction of the host CPUs, at least one tenth.
pub fn gitbase_cpus(fraction: f64) -> f64 {
    let host = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    (fraction * host as f64).max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcd_schema::ComponentRegistry;

    fn config() -> EngineConfig {
        EngineConfig::parse_str(
            r#"
workdir = "/srv/repos"

[components.gitbase]
port = 13306
"#,
        )
        .unwrap()
    }

    fn spec_for(name: &str) -> StartSpec {
        let registry = ComponentRegistry::builtin();
        let component = registry.get(name).unwrap();
        start_spec(component, "v1.0.0", &config()).unwrap()
    }

    #[test]
    fn bblfshd_is_privileged_with_storage() {
        let spec = spec_for(BBLFSHD);
        assert_eq!(spec.image, "bblfsh/bblfshd:v1.0.0");
        assert!(spec.privileged);
        assert_eq!(spec.mounts[0].source, BBLFSH_STORAGE_VOLUME);
        assert_eq!(spec.ports[0].host_port, 9432);
        assert_eq!(spec.network.as_deref(), Some("srcd-cli-network"));
    }

    #[test]
    fn gitbase_points_at_bblfshd_and_mounts_workdir() {
        let spec = spec_for(GITBASE);
        assert_eq!(spec.env_value("BBLFSH_ENDPOINT"), Some("srcd-cli-bblfshd:9432"));
        let repos = spec
            .mounts
            .iter()
            .find(|m| m.target == REPOSITORIES_DIR)
            .unwrap();
        assert_eq!(repos.source, "/srv/repos");
        assert!(repos.read_only);
        assert!(spec.cpus.unwrap() > 0.0);
        assert!(!spec.privileged);
    }

    #[test]
    fn relative_workdir_mounts_as_host_path() {
        let registry = ComponentRegistry::builtin();
        let gitbase = registry.get(GITBASE).unwrap();
        let config = EngineConfig::parse_str("workdir = \"repos\"").unwrap();
        let spec = start_spec(gitbase, "v1.0.0", &config).unwrap();
        let repos = spec
            .mounts
            .iter()
            .find(|m| m.target == REPOSITORIES_DIR)
            .unwrap();
        assert!(std::path::Path::new(&repos.source).is_absolute());
        assert!(repos.source.ends_with("repos"));
    }

    #[test]
    fn configured_port_maps_to_service_port() {
        let spec = spec_for(GITBASE);
        assert_eq!(spec.ports[0].host_port, 13306);
        assert_eq!(spec.ports[0].container_port, 3306);
    }

    #[test]
    fn gitbase_web_connects_to_both_dependencies() {
        let spec = spec_for(GITBASE_WEB);
        assert_eq!(
            spec.env_value("GITBASEPG_DB_CONNECTION"),
            Some("root@tcp(srcd-cli-gitbase:3306)/none")
        );
        assert_eq!(
            spec.env_value("GITBASEPG_BBLFSH_SERVER_URL"),
            Some("srcd-cli-bblfshd:9432")
        );
        assert_eq!(spec.ports[0].host_port, 8080);
    }

    #[test]
    fn components_are_labelled_by_short_name() {
        let spec = spec_for(BBLFSH_WEB);
        assert_eq!(
            spec.labels,
            vec![(OWNER_LABEL.to_owned(), "bblfsh-web".to_owned())]
        );
        assert_eq!(spec.args, vec!["-bblfsh-addr", "srcd-cli-bblfshd:9432"]);
    }

    #[test]
    fn unknown_component_gets_generic_spec() {
        let component = Component::new("postgres", "library/postgres", "16");
        let spec = start_spec(&component, "16", &config()).unwrap();
        assert_eq!(spec.image, "library/postgres:16");
        assert!(spec.ports.is_empty());
        assert!(spec.env.is_empty());
    }

    #[test]
    fn cpu_quota_has_a_floor() {
        assert!(gitbase_cpus(0.000_001) >= 0.1);
        assert!(gitbase_cpus(1.0) >= 1.0);
    }
}
