use crate::signal::shutdown_requested;
use crate::start::start_spec;
use crate::CoreError;
use serde::Serialize;
use srcd_hub::{get_compatible_tag, CompatibleTag, HttpTagSource, HubConfig, TagSource};
use srcd_runtime::{
    classify, info_or_start, kill_if_exists, select_runtime, ContainerRuntime, ContainerState,
    Outcome, RuntimeError, StartSpec,
};
use srcd_schema::{Component, ComponentRegistry, EngineConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Brings components up in dependency order and manages their containers.
///
/// Container state is never cached: every operation asks the runtime.
pub struct Engine {
    registry: ComponentRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    tags: Option<Arc<dyn TagSource>>,
    config: EngineConfig,
    shutdown_check: fn() -> bool,
}

/// Outcome of [`Engine::ensure_running`].
#[derive(Debug, Clone, Serialize)]
pub struct EnsureReport {
    pub component: String,
    /// Final state of the requested component.
    pub state: ContainerState,
    /// Components started by this call, in start order.
    pub started: Vec<String>,
    /// Components that were already running.
    pub reused: Vec<String>,
}

/// Scope of one `ensure_running` call.
#[derive(Default)]
struct Walk {
    seen: HashSet<String>,
    started: Vec<String>,
    reused: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub image: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateStatus {
    pub name: String,
    pub current: String,
    #[serde(flatten)]
    pub compatible: CompatibleTag,
}

impl Engine {
    /// Engine over the built-in components, the configured runtime backend,
    /// and the configured image registry.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::from(select_runtime(&config.runtime.backend)?);
        let hub = HubConfig::new(&config.registry.auth_url, &config.registry.url);
        Ok(Self::with_parts(
            ComponentRegistry::builtin(),
            runtime,
            Some(Arc::new(HttpTagSource::new(hub))),
            config,
        ))
    }

    pub fn with_parts(
        registry: ComponentRegistry,
        runtime: Arc<dyn ContainerRuntime>,
        tags: Option<Arc<dyn TagSource>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            runtime,
            tags,
            config,
            shutdown_check: shutdown_requested,
        }
    }

    /// Replace the check consulted before each container start.
    #[must_use]
    pub fn with_shutdown_check(mut self, check: fn() -> bool) -> Self {
        self.shutdown_check = check;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Make sure `name` (full or short) and everything it depends on is
    /// running.
    ///
    /// Each component is started at most once per call, even when several
    /// dependents share it. The first failure aborts the walk; components
    /// started before it are left running.
    pub fn ensure_running(&self, name: &str) -> Result<EnsureReport, CoreError> {
        let component = self.registry.resolve(name)?;
        self.runtime
            .ensure_network(&self.config.runtime.network)
            .map_err(classify)?;

        let mut walk = Walk::default();
        let state = self
            .walk(&component.name, &mut walk)?
            .ok_or_else(|| RuntimeError::NotFound(component.name.clone()))?;
        let report = EnsureReport {
            component: component.name.clone(),
            state,
            started: walk.started,
            reused: walk.reused,
        };
        info!(
            "{} running ({} started, {} already up)",
            report.component,
            report.started.len(),
            report.reused.len()
        );
        Ok(report)
    }

    fn walk(&self, name: &str, walk: &mut Walk) -> Result<Option<ContainerState>, CoreError> {
        let component = self.registry.get(name)?;
        for dep in &component.dependencies {
            self.walk(dep, walk)?;
        }

        if !walk.seen.insert(component.name.clone()) {
            debug!("{name} already handled in this call");
            return Ok(None);
        }
        if (self.shutdown_check)() {
            return Err(CoreError::Interrupted);
        }

        // Tag resolution only happens when a start is actually needed; its
        // error is reported as is rather than as a start failure.
        let mut spec_error = None;
        let result = info_or_start(self.runtime.as_ref(), &component.name, || {
            let spec = match self.start_spec(component) {
                Ok(spec) => spec,
                Err(e) => {
                    let message = e.to_string();
                    spec_error = Some(e);
                    return Err(RuntimeError::ExecFailed(message));
                }
            };
            info!("starting {} ({})", component.name, spec.image);
            let id = self.runtime.start(&spec)?;
            debug!("{} created as {id}", component.name);
            Ok(())
        });
        if let Some(e) = spec_error {
            return Err(e);
        }

        let (state, outcome) = result.map_err(classify)?;
        match outcome {
            Outcome::Started => walk.started.push(component.name.clone()),
            Outcome::AlreadyRunning => walk.reused.push(component.name.clone()),
        }
        Ok(Some(state))
    }

    fn start_spec(&self, component: &Component) -> Result<StartSpec, CoreError> {
        let tag = self.image_tag(component)?;
        start_spec(component, &tag, &self.config)
    }

    /// Pinned tag, or the newest compatible one when resolution is enabled.
    fn image_tag(&self, component: &Component) -> Result<String, CoreError> {
        if self.config.updates.resolve_compatible_tags {
            match &self.tags {
                Some(tags) => {
                    let found =
                        get_compatible_tag(tags.as_ref(), &component.image, &component.version)?;
                    if found.has_breaking_update {
                        warn!(
                            "{}: a newer, incompatible release of {} exists; using {}",
                            component.name, component.image, found.tag
                        );
                    }
                    return Ok(found.tag);
                }
                None => debug!("no tag source, using pinned version of {}", component.name),
            }
        }
        if component.version.is_empty() {
            Ok(srcd_hub::resolve::LATEST.to_owned())
        } else {
            Ok(component.version.clone())
        }
    }

    /// Force-remove a component's container; `false` when it did not exist.
    pub fn stop(&self, name: &str) -> Result<bool, CoreError> {
        let component = self.registry.resolve(name)?;
        let removed = kill_if_exists(self.runtime.as_ref(), &component.name).map_err(classify)?;
        if removed {
            info!("removed {}", component.name);
        } else {
            debug!("{} was not running", component.name);
        }
        Ok(removed)
    }

    /// Force-remove every registered component; returns the removed names.
    pub fn stop_all(&self) -> Result<Vec<String>, CoreError> {
        let mut removed = Vec::new();
        for component in self.registry.iter() {
            if kill_if_exists(self.runtime.as_ref(), &component.name).map_err(classify)? {
                removed.push(component.name.clone());
            }
        }
        Ok(removed)
    }

    pub fn status(&self) -> Result<Vec<ComponentStatus>, CoreError> {
        let containers = self.runtime.list().map_err(classify)?;
        Ok(self
            .registry
            .iter()
            .map(|component| {
                let container = containers
                    .iter()
                    .find(|c| c.has_name(&component.name))
                    .cloned();
                ComponentStatus {
                    name: component.name.clone(),
                    image: component.pinned_reference(),
                    running: container.as_ref().is_some_and(|c| c.running),
                    container,
                }
            })
            .collect())
    }

    /// Pull the images `name` needs, dependencies first. Runtime output is
    /// handed to `on_line`. Returns the pulled references.
    pub fn install(
        &self,
        name: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<Vec<String>, CoreError> {
        let component = self.registry.resolve(name)?;
        let mut pulled = Vec::new();
        for c in self.registry.start_order(&component.name)? {
            if (self.shutdown_check)() {
                return Err(CoreError::Interrupted);
            }
            let reference = format!("{}:{}", c.image, self.image_tag(c)?);
            info!("pulling {reference}");
            self.runtime.pull(&reference, on_line).map_err(classify)?;
            pulled.push(reference);
        }
        Ok(pulled)
    }

    /// Newest compatible published tag for every component.
    pub fn check_updates(&self) -> Result<Vec<UpdateStatus>, CoreError> {
        let tags = self.tags.as_ref().ok_or(CoreError::NoTagSource)?;
        self.registry
            .iter()
            .map(|component| {
                let compatible =
                    get_compatible_tag(tags.as_ref(), &component.image, &component.version)?;
                Ok(UpdateStatus {
                    name: component.name.clone(),
                    current: component.version.clone(),
                    compatible,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcd_hub::StaticTags;
    use srcd_runtime::MockRuntime;
    use srcd_schema::component::{BBLFSHD, GITBASE, GITBASE_WEB};

    fn engine_with(runtime: &Arc<MockRuntime>, tags: Option<StaticTags>) -> Engine {
        let config = EngineConfig::parse_str("workdir = \"/srv/repos\"").unwrap();
        Engine::with_parts(
            ComponentRegistry::builtin(),
            Arc::clone(runtime) as Arc<dyn ContainerRuntime>,
            tags.map(|t| Arc::new(t) as Arc<dyn TagSource>),
            config,
        )
    }

    #[test]
    fn ensure_starts_dependencies_first() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, None);

        let report = engine.ensure_running("gitbase-web").unwrap();
        assert_eq!(report.component, GITBASE_WEB);
        assert_eq!(report.started, vec![BBLFSHD, GITBASE, GITBASE_WEB]);
        assert!(report.reused.is_empty());
        assert!(report.state.running);
        assert_eq!(runtime.start_order(), vec![BBLFSHD, GITBASE, GITBASE_WEB]);
        assert_eq!(runtime.start_count(BBLFSHD), 1);
        assert!(runtime.has_network("srcd-cli-network"));
    }

    #[test]
    fn ensure_reuses_running_components() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.seed_running(BBLFSHD, "bblfsh/bblfshd:v2.14.0-drivers");
        let engine = engine_with(&runtime, None);

        let report = engine.ensure_running(GITBASE).unwrap();
        assert_eq!(report.reused, vec![BBLFSHD]);
        assert_eq!(report.started, vec![GITBASE]);
        assert_eq!(runtime.start_count(BBLFSHD), 0);

        let again = engine.ensure_running(GITBASE).unwrap();
        assert!(again.started.is_empty());
        assert_eq!(runtime.start_count(GITBASE), 1);
    }

    #[test]
    fn pinned_version_used_by_default() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, Some(StaticTags::new()));
        let report = engine.ensure_running(BBLFSHD).unwrap();
        assert_eq!(report.state.image, "bblfsh/bblfshd:v2.14.0-drivers");
    }

    #[test]
    fn resolved_tag_used_when_enabled() {
        let runtime = Arc::new(MockRuntime::new());
        let config = EngineConfig::parse_str("[updates]\nresolve_compatible_tags = true").unwrap();
        let tags = StaticTags::new().with("bblfsh/bblfshd", &["v2.14.0", "v2.15.1", "v3.0.0"]);
        let engine = Engine::with_parts(
            ComponentRegistry::builtin(),
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Some(Arc::new(tags)),
            config,
        );
        let report = engine.ensure_running(BBLFSHD).unwrap();
        assert_eq!(report.state.image, "bblfsh/bblfshd:v2.15.1");
    }

    #[test]
    fn resolver_failure_is_not_a_start_failure() {
        let runtime = Arc::new(MockRuntime::new());
        let config = EngineConfig::parse_str("[updates]\nresolve_compatible_tags = true").unwrap();
        let engine = Engine::with_parts(
            ComponentRegistry::builtin(),
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Some(Arc::new(StaticTags::new())),
            config,
        );
        let err = engine.ensure_running(BBLFSHD).unwrap_err();
        assert!(matches!(err, CoreError::Hub(_)), "{err}");
        assert_eq!(runtime.start_count(BBLFSHD), 0);
    }

    #[test]
    fn interrupted_before_first_start() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, None).with_shutdown_check(|| true);
        assert!(matches!(
            engine.ensure_running(GITBASE),
            Err(CoreError::Interrupted)
        ));
        assert!(runtime.start_order().is_empty());
    }

    #[test]
    fn stop_and_status() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, None);
        engine.ensure_running(GITBASE).unwrap();

        let status = engine.status().unwrap();
        assert_eq!(status.len(), 4);
        let running: Vec<&str> = status
            .iter()
            .filter(|s| s.running)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(running, vec![BBLFSHD, GITBASE]);

        assert!(engine.stop("gitbase").unwrap());
        assert!(!engine.stop("gitbase").unwrap());
        assert_eq!(engine.stop_all().unwrap(), vec![BBLFSHD]);
        assert!(engine.status().unwrap().iter().all(|s| !s.running));
    }

    #[test]
    fn install_pulls_subtree_in_order() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, None);
        let mut lines = Vec::new();
        let pulled = engine
            .install("gitbase-web", &mut |l| lines.push(l.to_owned()))
            .unwrap();
        assert_eq!(
            pulled,
            vec![
                "bblfsh/bblfshd:v2.14.0-drivers",
                "srcd/gitbase:v0.24.0-rc2",
                "srcd/gitbase-web:v0.6.2",
            ]
        );
        assert_eq!(lines.len(), 3);
        assert!(runtime.start_order().is_empty());
    }

    #[test]
    fn check_updates_needs_tag_source() {
        let runtime = Arc::new(MockRuntime::new());
        assert!(matches!(
            engine_with(&runtime, None).check_updates(),
            Err(CoreError::NoTagSource)
        ));

        let tags = StaticTags::new()
            .with("bblfsh/bblfshd", &["v2.14.0", "v2.16.0"])
            .with("bblfsh/web", &["v0.11.0", "v0.12.0"])
            .with("srcd/gitbase", &["v0.24.0", "v0.24.1"])
            .with("srcd/gitbase-web", &["v0.6.2"]);
        let updates = engine_with(&runtime, Some(tags)).check_updates().unwrap();
        let gitbase = updates.iter().find(|u| u.name == GITBASE).unwrap();
        assert_eq!(gitbase.compatible.tag, "v0.24.1");
        let web = updates.iter().find(|u| u.name == "srcd-cli-bblfsh-web").unwrap();
        assert_eq!(web.compatible.tag, "v0.11.0");
        assert!(web.compatible.has_breaking_update);
    }

    #[test]
    fn unknown_component_is_rejected() {
        let runtime = Arc::new(MockRuntime::new());
        let engine = engine_with(&runtime, None);
        assert!(matches!(
            engine.ensure_running("mysql"),
            Err(CoreError::Registry(_))
        ));
        assert!(!runtime.has_network("srcd-cli-network"));
    }
}
