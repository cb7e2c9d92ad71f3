use crate::backend::{ContainerRuntime, ContainerState, PortBinding};
use crate::spec::StartSpec;
use crate::RuntimeError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, ContainerState>,
    start_counts: HashMap<String, usize>,
    start_order: Vec<String>,
    failures: HashMap<String, String>,
    networks: BTreeSet<String>,
    pulled: Vec<String>,
    next_id: u64,
}

/// In-memory runtime: containers are entries in a map.
///
/// Records every start attempt so tests can assert ordering and
/// at-most-once behavior, and can inject start failures by name.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    fn insert(&self, name: &str, image: &str, running: bool) {
        if let Ok(mut state) = self.lock() {
            state.next_id += 1;
            let id = format!("{:064x}", state.next_id);
            state.containers.insert(
                name.to_owned(),
                ContainerState {
                    id,
                    names: vec![name.to_owned()],
                    image: image.to_owned(),
                    ports: Vec::new(),
                    running,
                    created: None,
                },
            );
        }
    }

    /// Pretend a container is already running.
    pub fn seed_running(&self, name: &str, image: &str) {
        self.insert(name, image, true);
    }

    /// Pretend a container exists but has exited.
    pub fn seed_stopped(&self, name: &str, image: &str) {
        self.insert(name, image, false);
    }

    /// Make every start of `name` fail with `message`.
    pub fn fail_start(&self, name: &str, message: &str) {
        if let Ok(mut state) = self.lock() {
            state.failures.insert(name.to_owned(), message.to_owned());
        }
    }

    pub fn start_count(&self, name: &str) -> usize {
        self.lock()
            .map(|s| s.start_counts.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Names of every start attempt, in order.
    pub fn start_order(&self) -> Vec<String> {
        self.lock().map(|s| s.start_order.clone()).unwrap_or_default()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().is_ok_and(|s| s.networks.contains(name))
    }

    pub fn pulled(&self) -> Vec<String> {
        self.lock().map(|s| s.pulled.clone()).unwrap_or_default()
    }
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn info(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        self.lock()?
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))
    }

    fn start(&self, spec: &StartSpec) -> Result<String, RuntimeError> {
        let mut state = self.lock()?;
        *state.start_counts.entry(spec.name.clone()).or_insert(0) += 1;
        state.start_order.push(spec.name.clone());

        if let Some(message) = state.failures.get(&spec.name) {
            return Err(RuntimeError::ExecFailed(message.clone()));
        }

        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let ports = spec
            .ports
            .iter()
            .map(|p| PortBinding {
                host_ip: "0.0.0.0".to_owned(),
                host_port: p.host_port,
                container_port: p.container_port,
                protocol: "tcp".to_owned(),
            })
            .collect();
        state.containers.insert(
            spec.name.clone(),
            ContainerState {
                id: id.clone(),
                names: vec![spec.name.clone()],
                image: spec.image.clone(),
                ports,
                running: true,
                created: Some(chrono::Utc::now()),
            },
        );
        Ok(id)
    }

    fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        self.lock()?
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))
    }

    fn list(&self) -> Result<Vec<ContainerState>, RuntimeError> {
        Ok(self.lock()?.containers.values().cloned().collect())
    }

    fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.lock()?.networks.insert(name.to_owned());
        Ok(())
    }

    fn pull(&self, image: &str, on_line: &mut dyn FnMut(&str)) -> Result<(), RuntimeError> {
        self.lock()?.pulled.push(image.to_owned());
        on_line(&format!("mock-pull: {image}"));
        Ok(())
    }
}
