use crate::component::{builtin_components, Component};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown component: {0}")]
    UnknownComponent(String),
    #[error("component '{0}' is registered twice")]
    DuplicateComponent(String),
    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },
    #[error("dependency cycle through '{0}'")]
    DependencyCycle(String),
}

/// Immutable table of known components and their dependency graph.
///
/// Built once (from the shipped table or an explicit list) and validated on
/// construction: names are unique, every dependency is registered, and the
/// dependency relation is acyclic. Nothing can be registered afterwards, so a
/// shared reference is safe to read from any number of callers.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    index: BTreeMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl ComponentRegistry {
    pub fn new(components: Vec<Component>) -> Result<Self, RegistryError> {
        let mut index = BTreeMap::new();
        for (i, c) in components.iter().enumerate() {
            if index.insert(c.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateComponent(c.name.clone()));
            }
        }

        for c in &components {
            for dep in &c.dependencies {
                if !index.contains_key(dep) {
                    return Err(RegistryError::UnknownDependency {
                        component: c.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let registry = Self { components, index };
        registry.check_acyclic()?;
        Ok(registry)
    }

    /// The component table the engine ships with.
    pub fn builtin() -> Self {
        Self::new(builtin_components()).expect("builtin component table is valid")
    }

    fn check_acyclic(&self) -> Result<(), RegistryError> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        for c in &self.components {
            self.visit(&c.name, &mut marks)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Result<(), RegistryError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(RegistryError::DependencyCycle(name.to_owned())),
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        for dep in &self.components[self.index[name]].dependencies {
            self.visit(dep, marks)?;
        }
        marks.insert(name, Mark::Done);
        Ok(())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Component, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.components[i])
            .ok_or_else(|| RegistryError::UnknownComponent(name.to_owned()))
    }

    /// Look up a component by full name or short name (`gitbase`).
    pub fn resolve(&self, input: &str) -> Result<&Component, RegistryError> {
        if let Ok(c) = self.get(input) {
            return Ok(c);
        }
        self.components
            .iter()
            .find(|c| c.short_name() == input)
            .ok_or_else(|| RegistryError::UnknownComponent(input.to_owned()))
    }

    /// Direct dependencies of `name`, in declaration order.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&Component>, RegistryError> {
        let component = self.get(name)?;
        component
            .dependencies
            .iter()
            .map(|dep| self.get(dep))
            .collect()
    }

    /// The full dependency subtree of `name`, dependencies first, each
    /// component exactly once, ending with `name` itself.
    pub fn start_order(&self, name: &str) -> Result<Vec<&Component>, RegistryError> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        self.collect_order(name, &mut seen, &mut order)?;
        Ok(order)
    }

    fn collect_order<'a>(
        &'a self,
        name: &str,
        seen: &mut HashSet<&'a str>,
        order: &mut Vec<&'a Component>,
    ) -> Result<(), RegistryError> {
        let component = self.get(name)?;
        for dep in &component.dependencies {
            self.collect_order(dep, seen, order)?;
        }
        if seen.insert(component.name.as_str()) {
            order.push(component);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
