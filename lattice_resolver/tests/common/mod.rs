//! Shared fixtures: map-backed content and host loaders, and a compact
//! module builder over the real registry.

#![allow(dead_code)]

use std::sync::Arc;

use lattice_core::{Capability, Filter, ModuleDefinition, Namespace, Requirement, Version};
use lattice_resolver::{
    ContentLoader, HostLoader, LoadedClass, ModuleHandle, ModuleId, ModuleRegistry, PolicyConfig,
    ResourceUrl, SearchPolicy,
};
use rustc_hash::FxHashMap;

// =============================================================================
// Loaders
// =============================================================================

/// Content loader backed by in-memory maps.
#[derive(Default)]
pub struct MapContent {
    classes: FxHashMap<String, LoadedClass>,
    resources: FxHashMap<String, Vec<ResourceUrl>>,
}

impl MapContent {
    pub fn new() -> Self {
        MapContent::default()
    }

    pub fn with_classes(names: &[&str]) -> Self {
        let mut content = MapContent::default();
        for name in names {
            content.add_class(name);
        }
        content
    }

    pub fn add_class(&mut self, name: &str) {
        self.classes
            .insert(name.to_string(), LoadedClass::new(name, name.as_bytes().to_vec()));
    }

    pub fn add_resource(&mut self, name: &str, url: &str) {
        self.resources
            .entry(name.to_string())
            .or_default()
            .push(ResourceUrl::new(url));
    }
}

impl ContentLoader for MapContent {
    fn get_class(&self, name: &str) -> Option<LoadedClass> {
        self.classes.get(name).cloned()
    }

    fn get_resource(&self, name: &str) -> Option<ResourceUrl> {
        self.resources.get(name).and_then(|urls| urls.first().cloned())
    }

    fn get_resources(&self, name: &str) -> Option<Vec<ResourceUrl>> {
        self.resources.get(name).cloned()
    }
}

/// Host loader backed by an in-memory class map, counting delegations.
#[derive(Default)]
pub struct MapHost {
    classes: FxHashMap<String, LoadedClass>,
    pub loads: std::sync::atomic::AtomicUsize,
}

impl MapHost {
    pub fn with_classes(names: &[&str]) -> Self {
        MapHost {
            classes: names
                .iter()
                .map(|n| (n.to_string(), LoadedClass::new(*n, n.as_bytes().to_vec())))
                .collect(),
            loads: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl HostLoader for MapHost {
    fn load_class(&self, name: &str) -> Option<LoadedClass> {
        self.loads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.classes.get(name).cloned()
    }

    fn get_resource(&self, _name: &str) -> Option<ResourceUrl> {
        None
    }

    fn get_resources(&self, _name: &str) -> Option<Vec<ResourceUrl>> {
        None
    }
}

// =============================================================================
// Module builder
// =============================================================================

/// Declarative module description for tests.
pub struct ModuleSpec {
    pub bundle: u64,
    pub capabilities: Vec<Capability>,
    pub requirements: Vec<Requirement>,
    pub dynamic: Vec<Requirement>,
    pub content: MapContent,
}

impl ModuleSpec {
    pub fn new(bundle: u64) -> Self {
        ModuleSpec {
            bundle,
            capabilities: Vec::new(),
            requirements: Vec::new(),
            dynamic: Vec::new(),
            content: MapContent::new(),
        }
    }

    pub fn exports(mut self, pkg: &str, version: Version) -> Self {
        self.capabilities.push(Capability::package(pkg, version));
        self
    }

    pub fn exports_with_uses(mut self, pkg: &str, version: Version, uses: &[&str]) -> Self {
        self.capabilities
            .push(Capability::package(pkg, version).with_uses(uses.iter().copied()));
        self
    }

    pub fn provides_module(mut self, name: &str, version: Version) -> Self {
        self.capabilities.push(Capability::module(name, version));
        self
    }

    pub fn requires(mut self, filter: &str) -> Self {
        self.requirements.push(Requirement::new(
            Namespace::Package,
            Filter::parse(filter).expect("test filter"),
        ));
        self
    }

    pub fn requires_optionally(mut self, filter: &str) -> Self {
        self.requirements.push(
            Requirement::new(Namespace::Package, Filter::parse(filter).expect("test filter"))
                .optional(),
        );
        self
    }

    pub fn requires_module(mut self, filter: &str) -> Self {
        self.requirements.push(Requirement::new(
            Namespace::Module,
            Filter::parse(filter).expect("test filter"),
        ));
        self
    }

    pub fn imports_dynamically(mut self, filter: &str) -> Self {
        self.dynamic.push(Requirement::new(
            Namespace::Package,
            Filter::parse(filter).expect("test filter"),
        ));
        self
    }

    pub fn with_class(mut self, name: &str) -> Self {
        self.content.add_class(name);
        self
    }

    pub fn with_resource(mut self, name: &str, url: &str) -> Self {
        self.content.add_resource(name, url);
        self
    }

    pub fn install(self, registry: &ModuleRegistry) -> ModuleHandle {
        registry.add_module(
            ModuleId::new(self.bundle, 0),
            Arc::new(ModuleDefinition::new(
                self.capabilities,
                self.requirements,
                self.dynamic,
                vec![],
            )),
            Arc::new(self.content),
            None,
        )
    }
}

/// Registry + policy against an empty host with default configuration.
pub fn fresh_runtime() -> (Arc<ModuleRegistry>, Arc<SearchPolicy>, Arc<MapHost>) {
    runtime_with_host(MapHost::default())
}

pub fn runtime_with_host(host: MapHost) -> (Arc<ModuleRegistry>, Arc<SearchPolicy>, Arc<MapHost>) {
    let registry = Arc::new(ModuleRegistry::new());
    let host = Arc::new(host);
    let policy = SearchPolicy::new(registry.clone(), PolicyConfig::default(), host.clone());
    (registry, policy, host)
}
