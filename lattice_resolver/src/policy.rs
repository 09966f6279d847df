//! The runtime search policy — class and resource lookup over the wiring.
//!
//! A lookup for `(module, name)` walks, in order:
//!
//! 1. lazy `resolve` of the owning module,
//! 2. boot delegation to the host loader for configured package prefixes,
//! 3. the module's static wires,
//! 4. the module's own content,
//! 5. a dynamic-import attempt, which may append a wire under the factory
//!    lock and retry through it.
//!
//! Class lookups from host-path callers ([`Caller::Host`]) get one final
//! delegation to the host loader before the failure is diagnosed; module
//! callers get strict modularity and a wiring diagnostic instead.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use lattice_core::{Filter, Namespace, Requirement, PACKAGE_PROPERTY};

use crate::candidates::{in_use_candidates, unused_candidates};
use crate::config::PolicyConfig;
use crate::diagnostics;
use crate::error::{ClassNotFound, ResolveError, ResourceNotFound};
use crate::module::{HostLoader, LoadedClass, ModuleHandle, ModuleId, ResourceUrl};
use crate::registry::{deliver, ModuleEvent, ModuleListener, ModuleRegistry};
use crate::resolver::resolve_locked;
use crate::wire::Wire;

// =============================================================================
// Listener surface
// =============================================================================

/// Observer of resolution state changes. Registration order is delivery
/// order; events fire after the factory lock is released.
pub trait ResolverListener: Send + Sync {
    fn module_resolved(&self, _event: &ModuleEvent) {}
    fn module_unresolved(&self, _event: &ModuleEvent) {}
}

/// Who instigated a class lookup.
///
/// The host kind replaces call-stack inspection: callers that reached the
/// policy from the host class path still expect host-path visibility and
/// get a final host-loader delegation on miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Module,
    Host,
}

/// Sealed package attributes reported to the host when it defines a
/// package for a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAttrs {
    pub spec_title: Arc<str>,
    pub spec_version: Arc<str>,
    pub spec_vendor: Arc<str>,
    pub impl_title: Arc<str>,
    pub impl_version: Arc<str>,
    pub impl_vendor: Arc<str>,
}

// =============================================================================
// SearchPolicy
// =============================================================================

/// The resolver facade plus the class/resource lookup policy.
pub struct SearchPolicy {
    registry: Arc<ModuleRegistry>,
    config: PolicyConfig,
    host: Arc<dyn HostLoader>,
    listeners: Mutex<Arc<[Arc<dyn ResolverListener>]>>,
}

impl SearchPolicy {
    /// Create the policy and subscribe it to registry removals (a removed
    /// resolved module fires `module_unresolved`).
    pub fn new(
        registry: Arc<ModuleRegistry>,
        config: PolicyConfig,
        host: Arc<dyn HostLoader>,
    ) -> Arc<Self> {
        let empty: Arc<[Arc<dyn ResolverListener>]> = Arc::new([]);
        let policy = Arc::new(SearchPolicy {
            registry: registry.clone(),
            config,
            host,
            listeners: Mutex::new(empty),
        });
        registry.add_module_listener(Arc::new(UnresolveHook {
            policy: Arc::downgrade(&policy),
        }));
        policy
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    #[inline]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a module and everything its wiring pulls in. Fast no-op
    /// when already resolved.
    pub fn resolve(&self, module: ModuleHandle) -> Result<(), ResolveError> {
        if self.registry.is_resolved(module) {
            return Ok(());
        }

        let newly = {
            let mut inner = self.registry.lock();
            resolve_locked(&mut inner, module)?
        };
        self.fire_resolved(&newly);
        Ok(())
    }

    // =========================================================================
    // Class lookup
    // =========================================================================

    pub fn find_class(
        &self,
        module: ModuleHandle,
        name: &str,
        caller: Caller,
    ) -> Result<LoadedClass, ClassNotFound> {
        if let Err(err) = self.resolve(module) {
            return Err(ClassNotFound::unresolved(name, err));
        }

        let pkg = class_package(name);

        // Boot-delegated packages bypass the wiring entirely. The default
        // package is never promoted to the host.
        if !pkg.is_empty() && self.config.boot_delegates(pkg) {
            return self
                .host
                .load_class(name)
                .ok_or_else(|| ClassNotFound::new(name));
        }

        for wire in self.registry.wires(module) {
            if let Some(class) = wire.get_class(&self.registry, name, pkg) {
                return Ok(class);
            }
        }

        if let Some(content) = self.registry.content_loader(module) {
            if let Some(class) = content.get_class(name) {
                return Ok(class);
            }
        }

        if let Some(wire) = self.attempt_dynamic_import(module, pkg) {
            if let Some(class) = wire.get_class(&self.registry, name, pkg) {
                return Ok(class);
            }
        }

        // Host-path callers still expect host visibility; concede once.
        if caller == Caller::Host {
            if let Some(class) = self.host.load_class(name) {
                return Ok(class);
            }
        }

        Err(ClassNotFound::diagnosed(
            name,
            diagnostics::diagnose(&self.registry, self.host.as_ref(), &self.config, module, name),
        ))
    }

    // =========================================================================
    // Resource lookup
    // =========================================================================

    pub fn find_resource(
        &self,
        module: ModuleHandle,
        name: &str,
    ) -> Result<ResourceUrl, ResourceNotFound> {
        if let Err(err) = self.resolve(module) {
            // An unresolvable module still exposes its own content.
            if let Some(content) = self.registry.content_loader(module) {
                if let Some(url) = content.get_resource(name) {
                    return Ok(url);
                }
            }
            return Err(ResourceNotFound::unresolved(name, err));
        }

        let pkg = resource_package(name);

        if !pkg.is_empty() && self.config.boot_delegates(&pkg) {
            return self
                .host
                .get_resource(name)
                .ok_or_else(|| ResourceNotFound::new(name));
        }

        for wire in self.registry.wires(module) {
            if let Some(url) = wire.get_resource(&self.registry, name, &pkg) {
                return Ok(url);
            }
        }

        if let Some(content) = self.registry.content_loader(module) {
            if let Some(url) = content.get_resource(name) {
                return Ok(url);
            }
        }

        if let Some(wire) = self.attempt_dynamic_import(module, &pkg) {
            if let Some(url) = wire.get_resource(&self.registry, name, &pkg) {
                return Ok(url);
            }
        }

        Err(ResourceNotFound::new(name))
    }

    /// Multi-valued resource lookup. The same order as [`find_resource`],
    /// but the first source with a non-empty answer wins outright — no
    /// merging across sources (single-source assumption).
    pub fn find_resources(
        &self,
        module: ModuleHandle,
        name: &str,
    ) -> Result<Vec<ResourceUrl>, ResourceNotFound> {
        if let Err(err) = self.resolve(module) {
            if let Some(content) = self.registry.content_loader(module) {
                if let Some(urls) = content.get_resources(name) {
                    return Ok(urls);
                }
            }
            return Err(ResourceNotFound::unresolved(name, err));
        }

        let pkg = resource_package(name);

        if !pkg.is_empty() && self.config.boot_delegates(&pkg) {
            return self
                .host
                .get_resources(name)
                .ok_or_else(|| ResourceNotFound::new(name));
        }

        for wire in self.registry.wires(module) {
            if let Some(urls) = wire.get_resources(&self.registry, name, &pkg) {
                if !urls.is_empty() {
                    return Ok(urls);
                }
            }
        }

        if let Some(content) = self.registry.content_loader(module) {
            if let Some(urls) = content.get_resources(name) {
                return Ok(urls);
            }
        }

        if let Some(wire) = self.attempt_dynamic_import(module, &pkg) {
            if let Some(urls) = wire.get_resources(&self.registry, name, &pkg) {
                if !urls.is_empty() {
                    return Ok(urls);
                }
            }
        }

        Err(ResourceNotFound::new(name))
    }

    // =========================================================================
    // Dynamic import
    // =========================================================================

    /// Try to attach a package wire for `pkg` through one of the module's
    /// dynamic-requirement patterns. Candidate failures are swallowed;
    /// the first workable provider wins.
    pub fn attempt_dynamic_import(&self, importer: ModuleHandle, pkg: &str) -> Option<Wire> {
        // A module that already wires the package gets nothing new; the
        // class simply does not exist there.
        if self
            .registry
            .wires(importer)
            .iter()
            .any(|w| w.is_package_wire_for(pkg))
        {
            return None;
        }

        let definition = self.registry.definition(importer)?;
        let mut created: Option<Wire> = None;
        let mut resolved: Vec<(ModuleHandle, ModuleId)> = Vec::new();

        for dynamic in definition.dynamic_requirements() {
            let Some(pattern) = dynamic.target_package() else {
                continue;
            };
            if !dynamic_pattern_matches(&pattern, pkg) {
                continue;
            }

            // Pin the pattern's filter to the precise package we need; a
            // bare pattern cannot tell us which package it matched.
            let req = Requirement::new(
                Namespace::Package,
                pinned_dynamic_filter(dynamic.filter(), pkg),
            );

            {
                let mut inner = self.registry.lock();

                let mut candidate = in_use_candidates(&inner, &req).into_iter().next();

                if candidate.is_none() {
                    for unused in unused_candidates(&inner, &req) {
                        match resolve_locked(&mut inner, unused.module()) {
                            Ok(newly) => {
                                resolved.extend(newly);
                                candidate = Some(unused);
                                break;
                            }
                            Err(err) => {
                                warn!(
                                    module = %unused.module(),
                                    error = %err,
                                    "dynamic import candidate failed to resolve"
                                );
                            }
                        }
                    }
                }

                if let Some(candidate) = candidate {
                    let wire = Wire::package(importer, &candidate);
                    debug!(%wire, "dynamic import");
                    inner.append_wire(importer, wire.clone());
                    inner.add_in_use(candidate.module(), candidate.capability().clone());
                    created = Some(wire);
                }
            }

            if created.is_some() {
                break;
            }
        }

        self.fire_resolved(&resolved);
        created
    }

    // =========================================================================
    // Auxiliary operations
    // =========================================================================

    /// Path of a native library declared by the module, if any.
    pub fn find_library(&self, module: ModuleHandle, name: &str) -> Option<String> {
        let name = name.strip_prefix('/').unwrap_or(name);
        let definition = self.registry.definition(module)?;
        definition
            .libraries()
            .iter()
            .find_map(|lib| lib.path_for(name).map(str::to_string))
    }

    /// Sealed attributes for a package the module exports, if it does.
    pub fn define_package(&self, module: ModuleHandle, pkg: &str) -> Option<PackageAttrs> {
        let definition = self.registry.definition(module)?;
        let req = Requirement::new(Namespace::Package, Filter::eq(PACKAGE_PROPERTY, pkg));
        let (_, cap) = definition.satisfying_capability(&req)?;
        Some(PackageAttrs {
            spec_title: Arc::from(pkg),
            spec_version: Arc::from(cap.version().to_string().as_str()),
            spec_vendor: Arc::from(""),
            impl_title: Arc::from(""),
            impl_version: Arc::from(""),
            impl_vendor: Arc::from(""),
        })
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_resolver_listener(&self, listener: Arc<dyn ResolverListener>) {
        let mut guard = self.listeners.lock();
        let mut list: Vec<Arc<dyn ResolverListener>> = guard.to_vec();
        list.push(listener);
        *guard = Arc::from(list.into_boxed_slice());
    }

    pub fn remove_resolver_listener(&self, listener: &Arc<dyn ResolverListener>) {
        let mut guard = self.listeners.lock();
        let list: Vec<Arc<dyn ResolverListener>> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        *guard = Arc::from(list.into_boxed_slice());
    }

    fn fire_resolved(&self, newly: &[(ModuleHandle, ModuleId)]) {
        if newly.is_empty() {
            return;
        }
        let snapshot = self.listeners.lock().clone();
        for (handle, id) in newly {
            let event = ModuleEvent {
                module: *handle,
                id: *id,
                resolved: true,
            };
            for listener in snapshot.iter() {
                deliver("resolver event", || listener.module_resolved(&event));
            }
        }
    }

    fn fire_unresolved(&self, event: &ModuleEvent) {
        let snapshot = self.listeners.lock().clone();
        for listener in snapshot.iter() {
            deliver("resolver event", || listener.module_unresolved(event));
        }
    }
}

/// Bridges registry removals to `module_unresolved` events.
struct UnresolveHook {
    policy: Weak<SearchPolicy>,
}

impl ModuleListener for UnresolveHook {
    fn module_removed(&self, event: &ModuleEvent) {
        if event.resolved {
            if let Some(policy) = self.policy.upgrade() {
                policy.fire_unresolved(event);
            }
        }
    }
}

// =============================================================================
// Name helpers
// =============================================================================

/// Package of a binary class name: `org.demo.Widget` → `org.demo`.
/// Empty for the default package.
pub(crate) fn class_package(name: &str) -> &str {
    name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

/// Package of a resource path: `org/demo/widget.png` → `org.demo`.
pub(crate) fn resource_package(name: &str) -> String {
    let path = name.strip_prefix('/').unwrap_or(name);
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.replace('/', "."),
        None => String::new(),
    }
}

/// Does a dynamic-requirement pattern cover `pkg`? Patterns are `*`, an
/// exact package, or a wildcarded prefix `p.*` (which covers `p` itself).
pub(crate) fn dynamic_pattern_matches(pattern: &str, pkg: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(stem) => {
            pkg == stem
                || pkg
                    .strip_prefix(stem)
                    .map_or(false, |rest| rest.starts_with('.'))
        }
        None => pkg == pattern,
    }
}

/// Rebuild a dynamic requirement's filter around the package actually
/// being searched: the wildcard package term matched already and is
/// replaced by `(package=pkg)`; every other constraint is kept.
pub(crate) fn pinned_dynamic_filter(dynamic: &Filter, pkg: &str) -> Filter {
    fn is_package_term(filter: &Filter) -> bool {
        matches!(
            filter,
            Filter::Eq { attr, .. }
                | Filter::Ge { attr, .. }
                | Filter::Le { attr, .. }
                | Filter::Present { attr }
                | Filter::Substring { attr, .. }
            if attr.as_ref() == PACKAGE_PROPERTY
        )
    }

    let mut operands: Vec<Filter> = match dynamic {
        Filter::And(ops) => ops.iter().filter(|f| !is_package_term(f)).cloned().collect(),
        f if is_package_term(f) => Vec::new(),
        f => vec![f.clone()],
    };
    operands.push(Filter::eq(PACKAGE_PROPERTY, pkg));
    Filter::and(operands)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ContentLoader;
    use lattice_core::{Capability, ModuleDefinition, NativeLibrary, Version};
    use rustc_hash::FxHashMap;

    struct NoContent;

    impl ContentLoader for NoContent {
        fn get_class(&self, _name: &str) -> Option<LoadedClass> {
            None
        }
        fn get_resource(&self, _name: &str) -> Option<ResourceUrl> {
            None
        }
        fn get_resources(&self, _name: &str) -> Option<Vec<ResourceUrl>> {
            None
        }
    }

    struct MapHost {
        classes: FxHashMap<String, LoadedClass>,
    }

    impl MapHost {
        fn with(names: &[&str]) -> Arc<Self> {
            Arc::new(MapHost {
                classes: names
                    .iter()
                    .map(|n| (n.to_string(), LoadedClass::new(*n, vec![0u8])))
                    .collect(),
            })
        }
    }

    impl HostLoader for MapHost {
        fn load_class(&self, name: &str) -> Option<LoadedClass> {
            self.classes.get(name).cloned()
        }
        fn get_resource(&self, _name: &str) -> Option<ResourceUrl> {
            None
        }
        fn get_resources(&self, _name: &str) -> Option<Vec<ResourceUrl>> {
            None
        }
    }

    fn policy_with_host(host: Arc<dyn HostLoader>) -> (Arc<ModuleRegistry>, Arc<SearchPolicy>) {
        let registry = Arc::new(ModuleRegistry::new());
        let policy = SearchPolicy::new(registry.clone(), PolicyConfig::default(), host);
        (registry, policy)
    }

    #[test]
    fn test_class_package_helper() {
        assert_eq!(class_package("org.demo.Widget"), "org.demo");
        assert_eq!(class_package("Widget"), "");
    }

    #[test]
    fn test_resource_package_helper() {
        assert_eq!(resource_package("org/demo/widget.png"), "org.demo");
        assert_eq!(resource_package("/org/demo/widget.png"), "org.demo");
        assert_eq!(resource_package("widget.png"), "");
    }

    #[test]
    fn test_dynamic_pattern_matching() {
        assert!(dynamic_pattern_matches("*", "anything.at.all"));
        assert!(dynamic_pattern_matches("org.demo", "org.demo"));
        assert!(!dynamic_pattern_matches("org.demo", "org.demo.sub"));
        assert!(dynamic_pattern_matches("org.demo.*", "org.demo"));
        assert!(dynamic_pattern_matches("org.demo.*", "org.demo.sub"));
        assert!(!dynamic_pattern_matches("org.demo.*", "org.demonstration"));
    }

    #[test]
    fn test_boot_delegation_hits_host_and_bypasses_wires() {
        let host = MapHost::with(&["java.util.HashMap"]);
        let (registry, policy) = policy_with_host(host);
        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::default()),
            Arc::new(NoContent),
            None,
        );

        let class = policy
            .find_class(m, "java.util.HashMap", Caller::Module)
            .unwrap();
        assert_eq!(class.name(), "java.util.HashMap");
    }

    #[test]
    fn test_default_package_is_not_boot_delegated() {
        let host = MapHost::with(&["Rootless"]);
        let (registry, policy) = policy_with_host(host);
        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::default()),
            Arc::new(NoContent),
            None,
        );

        // "Rootless" lives in the default package; the host is only
        // reachable for it through the host-caller concession.
        assert!(policy.find_class(m, "Rootless", Caller::Module).is_err());
        assert!(policy.find_class(m, "Rootless", Caller::Host).is_ok());
    }

    #[test]
    fn test_host_caller_fallback_applies_only_on_miss() {
        let host = MapHost::with(&["org.elsewhere.Thing"]);
        let (registry, policy) = policy_with_host(host);
        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::default()),
            Arc::new(NoContent),
            None,
        );

        assert!(policy
            .find_class(m, "org.elsewhere.Thing", Caller::Module)
            .is_err());
        assert!(policy
            .find_class(m, "org.elsewhere.Thing", Caller::Host)
            .is_ok());
    }

    #[test]
    fn test_find_library_strips_leading_slash() {
        let host = MapHost::with(&[]);
        let (registry, policy) = policy_with_host(host);
        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::new(
                vec![],
                vec![],
                vec![],
                vec![NativeLibrary::new("crypto", "native/crypto.so")],
            )),
            Arc::new(NoContent),
            None,
        );

        assert_eq!(
            policy.find_library(m, "/crypto").as_deref(),
            Some("native/crypto.so")
        );
        assert!(policy.find_library(m, "other").is_none());
    }

    #[test]
    fn test_define_package_reports_sealed_attributes() {
        let host = MapHost::with(&[]);
        let (registry, policy) = policy_with_host(host);
        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::new(
                vec![Capability::package("org.demo", Version::new(1, 2, 0))],
                vec![],
                vec![],
                vec![],
            )),
            Arc::new(NoContent),
            None,
        );

        let attrs = policy.define_package(m, "org.demo").unwrap();
        assert_eq!(attrs.spec_title.as_ref(), "org.demo");
        assert_eq!(attrs.spec_version.as_ref(), "1.2.0");
        assert!(policy.define_package(m, "org.absent").is_none());
    }

    #[test]
    fn test_unresolved_event_fires_on_removal_of_resolved_module() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Unresolves(AtomicUsize);
        impl ResolverListener for Unresolves {
            fn module_unresolved(&self, _event: &ModuleEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let host = MapHost::with(&[]);
        let (registry, policy) = policy_with_host(host);
        let counter = Arc::new(Unresolves(AtomicUsize::new(0)));
        policy.add_resolver_listener(counter.clone());

        let m = registry.add_module(
            ModuleId::new(1, 0),
            Arc::new(ModuleDefinition::default()),
            Arc::new(NoContent),
            None,
        );
        policy.resolve(m).unwrap();
        registry.remove_module(m);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Removing an unresolved module fires nothing.
        let n = registry.add_module(
            ModuleId::new(2, 0),
            Arc::new(ModuleDefinition::default()),
            Arc::new(NoContent),
            None,
        );
        registry.remove_module(n);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
