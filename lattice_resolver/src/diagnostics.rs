//! Human-readable explanations for failed class lookups.
//!
//! Produced once, at failure time, by case analysis over the wiring
//! state. Each case names the modules involved and suggests the fix with
//! the best modularity properties first.

use lattice_core::{Filter, Namespace, Requirement, PACKAGE_PROPERTY};

use crate::candidates::{in_use_candidates, unused_candidates};
use crate::config::{PolicyConfig, BOOT_DELEGATION_PROP, SYSTEM_PACKAGES_PROP};
use crate::module::{HostLoader, ModuleHandle};
use crate::policy::{class_package, dynamic_pattern_matches, pinned_dynamic_filter};
use crate::registry::ModuleRegistry;
use crate::source::PackageSource;

/// Explain why `name` could not be loaded for `module`.
pub(crate) fn diagnose(
    registry: &ModuleRegistry,
    host: &dyn HostLoader,
    config: &PolicyConfig,
    module: ModuleHandle,
    name: &str,
) -> String {
    let pkg = class_package(name);
    let importer = registry
        .module_id(module)
        .map(|id| id.to_string())
        .unwrap_or_else(|| module.to_string());

    // Case (a): the package is imported, so the exporter's content is
    // simply missing the class.
    for wire in registry.wires(module) {
        if wire.is_package_wire_for(pkg) {
            let exporter = registry
                .module_id(wire.exporter())
                .map(|id| id.to_string())
                .unwrap_or_else(|| wire.exporter().to_string());
            return format!(
                "package '{pkg}' is imported by module {importer} from module {exporter}, \
                 but the exported package does not contain '{name}'; verify the class name \
                 in module {importer} and the packaged content of module {exporter}"
            );
        }
    }

    let definition = registry.definition(module);
    let plain_req = Requirement::new(Namespace::Package, Filter::eq(PACKAGE_PROPERTY, pkg));

    // Case (b): the package is optionally imported.
    if let Some(def) = &definition {
        for req in def.requirements() {
            if req.is_optional() && req.target_package().as_deref() == Some(pkg) {
                return match first_exporter(registry, &plain_req) {
                    Some(exporter) => {
                        let exp = registry
                            .module_id(exporter.module())
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| exporter.module().to_string());
                        if req.is_satisfied_by(exporter.capability()) {
                            format!(
                                "'{name}' was not found, but package '{pkg}' is optionally \
                                 imported by module {importer}; module {exp} does export it, \
                                 and must be resolvable before module {importer} resolves or \
                                 the optional import is ignored"
                            )
                        } else {
                            format!(
                                "'{name}' was not found, but package '{pkg}' is optionally \
                                 imported by module {importer}; module {exp} exports it with \
                                 attributes that do not match the import"
                            )
                        }
                    }
                    None => format!(
                        "'{name}' was not found, which is likely normal: package '{pkg}' is \
                         optionally imported by module {importer} and no module exports it"
                    ),
                };
            }
        }

        // Case (c): the package is dynamically importable.
        for dynamic in def.dynamic_requirements() {
            let covers = dynamic
                .target_package()
                .map_or(false, |pattern| dynamic_pattern_matches(&pattern, pkg));
            if covers {
                let pinned = Requirement::new(
                    Namespace::Package,
                    pinned_dynamic_filter(dynamic.filter(), pkg),
                );
                let mismatch = first_exporter(registry, &plain_req)
                    .filter(|exporter| !pinned.is_satisfied_by(exporter.capability()));
                return match mismatch {
                    Some(exporter) => {
                        let exp = registry
                            .module_id(exporter.module())
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| exporter.module().to_string());
                        format!(
                            "'{name}' was not found, but package '{pkg}' is dynamically \
                             importable by module {importer}; module {exp} exports it with \
                             attributes that do not match the dynamic import"
                        )
                    }
                    None => format!(
                        "'{name}' was not found, which is likely normal: package '{pkg}' is \
                         dynamically imported by module {importer} and no matching exporter \
                         was available"
                    ),
                };
            }
        }
    }

    let exporter = first_exporter(registry, &plain_req);
    let on_host_path = host.load_class(name).is_some();

    match (exporter, on_host_path) {
        // Case (d): an exporter exists but the importer never imports it.
        (Some(exporter), on_host) => {
            let exp = registry
                .module_id(exporter.module())
                .map(|id| id.to_string())
                .unwrap_or_else(|| exporter.module().to_string());
            if on_host {
                format!(
                    "'{name}' was not found because module {importer} does not import \
                     '{pkg}', even though module {exp} exports it and the class is also on \
                     the host class path; either add an import for '{pkg}' to module \
                     {importer} (preferred, preserves modularity) or add '{pkg}' to the \
                     '{BOOT_DELEGATION_PROP}' property"
                )
            } else {
                format!(
                    "'{name}' was not found because module {importer} does not import \
                     '{pkg}', even though module {exp} exports it; add an import for \
                     '{pkg}' to module {importer}"
                )
            }
        }
        // Case (e): host class path only.
        (None, true) => {
            let current = match config.system_packages() {
                Some(packages) => format!(" (currently: '{packages}')"),
                None => String::new(),
            };
            format!(
                "package '{pkg}' is neither imported by module {importer} nor exported by \
                 any module, but '{name}' is available from the host class path; either \
                 add '{pkg}' to the '{SYSTEM_PACKAGES_PROP}' property{current} and import \
                 it in module {importer} (preferred, preserves modularity) or add '{pkg}' \
                 to the '{BOOT_DELEGATION_PROP}' property"
            )
        }
        // Case (f): nothing anywhere.
        (None, false) => format!(
            "'{name}' was not found: module {importer} does not import package '{pkg}', no \
             module exports it, and it is not available from the host class path"
        ),
    }
}

/// Best available exporter for a requirement: in-use first, then unused.
fn first_exporter(registry: &ModuleRegistry, req: &Requirement) -> Option<PackageSource> {
    let inner = registry.lock();
    in_use_candidates(&inner, req)
        .into_iter()
        .next()
        .or_else(|| unused_candidates(&inner, req).into_iter().next())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ContentLoader, LoadedClass, ModuleId, ResourceUrl};
    use lattice_core::{Capability, ModuleDefinition, Version};
    use rustc_hash::FxHashMap;
    use std::sync::Arc;

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

    fn empty_host() -> MapHost {
        MapHost {
            classes: FxHashMap::default(),
        }
    }

    fn host_with(name: &str) -> MapHost {
        MapHost {
            classes: [(name.to_string(), LoadedClass::new(name, vec![0u8]))]
                .into_iter()
                .collect(),
        }
    }

    fn add(
        registry: &ModuleRegistry,
        bundle: u64,
        definition: ModuleDefinition,
    ) -> ModuleHandle {
        registry.add_module(
            ModuleId::new(bundle, 0),
            Arc::new(definition),
            Arc::new(NoContent),
            None,
        )
    }

    #[test]
    fn test_case_no_exporter_at_all() {
        let registry = ModuleRegistry::new();
        let m = add(&registry, 1, ModuleDefinition::default());
        let text = diagnose(
            &registry,
            &empty_host(),
            &PolicyConfig::default(),
            m,
            "org.ghost.Thing",
        );
        assert!(text.contains("no module exports it"));
        assert!(text.contains("org.ghost"));
    }

    #[test]
    fn test_case_exporter_without_import() {
        let registry = ModuleRegistry::new();
        add(
            &registry,
            1,
            ModuleDefinition::new(
                vec![Capability::package("org.demo", Version::new(1, 0, 0))],
                vec![],
                vec![],
                vec![],
            ),
        );
        let m = add(&registry, 2, ModuleDefinition::default());
        let text = diagnose(
            &registry,
            &empty_host(),
            &PolicyConfig::default(),
            m,
            "org.demo.Widget",
        );
        assert!(text.contains("does not import"));
        assert!(text.contains("1.0 exports it"));
    }

    #[test]
    fn test_case_host_class_path_only() {
        let registry = ModuleRegistry::new();
        let m = add(&registry, 1, ModuleDefinition::default());
        let text = diagnose(
            &registry,
            &host_with("org.sys.Util"),
            &PolicyConfig::default(),
            m,
            "org.sys.Util",
        );
        assert!(text.contains("host class path"));
        assert!(text.contains(SYSTEM_PACKAGES_PROP));
    }

    #[test]
    fn test_case_optional_import_without_exporter() {
        use lattice_core::Namespace;

        let registry = ModuleRegistry::new();
        let m = add(
            &registry,
            1,
            ModuleDefinition::new(
                vec![],
                vec![Requirement::new(
                    Namespace::Package,
                    Filter::parse("(package=org.maybe)").unwrap(),
                )
                .optional()],
                vec![],
                vec![],
            ),
        );
        let text = diagnose(
            &registry,
            &empty_host(),
            &PolicyConfig::default(),
            m,
            "org.maybe.Thing",
        );
        assert!(text.contains("optionally imported"));
    }

    #[test]
    fn test_case_dynamic_import_without_exporter() {
        use lattice_core::Namespace;

        let registry = ModuleRegistry::new();
        let m = add(
            &registry,
            1,
            ModuleDefinition::new(
                vec![],
                vec![],
                vec![Requirement::new(
                    Namespace::Package,
                    Filter::parse("(package=org.lazy.*)").unwrap(),
                )],
                vec![],
            ),
        );
        let text = diagnose(
            &registry,
            &empty_host(),
            &PolicyConfig::default(),
            m,
            "org.lazy.sub.Thing",
        );
        assert!(text.contains("dynamically imported"));
    }
}
