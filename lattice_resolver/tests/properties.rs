//! Property tests over randomly generated module topologies.
//!
//! Topologies are layered DAGs (module `i` may import only from modules
//! below it, plus a contended `shared` package with two exporters), so
//! every generated registry is resolvable and the interesting properties
//! are about the *shape* of the outcome: idempotence, determinism,
//! wire-set hygiene, and in-use bookkeeping.

mod common;

use std::sync::Arc;

use common::ModuleSpec;
use lattice_core::Version;
use lattice_resolver::{ModuleHandle, ModuleRegistry, PolicyConfig, SearchPolicy, WireKind};
use proptest::prelude::*;

// =============================================================================
// Topology generation
// =============================================================================

#[derive(Debug, Clone)]
struct Topology {
    /// Major version of each module's own package export.
    versions: Vec<u8>,
    /// imports[i][j] (j < i): module i imports p{j}.
    imports: Vec<Vec<bool>>,
    /// Module i's export declares uses on its imported packages.
    uses: Vec<bool>,
    /// Module i also imports the contended `shared` package.
    wants_shared: Vec<bool>,
}

impl Topology {
    fn len(&self) -> usize {
        self.versions.len()
    }
}

fn topology() -> impl Strategy<Value = Topology> {
    (2usize..6).prop_flat_map(|n| {
        (
            proptest::collection::vec(1u8..4, n),
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n),
            proptest::collection::vec(any::<bool>(), n),
            proptest::collection::vec(any::<bool>(), n),
        )
            .prop_map(|(versions, imports, uses, wants_shared)| Topology {
                versions,
                imports,
                uses,
                wants_shared,
            })
    })
}

/// Install the topology into a fresh registry. Two extra modules export
/// the contended `shared` package at different versions.
fn build(t: &Topology) -> (Arc<ModuleRegistry>, Arc<SearchPolicy>, Vec<ModuleHandle>) {
    let registry = Arc::new(ModuleRegistry::new());
    let policy = SearchPolicy::new(
        registry.clone(),
        PolicyConfig::default(),
        Arc::new(common::MapHost::default()),
    );

    ModuleSpec::new(100)
        .exports("shared", Version::new(1, 0, 0))
        .install(&registry);
    ModuleSpec::new(101)
        .exports("shared", Version::new(2, 0, 0))
        .install(&registry);

    let mut handles = Vec::with_capacity(t.len());
    for i in 0..t.len() {
        let imported: Vec<String> = (0..i)
            .filter(|&j| t.imports[i][j])
            .map(|j| format!("p{}", j))
            .collect();

        let mut spec = ModuleSpec::new(i as u64);
        spec = if t.uses[i] {
            let uses: Vec<&str> = imported.iter().map(String::as_str).collect();
            spec.exports_with_uses(
                &format!("p{}", i),
                Version::new(t.versions[i] as u32, 0, 0),
                &uses,
            )
        } else {
            spec.exports(&format!("p{}", i), Version::new(t.versions[i] as u32, 0, 0))
        };

        for pkg in &imported {
            spec = spec.requires(&format!("(package={})", pkg));
        }
        if t.wants_shared[i] {
            spec = spec.requires("(package=shared)");
        }

        handles.push(spec.install(&registry));
    }

    (registry, policy, handles)
}

/// Order-independent fingerprint of every module's wire list.
fn fingerprint(registry: &ModuleRegistry, handles: &[ModuleHandle]) -> Vec<String> {
    let mut all = Vec::new();
    for &handle in handles {
        for wire in registry.wires(handle) {
            all.push(format!(
                "{}->{}:{}",
                registry.module_id(wire.importer()).unwrap(),
                registry.module_id(wire.exporter()).unwrap(),
                wire.capability()
            ));
        }
    }
    all.sort();
    all
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Invariant 1 — resolving twice changes nothing.
    #[test]
    fn resolve_is_idempotent(t in topology()) {
        let (registry, policy, handles) = build(&t);

        for &h in &handles {
            policy.resolve(h).unwrap();
        }
        let first = fingerprint(&registry, &handles);
        let resolved: Vec<bool> = handles.iter().map(|&h| registry.is_resolved(h)).collect();

        for &h in &handles {
            policy.resolve(h).unwrap();
        }
        let second = fingerprint(&registry, &handles);
        let resolved_again: Vec<bool> = handles.iter().map(|&h| registry.is_resolved(h)).collect();

        prop_assert_eq!(first, second);
        prop_assert_eq!(resolved, resolved_again);
    }

    /// Invariant 2 — identical registries resolve identically.
    #[test]
    fn resolve_is_deterministic(t in topology()) {
        let (registry_a, policy_a, handles_a) = build(&t);
        let (registry_b, policy_b, handles_b) = build(&t);

        for &h in &handles_a {
            policy_a.resolve(h).unwrap();
        }
        for &h in &handles_b {
            policy_b.resolve(h).unwrap();
        }

        prop_assert_eq!(
            fingerprint(&registry_a, &handles_a),
            fingerprint(&registry_b, &handles_b)
        );
    }

    /// Invariant 3 — no two package wires of one importer resolve the
    /// same package.
    #[test]
    fn no_duplicate_package_wires(t in topology()) {
        let (registry, policy, handles) = build(&t);
        for &h in &handles {
            policy.resolve(h).unwrap();
        }

        for &h in &handles {
            let mut seen = std::collections::BTreeSet::new();
            for wire in registry.wires(h) {
                if matches!(wire.kind(), WireKind::Package) {
                    let pkg = wire.capability().package_name().unwrap().to_string();
                    prop_assert!(seen.insert(pkg), "duplicate package wire on {}", h);
                }
            }
        }
    }

    /// Invariant 7 — every wire's exporter capability is tracked in use.
    #[test]
    fn wired_capabilities_are_in_use(t in topology()) {
        let (registry, policy, handles) = build(&t);
        for &h in &handles {
            policy.resolve(h).unwrap();
        }

        for &h in &handles {
            for wire in registry.wires(h) {
                let in_use = registry.in_use_capabilities(wire.exporter());
                prop_assert!(
                    in_use.iter().any(|cap| Arc::ptr_eq(cap, wire.capability())),
                    "wire capability not tracked in use for exporter {}",
                    wire.exporter()
                );
            }
        }
    }

    /// Resolved modules always have every non-optional requirement wired.
    #[test]
    fn resolved_modules_cover_their_requirements(t in topology()) {
        let (registry, policy, handles) = build(&t);
        for &h in &handles {
            policy.resolve(h).unwrap();
        }

        for &h in &handles {
            prop_assert!(registry.is_resolved(h));
            let definition = registry.definition(h).unwrap();
            let wires = registry.wires(h);
            for req in definition.requirements() {
                if !req.is_optional() {
                    prop_assert!(
                        wires.iter().any(|w| req.is_satisfied_by(w.capability())),
                        "unwired requirement {} on {}",
                        req,
                        h
                    );
                }
            }
        }
    }
}
