//! The resolver — candidate population, configuration search, wire commit.
//!
//! `resolve_locked` runs entirely under one acquisition of the factory
//! lock, in three phases:
//!
//! - **Populate**: depth-first from the root, build one [`CandidateSet`]
//!   per requirement (in-use candidates first, then unused), recursively
//!   populating each candidate's own module. Unresolvable candidates are
//!   dropped; an empty set for a non-optional requirement fails the
//!   resolve.
//! - **Search**: test class-space consistency for the root; on conflict,
//!   advance the candidate configuration like an odometer over the flat,
//!   insertion-ordered sequence of all candidate sets and retest with
//!   fresh memo state. Exhausting the odometer is a constraint violation.
//! - **Commit**: walk the chosen configuration building package wires
//!   (then module wires) per importer, mark every covered module resolved,
//!   and promote bound plus export-only capabilities into the in-use map.
//!
//! The caller fires resolved events for the returned modules after
//! releasing the lock.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};

use lattice_core::Namespace;

use crate::candidates::{in_use_candidates, unused_candidates};
use crate::class_space::{ClassSpace, PackageMemo};
use crate::error::ResolveError;
use crate::module::{ModuleHandle, ModuleId};
use crate::registry::RegistryInner;
use crate::source::{CandidateSet, PackageSource};
use crate::wire::Wire;

// =============================================================================
// Resolver map
// =============================================================================

/// Insertion-ordered map from module to its candidate sets. Insertion
/// order is what makes the odometer's flat ordering total and
/// deterministic.
#[derive(Default)]
pub(crate) struct ResolverMap {
    index: FxHashMap<ModuleHandle, usize>,
    entries: Vec<(ModuleHandle, Vec<CandidateSet>)>,
}

impl ResolverMap {
    pub(crate) fn contains(&self, module: ModuleHandle) -> bool {
        self.index.contains_key(&module)
    }

    fn insert_empty(&mut self, module: ModuleHandle) {
        debug_assert!(!self.contains(module));
        self.index.insert(module, self.entries.len());
        self.entries.push((module, Vec::new()));
    }

    fn push_set(&mut self, module: ModuleHandle, set: CandidateSet) {
        let idx = self.index[&module];
        self.entries[idx].1.push(set);
    }

    pub(crate) fn get(&self, module: ModuleHandle) -> Option<&[CandidateSet]> {
        self.index
            .get(&module)
            .map(|&idx| self.entries[idx].1.as_slice())
    }

    /// Flat odometer positions, in the order candidate sets were added.
    fn positions(&self) -> Vec<(usize, usize)> {
        let mut positions = Vec::new();
        for (entry_idx, (_, sets)) in self.entries.iter().enumerate() {
            for set_idx in 0..sets.len() {
                positions.push((entry_idx, set_idx));
            }
        }
        positions
    }

    fn set_mut(&mut self, pos: (usize, usize)) -> &mut CandidateSet {
        &mut self.entries[pos.0].1[pos.1]
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Resolve `root` transitively under the factory lock. Returns the newly
/// resolved modules in commit order so the caller can fire events after
/// releasing the lock.
pub(crate) fn resolve_locked(
    inner: &mut RegistryInner,
    root: ModuleHandle,
) -> Result<Vec<(ModuleHandle, ModuleId)>, ResolveError> {
    if inner.is_resolved(root) {
        return Ok(Vec::new());
    }

    let mut rmap = ResolverMap::default();
    populate(inner, &mut rmap, root)?;
    find_consistent_class_space(inner, &mut rmap, root)?;
    Ok(commit(inner, &rmap, root))
}

// =============================================================================
// Phase A — populate
// =============================================================================

fn populate(
    inner: &RegistryInner,
    rmap: &mut ResolverMap,
    module: ModuleHandle,
) -> Result<(), ResolveError> {
    // Cycle guard: the module's entry is recorded before any recursion.
    if rmap.contains(module) {
        return Ok(());
    }
    rmap.insert_empty(module);

    let Some((id, definition)) = inner.entry(module).map(|e| (e.id, e.definition.clone())) else {
        return Err(ResolveError::internal("module was removed during resolution"));
    };

    for req in definition.requirements() {
        // In-use candidates take precedence over unused ones.
        let mut candidates: Vec<Option<PackageSource>> = in_use_candidates(inner, req)
            .into_iter()
            .chain(unused_candidates(inner, req))
            .map(Some)
            .collect();

        let mut rethrow: Option<ResolveError> = None;
        for slot in candidates.iter_mut() {
            let candidate_module = slot.as_ref().map(|c| c.module());
            if let Some(cand_module) = candidate_module {
                if !inner.is_resolved(cand_module) {
                    if let Err(err) = populate(inner, rmap, cand_module) {
                        // The candidate cannot resolve; drop it but keep
                        // the error in case nothing else works out.
                        *slot = None;
                        rethrow = Some(err);
                    }
                }
            }
        }

        let candidates: Vec<PackageSource> = candidates.into_iter().flatten().collect();

        if candidates.is_empty() {
            if req.is_optional() {
                continue;
            }
            return Err(match rethrow {
                Some(err) => err,
                None => ResolveError::new(id, req.clone(), "unable to resolve"),
            });
        }

        rmap.push_set(module, CandidateSet::new(module, req.clone(), candidates));
    }

    Ok(())
}

// =============================================================================
// Phase B — configuration search
// =============================================================================

fn find_consistent_class_space(
    inner: &RegistryInner,
    rmap: &mut ResolverMap,
    root: ModuleHandle,
) -> Result<(), ResolveError> {
    // The flat ordering is established once, on the first conflict.
    let mut positions: Option<Vec<(usize, usize)>> = None;

    loop {
        let mut memo = PackageMemo::default();
        let mut cycle = FxHashSet::default();
        if ClassSpace::new(inner, rmap).is_consistent(&mut memo, &mut cycle, root) {
            return Ok(());
        }

        let positions = positions.get_or_insert_with(|| rmap.positions());
        advance_configuration(rmap, positions)?;
        trace!(module = %root, "advancing candidate configuration");
    }
}

/// Odometer step: increment the first candidate set that has room,
/// resetting every set before it. No set with room left means the space
/// is exhausted.
fn advance_configuration(
    rmap: &mut ResolverMap,
    positions: &[(usize, usize)],
) -> Result<(), ResolveError> {
    for &pos in positions {
        let set = rmap.set_mut(pos);
        if set.advance() {
            return Ok(());
        }
        set.reset();
    }
    Err(ResolveError::constraint_violation())
}

// =============================================================================
// Phase C — commit
// =============================================================================

/// Insertion-ordered wire map built during commit; the order is the event
/// delivery order.
#[derive(Default)]
struct WireMap {
    index: FxHashMap<ModuleHandle, usize>,
    entries: Vec<(ModuleHandle, Vec<Wire>)>,
}

impl WireMap {
    fn contains(&self, module: ModuleHandle) -> bool {
        self.index.contains_key(&module)
    }

    fn insert_empty(&mut self, module: ModuleHandle) {
        self.index.insert(module, self.entries.len());
        self.entries.push((module, Vec::new()));
    }

    fn set_wires(&mut self, module: ModuleHandle, wires: Vec<Wire>) {
        let idx = self.index[&module];
        self.entries[idx].1 = wires;
    }
}

fn commit(
    inner: &mut RegistryInner,
    rmap: &ResolverMap,
    root: ModuleHandle,
) -> Vec<(ModuleHandle, ModuleId)> {
    let mut wire_map = WireMap::default();
    populate_wire_map(inner, rmap, root, &mut wire_map);

    let mut newly_resolved = Vec::with_capacity(wire_map.entries.len());

    for (module, wires) in wire_map.entries {
        inner.set_resolved(module, true);

        for wire in &wires {
            debug!(%wire, "committing");
            inner.add_in_use(wire.exporter(), wire.capability().clone());
        }
        inner.set_wires(module, Arc::from(wires.into_boxed_slice()));

        // Export-only promotion: capabilities not matched by any of the
        // module's own requirements become visible commitments too.
        if let Some((id, definition)) = inner.entry(module).map(|e| (e.id, e.definition.clone())) {
            for cap in definition.capabilities() {
                let matched = definition
                    .requirements()
                    .iter()
                    .any(|req| req.is_satisfied_by(cap));
                if !matched {
                    inner.add_in_use(module, cap.clone());
                }
            }
            newly_resolved.push((module, id));
        }
    }

    newly_resolved
}

fn populate_wire_map(
    inner: &RegistryInner,
    rmap: &ResolverMap,
    importer: ModuleHandle,
    wire_map: &mut WireMap,
) {
    // Already-resolved modules and cycle re-entries contribute nothing.
    if inner.is_resolved(importer) || wire_map.contains(importer) {
        return;
    }
    wire_map.insert_empty(importer);

    let Some(sets) = rmap.get(importer) else {
        return;
    };

    let mut package_wires: SmallVec<[Wire; 4]> = SmallVec::new();
    let mut module_wires: SmallVec<[Wire; 4]> = SmallVec::new();

    for cs in sets {
        let selected = cs.selected();

        match cs.requirement().namespace() {
            Namespace::Module => {
                let packages =
                    ClassSpace::new(inner, rmap).candidate_required_packages(importer, selected);
                module_wires.push(Wire::module(importer, selected, packages));
            }
            Namespace::Package => {
                package_wires.push(Wire::package(importer, selected));
            }
        }

        populate_wire_map(inner, rmap, selected.module(), wire_map);
    }

    // Package wires first so direct imports win package lookups.
    package_wires.extend(module_wires);
    wire_map.set_wires(importer, package_wires.into_vec());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ContentLoader, LoadedClass, ResourceUrl};
    use crate::registry::ModuleRegistry;
    use lattice_core::{Capability, Filter, ModuleDefinition, Requirement, Version};

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

    fn add(
        registry: &ModuleRegistry,
        bundle: u64,
        caps: Vec<Capability>,
        reqs: Vec<Requirement>,
    ) -> ModuleHandle {
        registry.add_module(
            ModuleId::new(bundle, 0),
            Arc::new(ModuleDefinition::new(caps, reqs, vec![], vec![])),
            Arc::new(NoContent),
            None,
        )
    }

    fn require(filter: &str) -> Requirement {
        Requirement::new(Namespace::Package, Filter::parse(filter).unwrap())
    }

    #[test]
    fn test_resolve_wires_single_import() {
        let registry = ModuleRegistry::new();
        let a = add(
            &registry,
            1,
            vec![Capability::package("p", Version::new(1, 0, 0))],
            vec![],
        );
        let b = add(&registry, 2, vec![], vec![require("(package=p)")]);

        let mut inner = registry.lock();
        let newly = resolve_locked(&mut inner, b).unwrap();

        assert!(inner.is_resolved(a));
        assert!(inner.is_resolved(b));
        let wires = inner.wires(b).unwrap();
        assert_eq!(wires.len(), 1);
        assert_eq!(wires[0].exporter(), a);
        // Commit order: importer first, then its providers.
        let order: Vec<_> = newly.iter().map(|(h, _)| *h).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = ModuleRegistry::new();
        add(
            &registry,
            1,
            vec![Capability::package("p", Version::new(1, 0, 0))],
            vec![],
        );
        let b = add(&registry, 2, vec![], vec![require("(package=p)")]);

        let mut inner = registry.lock();
        resolve_locked(&mut inner, b).unwrap();
        let first = inner.wires(b).unwrap();
        let newly = resolve_locked(&mut inner, b).unwrap();
        assert!(newly.is_empty());
        let second = inner.wires(b).unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn test_missing_provider_fails_with_requirement() {
        let registry = ModuleRegistry::new();
        let b = add(&registry, 2, vec![], vec![require("(package=nowhere)")]);

        let mut inner = registry.lock();
        let err = resolve_locked(&mut inner, b).unwrap_err();
        assert!(err.requirement().is_some());
        assert!(!inner.is_resolved(b));
    }

    #[test]
    fn test_optional_requirement_tolerates_absence() {
        let registry = ModuleRegistry::new();
        let b = add(
            &registry,
            2,
            vec![],
            vec![require("(package=nowhere)").optional()],
        );

        let mut inner = registry.lock();
        resolve_locked(&mut inner, b).unwrap();
        assert!(inner.is_resolved(b));
        assert!(inner.wires(b).unwrap().is_empty());
    }

    #[test]
    fn test_cyclic_imports_resolve() {
        let registry = ModuleRegistry::new();
        let a = add(
            &registry,
            1,
            vec![Capability::package("pa", Version::new(1, 0, 0))],
            vec![require("(package=pb)")],
        );
        let b = add(
            &registry,
            2,
            vec![Capability::package("pb", Version::new(1, 0, 0))],
            vec![require("(package=pa)")],
        );

        let mut inner = registry.lock();
        resolve_locked(&mut inner, a).unwrap();
        assert!(inner.is_resolved(a));
        assert!(inner.is_resolved(b));
        assert_eq!(inner.wires(a).unwrap()[0].exporter(), b);
        assert_eq!(inner.wires(b).unwrap()[0].exporter(), a);
    }

    #[test]
    fn test_odometer_exhaustion_is_constraint_violation() {
        // A exports p (uses q) and can only accept q v1 from D; B demands
        // p together with q v2 from E. No configuration reconciles the
        // two views of q.
        let registry = ModuleRegistry::new();
        add(
            &registry,
            1,
            vec![Capability::package("q", Version::new(1, 0, 0))],
            vec![],
        );
        add(
            &registry,
            2,
            vec![Capability::package("p", Version::new(1, 0, 0)).with_uses(["q"])],
            vec![require("(&(package=q)(version<=1.0.0))")],
        );
        add(
            &registry,
            3,
            vec![Capability::package("q", Version::new(2, 0, 0))],
            vec![],
        );
        let b = add(
            &registry,
            4,
            vec![],
            vec![
                require("(package=p)"),
                require("(&(package=q)(version>=2.0.0))"),
            ],
        );

        let mut inner = registry.lock();
        let err = resolve_locked(&mut inner, b).unwrap_err();
        assert!(err.reason().contains("constraint violation"));
        assert!(!inner.is_resolved(b));
    }

    #[test]
    fn test_uses_conflict_advances_to_consistent_configuration() {
        // Same shape, but B's q requirement is open: the odometer walks
        // away from the E selection and settles on D for both.
        let registry = ModuleRegistry::new();
        let d = add(
            &registry,
            1,
            vec![Capability::package("q", Version::new(1, 0, 0))],
            vec![],
        );
        add(
            &registry,
            2,
            vec![Capability::package("p", Version::new(1, 0, 0)).with_uses(["q"])],
            vec![require("(&(package=q)(version<=1.0.0))")],
        );
        add(
            &registry,
            3,
            vec![Capability::package("q", Version::new(2, 0, 0))],
            vec![],
        );
        let b = add(
            &registry,
            4,
            vec![],
            vec![require("(package=p)"), require("(package=q)")],
        );

        let mut inner = registry.lock();
        resolve_locked(&mut inner, b).unwrap();

        let q_wire = inner
            .wires(b)
            .unwrap()
            .iter()
            .find(|w| w.provides_package("q"))
            .cloned()
            .unwrap();
        assert_eq!(q_wire.exporter(), d);
    }
}
