//! Class-space computation and the "uses" consistency check.
//!
//! For any module — resolved (read its wires) or tentatively configured
//! (read its candidate selections) — this module computes the map of every
//! package name visible to it and the set of sources each name comes from:
//!
//! 1. **Required** packages: module-namespace dependencies flattened to
//!    their transitively re-exported packages, sources unioned.
//! 2. **Exported** packages: the module's own package capabilities, merged
//!    in with source union.
//! 3. **Imported** packages: package-namespace dependencies; a single
//!    source that overwrites any required/exported entry of the same name.
//!
//! The uses walk then propagates each source capability's `uses` list
//! transitively and checks that every implied package is seen from a
//! subset-comparable source set. Any conflict means the current candidate
//! configuration cannot produce a single consistent class space.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use lattice_core::Namespace;

use crate::module::ModuleHandle;
use crate::registry::RegistryInner;
use crate::resolver::ResolverMap;
use crate::source::{PackageSource, ResolvedPackage};

/// Package name → visible sources.
pub(crate) type PackageMap = FxHashMap<Arc<str>, ResolvedPackage>;

/// Per-search memo of computed package maps, cleared on every odometer
/// advance.
pub(crate) type PackageMemo = FxHashMap<ModuleHandle, Arc<PackageMap>>;

/// Two uses paths demanded incompatible source sets for the same package.
pub(crate) struct UsesConflict;

/// Read-only view over the registry and the current candidate
/// configuration.
pub(crate) struct ClassSpace<'a> {
    inner: &'a RegistryInner,
    rmap: &'a ResolverMap,
}

impl<'a> ClassSpace<'a> {
    pub(crate) fn new(inner: &'a RegistryInner, rmap: &'a ResolverMap) -> Self {
        ClassSpace { inner, rmap }
    }

    // =========================================================================
    // Consistency predicate
    // =========================================================================

    /// True when the class space reachable from `module` is consistent
    /// under the current candidate configuration.
    pub(crate) fn is_consistent(
        &self,
        memo: &mut PackageMemo,
        cycle: &mut FxHashSet<ModuleHandle>,
        module: ModuleHandle,
    ) -> bool {
        if !cycle.insert(module) {
            return true;
        }

        let pkg_map = self.module_packages(memo, module);

        // Every source contributing to this module's class space must
        // itself be consistent.
        for rp in pkg_map.values() {
            for src in rp.sources() {
                if !self.is_consistent(memo, cycle, src.module()) {
                    return false;
                }
            }
        }

        let uses_map = match self.uses_constraints(memo, module) {
            Ok(map) => map,
            Err(UsesConflict) => {
                debug!(module = %module, "incompatible package sources in uses walk");
                return false;
            }
        };

        for (name, rp_uses) in &uses_map {
            if let Some(rp) = pkg_map.get(name) {
                if !rp.is_comparable_with(rp_uses) {
                    debug!(
                        module = %module,
                        package = %name,
                        "uses constraint violation: sees {} and {}",
                        rp, rp_uses
                    );
                    return false;
                }
            }
        }

        true
    }

    // =========================================================================
    // Uses constraints
    // =========================================================================

    /// Accumulate the uses constraints implied by every source in the
    /// module's package map.
    pub(crate) fn uses_constraints(
        &self,
        memo: &mut PackageMemo,
        module: ModuleHandle,
    ) -> Result<PackageMap, UsesConflict> {
        let mut uses_map = PackageMap::default();
        let pkg_map = self.module_packages(memo, module);

        for rp in pkg_map.values() {
            for src in rp.sources() {
                let mut cycle = FxHashSet::default();
                self.walk_uses(memo, src, &mut uses_map, &mut cycle)?;
            }
        }

        Ok(uses_map)
    }

    fn walk_uses(
        &self,
        memo: &mut PackageMemo,
        source: &PackageSource,
        uses_map: &mut PackageMap,
        cycle: &mut FxHashSet<PackageSource>,
    ) -> Result<(), UsesConflict> {
        if !cycle.insert(source.clone()) {
            return Ok(());
        }

        let pkg_map = self.module_packages(memo, source.module());

        for use_name in source.capability().uses() {
            let Some(rp) = pkg_map.get(use_name.as_ref()) else {
                continue;
            };

            for src in rp.sources() {
                self.walk_uses(memo, src, uses_map, cycle)?;
            }

            match uses_map.get_mut(use_name.as_ref()) {
                Some(existing) => {
                    // Compatibility widens to the union; anything else is
                    // a genuine conflict.
                    if existing.is_comparable_with(rp) {
                        existing.merge(rp);
                    } else {
                        return Err(UsesConflict);
                    }
                }
                None => {
                    uses_map.insert(use_name.clone(), rp.clone());
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Package maps
    // =========================================================================

    /// The module's package map, memoised for the current configuration.
    pub(crate) fn module_packages(
        &self,
        memo: &mut PackageMemo,
        module: ModuleHandle,
    ) -> Arc<PackageMap> {
        if let Some(map) = memo.get(&module) {
            return map.clone();
        }
        let map = Arc::new(self.calculate_module_packages(module));
        memo.insert(module, map.clone());
        map
    }

    fn calculate_module_packages(&self, module: ModuleHandle) -> PackageMap {
        let mut pkg_map = self.required_packages(module);

        // Exported packages merge into required with source union.
        merge_union(&mut pkg_map, self.exported_packages(module));

        // Imports overwrite: a package wire is the single authority for
        // its name.
        for (name, rp) in self.imported_packages(module) {
            pkg_map.insert(name, rp);
        }

        pkg_map
    }

    fn imported_packages(&self, module: ModuleHandle) -> PackageMap {
        let mut pkg_map = PackageMap::default();

        match self.rmap.get(module) {
            Some(sets) => {
                for cs in sets {
                    let sel = cs.selected();
                    if sel.capability().namespace() == Namespace::Package {
                        if let Some(name) = sel.capability().package_name() {
                            // One selection is the whole story for its
                            // package; a later set for the same name
                            // replaces, never merges.
                            let mut rp = ResolvedPackage::new(name.clone());
                            rp.add_source(sel.clone());
                            pkg_map.insert(name.clone(), rp);
                        }
                    }
                }
            }
            None => {
                if let Some(wires) = self.inner.wires(module) {
                    for wire in wires.iter() {
                        if wire.capability().namespace() == Namespace::Package {
                            if let (Some(name), Some(src)) = (
                                wire.capability().package_name(),
                                self.inner.source_for(wire.exporter(), wire.capability()),
                            ) {
                                let rp = pkg_map
                                    .entry(name.clone())
                                    .or_insert_with(|| ResolvedPackage::new(name.clone()));
                                rp.add_source(src);
                            }
                        }
                    }
                }
            }
        }

        pkg_map
    }

    fn exported_packages(&self, module: ModuleHandle) -> PackageMap {
        let mut pkg_map = PackageMap::default();

        if let Some(entry) = self.inner.entry(module) {
            for cap in entry.definition.capabilities() {
                if cap.namespace() == Namespace::Package {
                    if let (Some(name), Some(src)) =
                        (cap.package_name(), self.inner.source_for(module, cap))
                    {
                        let rp = pkg_map
                            .entry(name.clone())
                            .or_insert_with(|| ResolvedPackage::new(name.clone()));
                        rp.add_source(src);
                    }
                }
            }
        }

        pkg_map
    }

    fn required_packages(&self, module: ModuleHandle) -> PackageMap {
        let mut pkg_map = PackageMap::default();

        match self.rmap.get(module) {
            Some(sets) => {
                for cs in sets {
                    let sel = cs.selected();
                    if sel.capability().namespace() == Namespace::Module {
                        let mut cycle = FxHashSet::default();
                        cycle.insert(module);
                        let mut require_map = PackageMap::default();
                        self.flatten_exports(sel.module(), &mut require_map, &mut cycle);
                        merge_union(&mut pkg_map, require_map);
                    }
                }
            }
            None => {
                if let Some(wires) = self.inner.wires(module) {
                    for wire in wires.iter() {
                        if wire.capability().namespace() == Namespace::Module {
                            let mut cycle = FxHashSet::default();
                            let mut require_map = PackageMap::default();
                            self.flatten_exports(wire.exporter(), &mut require_map, &mut cycle);
                            merge_union(&mut pkg_map, require_map);
                        }
                    }
                }
            }
        }

        pkg_map
    }

    // =========================================================================
    // Re-export flattening
    // =========================================================================

    /// Everything `module` exports or transitively re-exports through its
    /// own module-namespace dependencies. Re-export is assumed total.
    pub(crate) fn flatten_exports(
        &self,
        module: ModuleHandle,
        pkg_map: &mut PackageMap,
        cycle: &mut FxHashSet<ModuleHandle>,
    ) {
        if !cycle.insert(module) {
            return;
        }

        match self.rmap.get(module) {
            Some(sets) => {
                for cs in sets {
                    let sel = cs.selected();
                    if sel.capability().namespace() == Namespace::Module {
                        let mut require_map = PackageMap::default();
                        self.flatten_exports(sel.module(), &mut require_map, cycle);
                        merge_union(pkg_map, require_map);
                    }
                }
            }
            None => {
                if let Some(wires) = self.inner.wires(module) {
                    for wire in wires.iter() {
                        if wire.capability().namespace() == Namespace::Module {
                            let mut require_map = PackageMap::default();
                            self.flatten_exports(wire.exporter(), &mut require_map, cycle);
                            merge_union(pkg_map, require_map);
                        }
                    }
                }
            }
        }

        if let Some(entry) = self.inner.entry(module) {
            for cap in entry.definition.capabilities() {
                if cap.namespace() == Namespace::Package {
                    if let (Some(name), Some(src)) =
                        (cap.package_name(), self.inner.source_for(module, cap))
                    {
                        let rp = pkg_map
                            .entry(name.clone())
                            .or_insert_with(|| ResolvedPackage::new(name.clone()));
                        rp.add_source(src);
                    }
                }
            }
        }
    }

    /// The flattened package map carried by a module wire to `target`,
    /// seeded with the importer in the cycle guard.
    pub(crate) fn candidate_required_packages(
        &self,
        importer: ModuleHandle,
        target: &PackageSource,
    ) -> PackageMap {
        let mut cycle = FxHashSet::default();
        cycle.insert(importer);
        let mut pkg_map = PackageMap::default();
        self.flatten_exports(target.module(), &mut pkg_map, &mut cycle);
        pkg_map
    }
}

/// Merge `src` into `dst`, unioning source sets on name collision.
fn merge_union(dst: &mut PackageMap, src: PackageMap) {
    for (name, rp) in src {
        match dst.get_mut(&name) {
            Some(existing) => existing.merge(&rp),
            None => {
                dst.insert(name, rp);
            }
        }
    }
}
