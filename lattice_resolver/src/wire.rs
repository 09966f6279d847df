//! Wires — committed bindings from an importer's requirement to an
//! exporter's capability.
//!
//! A package wire resolves exactly one package. A module wire resolves a
//! require-module dependency and carries the flattened package map of
//! everything the required module transitively exports; looking up through
//! it walks that class space source by source.

use std::fmt;
use std::sync::Arc;

use lattice_core::Capability;
use rustc_hash::FxHashMap;

use crate::module::{LoadedClass, ModuleHandle, ResourceUrl};
use crate::registry::ModuleRegistry;
use crate::source::{PackageSource, ResolvedPackage};

/// A committed binding of one importer requirement to one exporter
/// capability.
#[derive(Debug, Clone)]
pub struct Wire {
    importer: ModuleHandle,
    exporter: ModuleHandle,
    capability: Arc<Capability>,
    kind: WireKind,
}

/// The two wire shapes the core commits.
#[derive(Debug, Clone)]
pub enum WireKind {
    /// Resolves one package requirement.
    Package,
    /// Resolves a require-module dependency; carries the flattened set of
    /// packages transitively exported through the required module.
    Module {
        packages: FxHashMap<Arc<str>, ResolvedPackage>,
    },
}

impl Wire {
    /// A package wire to the selected candidate.
    pub(crate) fn package(importer: ModuleHandle, source: &PackageSource) -> Self {
        Wire {
            importer,
            exporter: source.module(),
            capability: source.capability().clone(),
            kind: WireKind::Package,
        }
    }

    /// A module wire carrying the flattened package map.
    pub(crate) fn module(
        importer: ModuleHandle,
        source: &PackageSource,
        packages: FxHashMap<Arc<str>, ResolvedPackage>,
    ) -> Self {
        Wire {
            importer,
            exporter: source.module(),
            capability: source.capability().clone(),
            kind: WireKind::Module { packages },
        }
    }

    #[inline]
    pub fn importer(&self) -> ModuleHandle {
        self.importer
    }

    #[inline]
    pub fn exporter(&self) -> ModuleHandle {
        self.exporter
    }

    #[inline]
    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    #[inline]
    pub fn kind(&self) -> &WireKind {
        &self.kind
    }

    /// True for a package wire resolving exactly `pkg`.
    pub fn is_package_wire_for(&self, pkg: &str) -> bool {
        matches!(self.kind, WireKind::Package)
            && self.capability.package_name().map(|p| p.as_ref()) == Some(pkg)
    }

    /// True when this wire makes `pkg` visible to the importer.
    pub fn provides_package(&self, pkg: &str) -> bool {
        match &self.kind {
            WireKind::Package => {
                self.capability.package_name().map(|p| p.as_ref()) == Some(pkg)
            }
            WireKind::Module { packages } => packages.contains_key(pkg),
        }
    }

    /// Look up a class through this wire. `None` means the wire does not
    /// cover the package, or the covered class space lacks the class;
    /// the caller continues its search either way.
    pub fn get_class(&self, registry: &ModuleRegistry, name: &str, pkg: &str) -> Option<LoadedClass> {
        match &self.kind {
            WireKind::Package => {
                if self.is_package_wire_for(pkg) {
                    registry.content_loader(self.exporter)?.get_class(name)
                } else {
                    None
                }
            }
            WireKind::Module { packages } => {
                let rp = packages.get(pkg)?;
                rp.sources()
                    .iter()
                    .find_map(|src| registry.content_loader(src.module())?.get_class(name))
            }
        }
    }

    /// Look up a resource through this wire.
    pub fn get_resource(
        &self,
        registry: &ModuleRegistry,
        name: &str,
        pkg: &str,
    ) -> Option<ResourceUrl> {
        match &self.kind {
            WireKind::Package => {
                if self.is_package_wire_for(pkg) {
                    registry.content_loader(self.exporter)?.get_resource(name)
                } else {
                    None
                }
            }
            WireKind::Module { packages } => {
                let rp = packages.get(pkg)?;
                rp.sources()
                    .iter()
                    .find_map(|src| registry.content_loader(src.module())?.get_resource(name))
            }
        }
    }

    /// Look up every occurrence of a resource through this wire. A
    /// non-empty result comes from a single source — no merging across
    /// sources, matching the no-split-packages assumption.
    pub fn get_resources(
        &self,
        registry: &ModuleRegistry,
        name: &str,
        pkg: &str,
    ) -> Option<Vec<ResourceUrl>> {
        match &self.kind {
            WireKind::Package => {
                if self.is_package_wire_for(pkg) {
                    registry.content_loader(self.exporter)?.get_resources(name)
                } else {
                    None
                }
            }
            WireKind::Module { packages } => {
                let rp = packages.get(pkg)?;
                rp.sources().iter().find_map(|src| {
                    registry
                        .content_loader(src.module())?
                        .get_resources(name)
                        .filter(|urls| !urls.is_empty())
                })
            }
        }
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WireKind::Package => write!(
                f,
                "wire {} -> {} [{}]",
                self.importer, self.exporter, self.capability
            ),
            WireKind::Module { packages } => {
                write!(
                    f,
                    "module wire {} -> {} [{}] ({} packages)",
                    self.importer,
                    self.exporter,
                    self.capability,
                    packages.len()
                )
            }
        }
    }
}
