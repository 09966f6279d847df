//! Package sources, resolved packages, and candidate sets.
//!
//! A [`PackageSource`] names one capability of one module. Identity is the
//! (module, capability-index) pair; the total order is what the resolver
//! uses everywhere a "best candidate first" sequence is needed: descending
//! capability version, then ascending bundle id, with handle/index
//! tie-breaks to make the order total (and therefore usable as a
//! `BTreeSet` key).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use lattice_core::{Capability, Requirement};

use crate::module::ModuleHandle;

// =============================================================================
// PackageSource
// =============================================================================

/// One capability of one module, as a candidate or committed provider.
#[derive(Debug, Clone)]
pub struct PackageSource {
    module: ModuleHandle,
    cap_index: u32,
    capability: Arc<Capability>,
    bundle: u64,
}

impl PackageSource {
    pub(crate) fn new(
        module: ModuleHandle,
        cap_index: u32,
        capability: Arc<Capability>,
        bundle: u64,
    ) -> Self {
        PackageSource {
            module,
            cap_index,
            capability,
            bundle,
        }
    }

    #[inline]
    pub fn module(&self) -> ModuleHandle {
        self.module
    }

    #[inline]
    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    /// Bundle id of the exporting module (the ordering tie-break).
    #[inline]
    pub fn bundle(&self) -> u64 {
        self.bundle
    }
}

impl PartialEq for PackageSource {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.cap_index == other.cap_index
    }
}

impl Eq for PackageSource {}

impl std::hash::Hash for PackageSource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.cap_index.hash(state);
    }
}

impl Ord for PackageSource {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest version first, then lowest bundle id; the remaining
        // fields only exist to make the order total.
        other
            .capability
            .version()
            .cmp(&self.capability.version())
            .then_with(|| self.bundle.cmp(&other.bundle))
            .then_with(|| self.module.cmp(&other.module))
            .then_with(|| self.cap_index.cmp(&other.cap_index))
    }
}

impl PartialOrd for PackageSource {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.capability, self.module)
    }
}

// =============================================================================
// ResolvedPackage
// =============================================================================

/// All sources from which one package name is simultaneously visible to a
/// particular importer. A single source means the package is imported; a
/// multi-source set arises from require-module flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    name: Arc<str>,
    sources: BTreeSet<PackageSource>,
}

impl ResolvedPackage {
    pub fn new(name: Arc<str>) -> Self {
        ResolvedPackage {
            name,
            sources: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    pub fn sources(&self) -> &BTreeSet<PackageSource> {
        &self.sources
    }

    #[inline]
    pub fn add_source(&mut self, source: PackageSource) {
        self.sources.insert(source);
    }

    /// Union the other set into this one.
    pub fn merge(&mut self, other: &ResolvedPackage) {
        for src in &other.sources {
            self.sources.insert(src.clone());
        }
    }

    /// True when `other`'s source set is contained in this one (names must
    /// agree). Subset comparability — in either direction — is the
    /// consistency criterion for uses constraints.
    pub fn is_superset_of(&self, other: &ResolvedPackage) -> bool {
        self.name == other.name && other.sources.is_subset(&self.sources)
    }

    /// Subset-comparable in either direction.
    pub fn is_comparable_with(&self, other: &ResolvedPackage) -> bool {
        self.is_superset_of(other) || other.is_superset_of(self)
    }
}

impl fmt::Display for ResolvedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from [", self.name)?;
        for (i, src) in self.sources.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", src.module())?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// CandidateSet
// =============================================================================

/// The ordered candidates for one requirement of one importer, plus the
/// index of the tentatively selected one. The resolver's odometer advances
/// these indices while searching for a consistent class space.
#[derive(Debug)]
pub struct CandidateSet {
    module: ModuleHandle,
    requirement: Requirement,
    candidates: Vec<PackageSource>,
    idx: usize,
}

impl CandidateSet {
    pub(crate) fn new(
        module: ModuleHandle,
        requirement: Requirement,
        candidates: Vec<PackageSource>,
    ) -> Self {
        debug_assert!(!candidates.is_empty());
        CandidateSet {
            module,
            requirement,
            candidates,
            idx: 0,
        }
    }

    #[inline]
    pub fn module(&self) -> ModuleHandle {
        self.module
    }

    #[inline]
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    #[inline]
    pub fn candidates(&self) -> &[PackageSource] {
        &self.candidates
    }

    /// The currently selected candidate.
    #[inline]
    pub fn selected(&self) -> &PackageSource {
        &self.candidates[self.idx]
    }

    /// Advance to the next candidate; false on overflow.
    pub(crate) fn advance(&mut self) -> bool {
        if self.idx + 1 < self.candidates.len() {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.idx = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================
