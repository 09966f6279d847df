//! Module identity and the host-provided seams.
//!
//! Modules are addressed by [`ModuleHandle`], a stable arena index issued
//! by the registry. Wires, candidate sets and package sources all carry
//! handles rather than owning references, which is what lets the resolver
//! represent cyclic module graphs without reference cycles.
//!
//! The traits at the bottom are the seams to the host runtime: content
//! access ([`ContentLoader`]), the security facility ([`SecurityContext`])
//! and the host's own loader used for boot delegation ([`HostLoader`]).
//! The core never implements these itself.

use std::fmt;
use std::sync::Arc;

// =============================================================================
// Identity
// =============================================================================

/// Stable public identity of a module: the bundle id plus the revision
/// number of this particular module incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId {
    bundle: u64,
    revision: u32,
}

impl ModuleId {
    #[inline]
    pub const fn new(bundle: u64, revision: u32) -> Self {
        ModuleId { bundle, revision }
    }

    #[inline]
    pub const fn bundle(&self) -> u64 {
        self.bundle
    }

    #[inline]
    pub const fn revision(&self) -> u32 {
        self.revision
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bundle, self.revision)
    }
}

/// Arena handle for a live module inside one registry.
///
/// Handles are issued sequentially and never reused within a registry's
/// lifetime, so a stale handle simply fails to look anything up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleHandle(u32);

impl ModuleHandle {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        ModuleHandle(index)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Loaded artifacts
// =============================================================================

/// A class produced by a content loader or the host loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl LoadedClass {
    pub fn new(name: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        LoadedClass {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Location of a resource inside module content or on the host path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUrl(Arc<str>);

impl ResourceUrl {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        ResourceUrl(url.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Host seams
// =============================================================================

/// Access to a module's own content. No delegation: a loader answers only
/// for the bytes packaged with its module.
pub trait ContentLoader: Send + Sync {
    /// Fetch a class by binary name (`org.demo.Widget`).
    fn get_class(&self, name: &str) -> Option<LoadedClass>;

    /// Fetch a resource by path (`org/demo/widget.png`).
    fn get_resource(&self, name: &str) -> Option<ResourceUrl>;

    /// Fetch every occurrence of a resource within this content.
    fn get_resources(&self, name: &str) -> Option<Vec<ResourceUrl>>;
}

/// Permission to export a package, checked against an exporter's security
/// context during candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePermission {
    package: Arc<str>,
    action: PackageAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    Export,
    Import,
}

impl PackagePermission {
    pub fn export(package: impl Into<Arc<str>>) -> Self {
        PackagePermission {
            package: package.into(),
            action: PackageAction::Export,
        }
    }

    pub fn import(package: impl Into<Arc<str>>) -> Self {
        PackagePermission {
            package: package.into(),
            action: PackageAction::Import,
        }
    }

    #[inline]
    pub fn package(&self) -> &str {
        &self.package
    }

    #[inline]
    pub fn action(&self) -> PackageAction {
        self.action
    }
}

/// The host security facility, injected per module. Absence of a context
/// means everything is permitted.
pub trait SecurityContext: Send + Sync {
    fn implies(&self, permission: &PackagePermission) -> bool;
}

/// The host runtime's own class loader, used for boot-delegated packages
/// and for the compatibility fallback of host-path callers.
pub trait HostLoader: Send + Sync {
    fn load_class(&self, name: &str) -> Option<LoadedClass>;

    fn get_resource(&self, name: &str) -> Option<ResourceUrl>;

    fn get_resources(&self, name: &str) -> Option<Vec<ResourceUrl>>;
}

// =============================================================================
// Tests
// =============================================================================
