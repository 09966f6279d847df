//! Capabilities — what a module offers to the rest of the system.
//!
//! A capability lives in a namespace (`package` or `module`), carries a
//! typed property map, and may declare a `uses` list: the packages its own
//! class space depends on. The resolver propagates `uses` edges
//! transitively when checking class-space consistency.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::version::Version;
use crate::{MODULE_PROPERTY, PACKAGE_PROPERTY, VERSION_PROPERTY};

// =============================================================================
// Namespaces & property values
// =============================================================================

/// The capability namespaces the core handles.
///
/// Future namespaces add variants here, not new types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// An exported package.
    Package,
    /// The module itself, as a target for require-module dependencies.
    Module,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Package => write!(f, "package"),
            Namespace::Module => write!(f, "module"),
        }
    }
}

/// A typed property value.
///
/// Filter evaluation dispatches on the stored type, so `(version>=1.2)`
/// compares versions numerically rather than lexically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(Arc<str>),
    Version(Version),
    Int(i64),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "{}", s),
            PropertyValue::Version(v) => write!(f, "{}", v),
            PropertyValue::Int(i) => write!(f, "{}", i),
        }
    }
}

// =============================================================================
// Capability
// =============================================================================

/// An offer by a module: an exported package or the module itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    namespace: Namespace,
    properties: FxHashMap<Arc<str>, PropertyValue>,
    uses: SmallVec<[Arc<str>; 4]>,
}

impl Capability {
    /// A `package` capability exporting `name` at `version` with no uses
    /// constraints.
    pub fn package(name: impl Into<Arc<str>>, version: Version) -> Self {
        let mut properties = FxHashMap::default();
        properties.insert(Arc::from(PACKAGE_PROPERTY), PropertyValue::Str(name.into()));
        properties.insert(Arc::from(VERSION_PROPERTY), PropertyValue::Version(version));
        Capability {
            namespace: Namespace::Package,
            properties,
            uses: SmallVec::new(),
        }
    }

    /// A `module` capability naming the module `name` at `version`.
    pub fn module(name: impl Into<Arc<str>>, version: Version) -> Self {
        let mut properties = FxHashMap::default();
        properties.insert(Arc::from(MODULE_PROPERTY), PropertyValue::Str(name.into()));
        properties.insert(Arc::from(VERSION_PROPERTY), PropertyValue::Version(version));
        Capability {
            namespace: Namespace::Module,
            properties,
            uses: SmallVec::new(),
        }
    }

    /// Attach a `uses` list; returns self for chaining.
    pub fn with_uses<I, S>(mut self, uses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.uses = uses.into_iter().map(Into::into).collect();
        self
    }

    /// Set an additional property; returns self for chaining.
    pub fn with_property(mut self, key: impl Into<Arc<str>>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    #[inline]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[inline]
    pub fn properties(&self) -> &FxHashMap<Arc<str>, PropertyValue> {
        &self.properties
    }

    /// The ordered `uses` list (possibly empty).
    #[inline]
    pub fn uses(&self) -> &[Arc<str>] {
        &self.uses
    }

    /// The `package` property of a package capability.
    pub fn package_name(&self) -> Option<&Arc<str>> {
        match self.properties.get(PACKAGE_PROPERTY) {
            Some(PropertyValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `module` property of a module capability.
    pub fn module_name(&self) -> Option<&Arc<str>> {
        match self.properties.get(MODULE_PROPERTY) {
            Some(PropertyValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `version` property, defaulting to `0.0.0` when absent.
    pub fn version(&self) -> Version {
        match self.properties.get(VERSION_PROPERTY) {
            Some(PropertyValue::Version(v)) => v.clone(),
            _ => Version::ZERO,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Package => write!(
                f,
                "package {} {}",
                self.package_name().map(|s| s.as_ref()).unwrap_or("?"),
                self.version()
            ),
            Namespace::Module => write!(
                f,
                "module {} {}",
                self.module_name().map(|s| s.as_ref()).unwrap_or("?"),
                self.version()
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
