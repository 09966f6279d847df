//! Value model for the Lattice module resolver.
//!
//! This crate defines the immutable vocabulary the resolver speaks:
//!
//! - **Versions**: `major.minor.micro[.qualifier]` with a total order
//! - **Filters**: LDAP-style boolean expressions over typed properties
//! - **Capabilities**: what a module offers (an exported package, the
//!   module itself as a requirable unit)
//! - **Requirements**: what a module demands, expressed as a filter
//! - **Definitions**: the frozen capability/requirement sets of one module
//!   revision, plus native-library descriptors
//!
//! Everything here is a plain value: no locks, no registries, no I/O. The
//! live machinery (module registry, resolver, search policy) lives in
//! `lattice_resolver` and treats these types as read-only once constructed.

pub mod capability;
pub mod definition;
pub mod filter;
pub mod requirement;
pub mod version;

pub use capability::{Capability, Namespace, PropertyValue};
pub use definition::{ModuleDefinition, NativeLibrary};
pub use filter::{Filter, FilterError};
pub use requirement::Requirement;
pub use version::Version;

/// Property key for the package name of a `package` capability.
pub const PACKAGE_PROPERTY: &str = "package";

/// Property key for the symbolic name of a `module` capability.
pub const MODULE_PROPERTY: &str = "module";

/// Property key for the version of either capability namespace.
pub const VERSION_PROPERTY: &str = "version";
