//! Module resolver and class-space search policy for the Lattice runtime.
//!
//! Modules declare capabilities (exported packages, the module itself) and
//! requirements (filters over capability properties). This crate computes
//! a consistent wiring of requirements to capabilities — so every class
//! visible from any module has exactly one provenance — and then answers
//! class and resource lookups through those wires.
//!
//! # Architecture
//!
//! ```text
//! find_class(module, name)
//!   │
//!   ├── resolve(module)            lazy, under the factory lock
//!   │     ├── populate             candidate sets per requirement
//!   │     ├── search               odometer over configurations,
//!   │     │                        uses-constraint consistency check
//!   │     └── commit               wires + in-use promotion, events after
//!   │
//!   ├── boot delegation            configured prefixes -> host loader
//!   ├── static wires               package wires, then module wires
//!   ├── local content              the module's own ContentLoader
//!   ├── dynamic import             lazily appends a wire, retries
//!   └── diagnostics                case analysis on the final miss
//! ```
//!
//! # Concurrency
//!
//! All registry mutation is serialized by a single mutex (the "factory
//! lock"). Listener lists are copy-on-write snapshots behind their own
//! monitors, and all events fire after the factory lock is released, so
//! listeners may call back into the registry freely.

#![allow(clippy::new_without_default)]

// Core state
pub mod config;
pub mod error;
pub mod module;
pub mod registry;

// Resolution machinery
mod candidates;
mod class_space;
mod resolver;
pub mod source;
pub mod wire;

// Runtime lookup
mod diagnostics;
pub mod policy;

// Re-exports
pub use config::{PolicyConfig, BOOT_DELEGATION_PROP, SYSTEM_PACKAGES_PROP};
pub use error::{ClassNotFound, ResolveError, ResourceNotFound};
pub use module::{
    ContentLoader, HostLoader, LoadedClass, ModuleHandle, ModuleId, PackageAction,
    PackagePermission, ResourceUrl, SecurityContext,
};
pub use policy::{Caller, PackageAttrs, ResolverListener, SearchPolicy};
pub use registry::{ModuleEvent, ModuleListener, ModuleRegistry};
pub use source::{PackageSource, ResolvedPackage};
pub use wire::{Wire, WireKind};
