//! Candidate selection — the two provider pools consulted by the resolver.
//!
//! In-use capabilities are commitments already visible to the running
//! system; reusing them keeps class-space source sets small. Unused
//! candidates are everything else. Queries scan under the factory lock,
//! filter through the exporter's security context, and return candidates
//! in best-first order (highest version, then lowest bundle id).

use tracing::debug;

use lattice_core::{Namespace, Requirement};

use crate::module::PackagePermission;
use crate::registry::RegistryInner;
use crate::source::PackageSource;

/// Candidates whose capability is already bound by a live wire (or
/// promoted as export-only). Capabilities whose exporter's security
/// context denies the package export are dropped and logged.
pub(crate) fn in_use_candidates(inner: &RegistryInner, req: &Requirement) -> Vec<PackageSource> {
    let mut candidates = Vec::new();

    for entry in inner.entries() {
        for cap in inner.in_use_for(entry.handle) {
            if !req.is_satisfied_by(cap) {
                continue;
            }
            if cap.namespace() == Namespace::Package {
                if let (Some(security), Some(pkg)) = (&entry.security, cap.package_name()) {
                    if !security.implies(&PackagePermission::export(pkg.clone())) {
                        debug!(
                            module = %entry.id,
                            package = %pkg,
                            "export permission denied; skipping in-use candidate"
                        );
                        continue;
                    }
                }
            }
            if let Some(source) = inner.source_for(entry.handle, cap) {
                candidates.push(source);
            }
        }
    }

    candidates.sort();
    candidates
}

/// Candidates not yet bound by any wire: each module's first satisfying
/// capability, skipped when that capability is already in use.
pub(crate) fn unused_candidates(inner: &RegistryInner, req: &Requirement) -> Vec<PackageSource> {
    let mut candidates = Vec::new();

    for entry in inner.entries() {
        if let Some((idx, cap)) = entry.definition.satisfying_capability(req) {
            if !inner.is_capability_in_use(entry.handle, cap) {
                candidates.push(PackageSource::new(
                    entry.handle,
                    idx as u32,
                    cap.clone(),
                    entry.id.bundle(),
                ));
            }
        }
    }

    candidates.sort();
    candidates
}

// =============================================================================
// Tests
// =============================================================================
