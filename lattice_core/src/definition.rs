//! Module definitions — the frozen declaration of one module revision.
//!
//! A definition is produced by the host's manifest layer and never changes
//! afterwards; the resolver shares it via `Arc`. It carries the module's
//! capabilities, its static and dynamic requirements, and descriptors for
//! any native libraries bundled with the module content.

use std::sync::Arc;

use crate::capability::Capability;
use crate::requirement::Requirement;

/// The immutable capability/requirement sets of one module revision.
#[derive(Debug, Clone, Default)]
pub struct ModuleDefinition {
    capabilities: Vec<Arc<Capability>>,
    requirements: Vec<Requirement>,
    dynamic_requirements: Vec<Requirement>,
    libraries: Vec<NativeLibrary>,
}

impl ModuleDefinition {
    pub fn new(
        capabilities: Vec<Capability>,
        requirements: Vec<Requirement>,
        dynamic_requirements: Vec<Requirement>,
        libraries: Vec<NativeLibrary>,
    ) -> Self {
        ModuleDefinition {
            capabilities: capabilities.into_iter().map(Arc::new).collect(),
            requirements,
            dynamic_requirements: dynamic_requirements
                .into_iter()
                .map(|r| r.dynamic())
                .collect(),
            libraries,
        }
    }

    #[inline]
    pub fn capabilities(&self) -> &[Arc<Capability>] {
        &self.capabilities
    }

    #[inline]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Dynamic-requirement patterns, consulted only at class-load time.
    #[inline]
    pub fn dynamic_requirements(&self) -> &[Requirement] {
        &self.dynamic_requirements
    }

    #[inline]
    pub fn libraries(&self) -> &[NativeLibrary] {
        &self.libraries
    }

    /// The first capability satisfying `req`, with its index.
    pub fn satisfying_capability(&self, req: &Requirement) -> Option<(usize, &Arc<Capability>)> {
        self.capabilities
            .iter()
            .enumerate()
            .find(|(_, cap)| req.is_satisfied_by(cap))
    }
}

// =============================================================================
// Native libraries
// =============================================================================

/// A native library bundled with module content.
///
/// `name` is the library's logical name (what the code asks for); `path`
/// is its location inside the module content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeLibrary {
    name: Arc<str>,
    path: Arc<str>,
}

impl NativeLibrary {
    pub fn new(name: impl Into<Arc<str>>, path: impl Into<Arc<str>>) -> Self {
        NativeLibrary {
            name: name.into(),
            path: path.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared path, if this descriptor covers `name`.
    ///
    /// Matches the logical name exactly, or the platform-decorated forms
    /// `lib<name>.so` / `<name>.dll` / `lib<name>.dylib`.
    pub fn path_for(&self, name: &str) -> Option<&str> {
        let stem = name
            .strip_prefix("lib")
            .unwrap_or(name)
            .trim_end_matches(".so")
            .trim_end_matches(".dll")
            .trim_end_matches(".dylib");
        if stem == self.name.as_ref() || name == self.name.as_ref() {
            Some(&self.path)
        } else {
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Namespace;
    use crate::filter::Filter;
    use crate::version::Version;

    #[test]
    fn test_satisfying_capability_returns_first_match() {
        let def = ModuleDefinition::new(
            vec![
                Capability::package("a", Version::new(1, 0, 0)),
                Capability::package("p", Version::new(1, 0, 0)),
                Capability::package("p", Version::new(2, 0, 0)),
            ],
            vec![],
            vec![],
            vec![],
        );
        let req = Requirement::new(Namespace::Package, Filter::parse("(package=p)").unwrap());
        let (idx, cap) = def.satisfying_capability(&req).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(cap.version(), Version::new(1, 0, 0));
    }

    #[test]
    fn test_dynamic_requirements_are_flagged() {
        let dynamic = Requirement::new(
            Namespace::Package,
            Filter::parse("(package=org.demo.*)").unwrap(),
        );
        let def = ModuleDefinition::new(vec![], vec![], vec![dynamic], vec![]);
        assert!(def.dynamic_requirements()[0].is_dynamic());
    }

    #[test]
    fn test_library_name_forms() {
        let lib = NativeLibrary::new("crypto", "native/crypto.so");
        assert_eq!(lib.path_for("crypto"), Some("native/crypto.so"));
        assert_eq!(lib.path_for("libcrypto.so"), Some("native/crypto.so"));
        assert_eq!(lib.path_for("crypto.dll"), Some("native/crypto.so"));
        assert_eq!(lib.path_for("zlib"), None);
    }
}
