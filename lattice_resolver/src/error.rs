//! Error types raised by the resolver and the search policy.
//!
//! `ResolveError` is attached to the (module, requirement) pair that could
//! not be satisfied. Lookup failures wrap the resolve cause where one
//! exists, and class lookups additionally carry the wiring diagnostic
//! produced at failure time.

use std::fmt;
use std::sync::Arc;

use lattice_core::Requirement;

use crate::module::ModuleId;

// =============================================================================
// ResolveError
// =============================================================================

/// Resolution failed for a specific module requirement.
#[derive(Debug, Clone)]
pub struct ResolveError {
    module: Option<ModuleId>,
    requirement: Option<Requirement>,
    reason: Arc<str>,
}

impl ResolveError {
    pub fn new(module: ModuleId, requirement: Requirement, reason: impl Into<Arc<str>>) -> Self {
        ResolveError {
            module: Some(module),
            requirement: Some(requirement),
            reason: reason.into(),
        }
    }

    /// The odometer ran out of candidate configurations.
    pub fn constraint_violation() -> Self {
        ResolveError {
            module: None,
            requirement: None,
            reason: Arc::from("unable to resolve due to constraint violation"),
        }
    }

    /// A failure not attributable to a single requirement.
    pub(crate) fn internal(reason: impl Into<Arc<str>>) -> Self {
        ResolveError {
            module: None,
            requirement: None,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn module(&self) -> Option<&ModuleId> {
        self.module.as_ref()
    }

    /// The requirement that could not be satisfied, when one is known.
    #[inline]
    pub fn requirement(&self) -> Option<&Requirement> {
        self.requirement.as_ref()
    }

    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(module) = &self.module {
            write!(f, " [module {}]", module)?;
        }
        if let Some(req) = &self.requirement {
            write!(f, " [{}]", req)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveError {}

// =============================================================================
// Lookup errors
// =============================================================================

/// A class could not be located for a module.
#[derive(Debug, Clone)]
pub struct ClassNotFound {
    name: Arc<str>,
    diagnostic: Option<String>,
    cause: Option<ResolveError>,
}

impl ClassNotFound {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        ClassNotFound {
            name: name.into(),
            diagnostic: None,
            cause: None,
        }
    }

    /// Lookup failed because the owning module could not be resolved.
    pub fn unresolved(name: impl Into<Arc<str>>, cause: ResolveError) -> Self {
        ClassNotFound {
            name: name.into(),
            diagnostic: None,
            cause: Some(cause),
        }
    }

    /// Lookup exhausted every source; attach the wiring diagnostic.
    pub fn diagnosed(name: impl Into<Arc<str>>, diagnostic: String) -> Self {
        ClassNotFound {
            name: name.into(),
            diagnostic: Some(diagnostic),
            cause: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    #[inline]
    pub fn cause(&self) -> Option<&ResolveError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for ClassNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class not found: {}", self.name)?;
        if let Some(cause) = &self.cause {
            write!(f, ": cannot resolve: {}", cause)?;
        }
        if let Some(diag) = &self.diagnostic {
            write!(f, " ({})", diag)?;
        }
        Ok(())
    }
}

impl std::error::Error for ClassNotFound {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A resource could not be located for a module.
#[derive(Debug, Clone)]
pub struct ResourceNotFound {
    name: Arc<str>,
    cause: Option<ResolveError>,
}

impl ResourceNotFound {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        ResourceNotFound {
            name: name.into(),
            cause: None,
        }
    }

    pub fn unresolved(name: impl Into<Arc<str>>, cause: ResolveError) -> Self {
        ResourceNotFound {
            name: name.into(),
            cause: Some(cause),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn cause(&self) -> Option<&ResolveError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for ResourceNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource not found: {}", self.name)?;
        if let Some(cause) = &self.cause {
            write!(f, ": cannot resolve: {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResourceNotFound {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{Filter, Namespace};

    #[test]
    fn test_resolve_error_display_names_module_and_requirement() {
        let req = Requirement::new(Namespace::Package, Filter::parse("(package=p)").unwrap());
        let err = ResolveError::new(ModuleId::new(4, 0), req, "unable to resolve");
        let text = err.to_string();
        assert!(text.contains("unable to resolve"));
        assert!(text.contains("4.0"));
        assert!(text.contains("(package=p)"));
    }

    #[test]
    fn test_class_not_found_carries_cause() {
        let req = Requirement::new(Namespace::Package, Filter::parse("(package=q)").unwrap());
        let cause = ResolveError::new(ModuleId::new(1, 0), req, "unable to resolve");
        let err = ClassNotFound::unresolved("q.X", cause);
        assert!(err.cause().is_some());
        assert!(err.to_string().contains("q.X"));
    }
}
