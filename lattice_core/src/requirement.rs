//! Requirements — what a module demands, expressed as a filter.
//!
//! A requirement is satisfied by any capability in the same namespace whose
//! properties match the filter. `optional` requirements tolerate having no
//! provider; `dynamic` requirements are not wired at resolve time but may
//! attach a wire lazily at class-load time.

use std::fmt;
use std::sync::Arc;

use crate::capability::{Capability, Namespace};
use crate::filter::Filter;
use crate::PACKAGE_PROPERTY;

/// A demand for a capability, expressed as a filter over its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    namespace: Namespace,
    filter: Filter,
    optional: bool,
    dynamic: bool,
}

impl Requirement {
    /// A mandatory requirement in `namespace` with the given filter.
    pub fn new(namespace: Namespace, filter: Filter) -> Self {
        Requirement {
            namespace,
            filter,
            optional: false,
            dynamic: false,
        }
    }

    /// Mark the requirement optional; returns self for chaining.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the requirement dynamic; returns self for chaining.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    #[inline]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[inline]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// True when `cap` lives in this requirement's namespace and matches
    /// the filter.
    pub fn is_satisfied_by(&self, cap: &Capability) -> bool {
        self.namespace == cap.namespace() && self.filter.matches(cap.properties())
    }

    /// The package name this requirement targets: the `package` term at
    /// the top level of the filter, searching one level into a
    /// conjunction.
    ///
    /// For dynamic requirements the term may be a wildcard, in which case
    /// the reconstructed pattern is returned: `*` for a bare presence
    /// term, `org.demo.*` for a wildcarded prefix.
    pub fn target_package(&self) -> Option<Arc<str>> {
        fn from(filter: &Filter) -> Option<Arc<str>> {
            match filter {
                Filter::Eq { attr, value } if attr.as_ref() == PACKAGE_PROPERTY => {
                    Some(value.clone())
                }
                Filter::Present { attr } if attr.as_ref() == PACKAGE_PROPERTY => {
                    Some(Arc::from("*"))
                }
                Filter::Substring {
                    attr,
                    parts,
                    anchored_start,
                    anchored_end,
                } if attr.as_ref() == PACKAGE_PROPERTY => {
                    let mut pattern = String::new();
                    if !anchored_start {
                        pattern.push('*');
                    }
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            pattern.push('*');
                        }
                        pattern.push_str(part);
                    }
                    if !anchored_end {
                        pattern.push('*');
                    }
                    Some(Arc::from(pattern.as_str()))
                }
                _ => None,
            }
        }

        match &self.filter {
            Filter::And(ops) => ops.iter().find_map(from),
            other => from(other),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "require {} {}", self.namespace, self.filter)?;
        if self.optional {
            write!(f, " (optional)")?;
        }
        if self.dynamic {
            write!(f, " (dynamic)")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
