//! Search-policy configuration, resolved once at construction.
//!
//! Mirrors the host's framework properties: `framework.bootdelegation` is
//! a comma/space separated list of package patterns that bypass the
//! modular search entirely and go to the host loader; `java.*` is always
//! appended. `framework.systempackages` is informational only — it is
//! echoed by lookup diagnostics, never interpreted.

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Property key for the boot-delegation pattern list.
pub const BOOT_DELEGATION_PROP: &str = "framework.bootdelegation";

/// Property key for the host's system-package list (informational).
pub const SYSTEM_PACKAGES_PROP: &str = "framework.systempackages";

/// Immutable policy configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    boot_patterns: Vec<BootPattern>,
    system_packages: Option<Arc<str>>,
}

impl PolicyConfig {
    /// Resolve configuration from the host's property map.
    pub fn from_properties(props: &FxHashMap<String, String>) -> Self {
        let mut boot_patterns = Vec::new();
        if let Some(list) = props.get(BOOT_DELEGATION_PROP) {
            for token in list.split([',', ' ']).filter(|t| !t.is_empty()) {
                boot_patterns.push(BootPattern::parse(token));
            }
        }
        // The java.* namespace always belongs to the host.
        boot_patterns.push(BootPattern::parse("java.*"));

        PolicyConfig {
            boot_patterns,
            system_packages: props.get(SYSTEM_PACKAGES_PROP).map(|s| Arc::from(s.as_str())),
        }
    }

    /// True when `pkg` is boot-delegated. The default package never is;
    /// callers guard on emptiness before consulting the patterns.
    pub fn boot_delegates(&self, pkg: &str) -> bool {
        self.boot_patterns.iter().any(|p| p.matches(pkg))
    }

    #[inline]
    pub fn system_packages(&self) -> Option<&str> {
        self.system_packages.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn boot_pattern_count(&self) -> usize {
        self.boot_patterns.len()
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::from_properties(&FxHashMap::default())
    }
}

// =============================================================================
// Boot patterns
// =============================================================================

/// One boot-delegation pattern: an exact package name, or a wildcarded
/// prefix (trailing `*`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct BootPattern {
    prefix: Arc<str>,
    wildcard: bool,
}

impl BootPattern {
    fn parse(token: &str) -> Self {
        match token.strip_suffix('*') {
            Some(prefix) => BootPattern {
                prefix: Arc::from(prefix),
                wildcard: true,
            },
            None => BootPattern {
                prefix: Arc::from(token),
                wildcard: false,
            },
        }
    }

    /// A wildcard pattern `p.*` matches `p` itself and anything under
    /// `p.`; a plain pattern matches only exactly.
    fn matches(&self, pkg: &str) -> bool {
        if self.wildcard {
            pkg == self.prefix.trim_end_matches('.') || pkg.starts_with(self.prefix.as_ref())
        } else {
            pkg == self.prefix.as_ref()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
