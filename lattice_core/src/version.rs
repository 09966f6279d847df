//! Version triples with a total order.
//!
//! A version is `major.minor.micro` with an optional trailing qualifier
//! (`1.2.0.beta3`). Missing numeric segments default to zero, so `"1"`,
//! `"1.0"` and `"1.0.0"` are the same version. Ordering is numeric on the
//! triple, then lexical on the qualifier, with "no qualifier" sorting
//! before any qualifier.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A `major.minor.micro[.qualifier]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: Option<Arc<str>>,
}

impl Version {
    /// The zero version, `0.0.0`.
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: None,
    };

    /// Create a version from its numeric triple.
    #[inline]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: None,
        }
    }

    /// Create a version with a qualifier.
    pub fn with_qualifier(major: u32, minor: u32, micro: u32, qualifier: impl Into<Arc<str>>) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: Some(qualifier.into()),
        }
    }

    /// Parse a version string.
    ///
    /// Returns `None` for empty input, non-numeric segments, or more than
    /// four dot-separated segments.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }

        let mut parts = text.splitn(4, '.');
        let major = parts.next()?.parse::<u32>().ok()?;
        let minor = match parts.next() {
            Some(s) => s.parse::<u32>().ok()?,
            None => 0,
        };
        let micro = match parts.next() {
            Some(s) => s.parse::<u32>().ok()?,
            None => 0,
        };
        let qualifier = match parts.next() {
            Some("") => return None,
            Some(s) => Some(Arc::from(s)),
            None => None,
        };

        Some(Version {
            major,
            minor,
            micro,
            qualifier,
        })
    }

    #[inline]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[inline]
    pub fn minor(&self) -> u32 {
        self.minor
    }

    #[inline]
    pub fn micro(&self) -> u32 {
        self.micro
    }

    /// The qualifier, if any.
    #[inline]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(q) = &self.qualifier {
            write!(f, ".{}", q)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).ok_or(())
    }
}

// =============================================================================
// Tests
// =============================================================================
