//! Component version ordering and range predicates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Compares two version strings segment by segment.
///
/// Segments are split on `.`, `-` and `+`. Two numeric segments compare
/// numerically; anything else compares lexically. A version that is a prefix
/// of another sorts first.
///
/// # Examples
///
/// ```
/// use mcp_router::component::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare_versions("2.0", "2.0"), Ordering::Equal);
/// assert_eq!(compare_versions("1", "1.0"), Ordering::Less);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &str| {
        v.split(['.', '-', '+'])
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    let left = split(a);
    let right = split(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

/// Orders optional versions; `None` sorts below every version.
pub fn compare_optional_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_versions(a, b),
    }
}

/// Version predicate used by visibility rules.
///
/// Every bound that is set must hold. A component without a version never
/// matches a spec that has at least one bound.
///
/// # Examples
///
/// ```
/// use mcp_router::component::VersionSpec;
///
/// let spec = VersionSpec::range("1.0", "2.0");
/// assert!(spec.matches(Some("1.5")));
/// assert!(!spec.matches(Some("2.0")));
/// assert!(!spec.matches(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Exact version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<String>,

    /// Inclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<String>,

    /// Exclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<String>,
}

impl VersionSpec {
    /// Matches exactly one version.
    pub fn exact(version: impl Into<String>) -> Self {
        Self {
            eq: Some(version.into()),
            ..Self::default()
        }
    }

    /// Matches `gte <= v < lt`.
    pub fn range(gte: impl Into<String>, lt: impl Into<String>) -> Self {
        Self {
            eq: None,
            gte: Some(gte.into()),
            lt: Some(lt.into()),
        }
    }

    /// Matches versions at or above `gte`.
    pub fn at_least(gte: impl Into<String>) -> Self {
        Self {
            gte: Some(gte.into()),
            ..Self::default()
        }
    }

    /// Matches versions below `lt`.
    pub fn below(lt: impl Into<String>) -> Self {
        Self {
            lt: Some(lt.into()),
            ..Self::default()
        }
    }

    /// Returns `true` when no bound is set.
    pub fn is_empty(&self) -> bool {
        self.eq.is_none() && self.gte.is_none() && self.lt.is_none()
    }

    /// Tests a component version against this spec.
    pub fn matches(&self, version: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(version) = version else {
            return false;
        };

        if let Some(eq) = &self.eq {
            if compare_versions(version, eq) != Ordering::Equal {
                return false;
            }
        }
        if let Some(gte) = &self.gte {
            if compare_versions(version, gte) == Ordering::Less {
                return false;
            }
        }
        if let Some(lt) = &self.lt {
            if compare_versions(version, lt) != Ordering::Less {
                return false;
            }
        }
        true
    }
}
