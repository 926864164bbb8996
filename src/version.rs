//! Versions and upgrade positions.
//!
//! A [`Version`] is a dotted numeric identifier such as `10.5.0`. Versions are
//! compared component-wise; missing trailing components count as zero, so
//! `1.0` and `1.0.0` are the same version.
//!
//! A [`Position`] pins a single upgrade step: the version whose upgrade
//! directory holds the step, plus the step index within that directory.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Result, UpgradeError};

/// Dotted numeric version identifier.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    parts: Vec<u64>,
}

impl Version {
    /// Parse a dotted version string (`1`, `1.0`, `10.5.0`, ...).
    ///
    /// # Errors
    ///
    /// Returns `InvalidVersion` for empty strings, empty components and
    /// non-numeric components.
    pub fn parse(value: &str) -> Result<Self> {
        let raw = value.trim();
        if raw.is_empty() {
            return Err(UpgradeError::invalid_version("empty version string"));
        }

        let parts = raw
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                    return Err(UpgradeError::invalid_version(raw));
                }
                part.parse::<u64>()
                    .map_err(|_| UpgradeError::invalid_version(raw))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// The version string as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric components of the version.
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    fn significant_parts(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|part| *part != 0)
            .map_or(0, |pos| pos + 1);
        &self.parts[..len]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_parts().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let left = self.parts.get(i).copied().unwrap_or(0);
            let right = other.parts.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A single upgrade step location: `(version, index)`.
///
/// Ordered by version first, then index. The derived ordering relies on the
/// field order below.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub version: Version,
    pub index: u32,
}

impl Position {
    pub fn new(version: Version, index: u32) -> Self {
        Self { version, index }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).expect("valid version")
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(v("10.5.0").to_string(), "10.5.0");
        assert_eq!(v(" 1.2 ").as_str(), "1.2");
        assert_eq!(v("1.2.3").parts(), &[1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "1..2", "1.a", ".1", "1.", "-1", "v1.0"] {
            assert!(Version::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("2") > v("1.99.99"));
        assert!(v("10.5.0") < v("10.5.1"));
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0"));

        let mut set = std::collections::HashSet::new();
        set.insert(v("1.0"));
        assert!(set.contains(&v("1.0.0")));
    }

    #[test]
    fn test_position_orders_version_then_index() {
        let a = Position::new(v("1.0"), 9);
        let b = Position::new(v("1.1"), 0);
        let c = Position::new(v("1.1"), 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(c.to_string(), "1.1/1");
    }
}
