//! Version parsing and comparison.
//!
//! Versions are dot-separated sequences of non-negative integers, optionally
//! prefixed with `v` (for example `1.2.3` or `v2.0`). Comparison pads the
//! shorter sequence with zeros, so `1.2` and `1.2.0` compare equal and
//! `1.10.0` sorts after `1.2.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::UpdateError;

/// A parsed application version.
#[derive(Debug, Clone, Eq)]
pub struct Version(Vec<u32>);

impl Version {
    /// The version assumed when no record exists on disk.
    #[must_use]
    pub fn baseline() -> Self {
        Self(vec![1, 0, 0])
    }

    /// The numeric components of this version.
    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Returns `true` if this version is strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self > other
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if stripped.is_empty() {
            return Err(UpdateError::InvalidVersion(s.to_string()));
        }
        let components = stripped
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| UpdateError::InvalidVersion(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(components))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                non_eq => return non_eq,
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

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Returns `true` if `candidate` parses and is strictly newer than `current`.
///
/// A candidate that fails to parse is never considered newer, so a garbled
/// manifest can not trigger an update.
#[must_use]
pub fn is_newer(candidate: &str, current: &Version) -> bool {
    match candidate.parse::<Version>() {
        Ok(parsed) => parsed > *current,
        Err(_) => {
            tracing::warn!(candidate, "ignoring unparseable remote version");
            false
        }
    }
}
