//! Release series hints such as `24` or `24.1`

use std::fmt;
use std::str::FromStr;

use crate::version::error::ParseError;
use crate::version::parser::Version;

/// A `MAJOR[.MINOR]` prefix scoping "latest" lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Series {
    pub major: u64,
    pub minor: Option<u64>,
}

impl Series {
    /// Whether `version` belongs to this series
    pub fn contains(&self, version: &Version) -> bool {
        version.major() == self.major && self.minor.is_none_or(|minor| version.minor() == minor)
    }
}

impl FromStr for Series {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().strip_prefix('v').unwrap_or(s.trim());
        let invalid = || ParseError::InvalidSemver {
            input: s.to_string(),
            reason: "expected MAJOR or MAJOR.MINOR".to_string(),
        };

        let mut parts = trimmed.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => Some(p.parse().map_err(|_| invalid())?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { major, minor })
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}
