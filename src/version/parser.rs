//! Extraction of release versions from artifact identifiers
//!
//! An identifier can be a bare version (`v24.1.5`), a file name
//! (`ui_v24.3.1.tar.zst`), a relative path or a full URL. Only the final path
//! segment is inspected, and the first version-shaped run of characters wins.
//!
//! Build metadata is repurposed as a numeric build identifier. Both `+100`
//! and the `+ui.100` spelling used in request URLs are accepted.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use semver::BuildMetadata;
use tracing::debug;

use crate::version::error::ParseError;

/// `[v]MAJOR[.MINOR][.PATCH][-PRERELEASE][+BUILDMETA]`
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"v?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?",
    )
    .unwrap()
});

/// Archive extensions that the pattern above can swallow into a prerelease
/// or build-metadata run (`24.1.5-beta+100.tar.gz`).
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tar.zst", ".tgz", ".tar"];

/// Prefix of the build-number form used in canonical strings
const BUILD_PREFIX: &str = "ui.";

/// One release artifact
///
/// Identity is the semver core plus prerelease plus build number. The source
/// identifier is carried along but takes no part in equality or ordering.
#[derive(Debug, Clone)]
pub struct Version {
    /// Core and prerelease; build metadata is always empty here
    semver: semver::Version,
    build_number: u64,
    source: String,
}

impl Version {
    pub fn major(&self) -> u64 {
        self.semver.major
    }

    pub fn minor(&self) -> u64 {
        self.semver.minor
    }

    pub fn patch(&self) -> u64 {
        self.semver.patch
    }

    /// Prerelease tag, empty for a final release
    pub fn prerelease(&self) -> &str {
        self.semver.pre.as_str()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.semver.pre.is_empty()
    }

    pub fn build_number(&self) -> u64 {
        self.build_number
    }

    /// The identifier this version was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Semver core and prerelease, without build metadata
    pub fn semver(&self) -> &semver::Version {
        &self.semver
    }

    /// `MAJOR.MINOR.PATCH[-PRERELEASE][+ui.BUILD]`
    ///
    /// Names cache directories and appears in request URLs.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`, the standard semver spelling
    pub fn semver_string(&self) -> String {
        if self.build_number == 0 {
            self.semver.to_string()
        } else {
            format!("{}+{}", self.semver, self.build_number)
        }
    }

    /// Key used for catalog de-duplication
    pub(crate) fn dedup_key(&self) -> (String, u64) {
        (self.semver.to_string(), self.build_number)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.build_number == 0 {
            write!(f, "{}", self.semver)
        } else {
            write!(f, "{}+{}{}", self.semver, BUILD_PREFIX, self.build_number)
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.semver == other.semver && self.build_number == other.build_number
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.semver.hash(state);
        self.build_number.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        crate::version::semver::compare(self, other)
    }
}

impl std::str::FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse an artifact identifier into a [`Version`]
pub fn parse(identifier: &str) -> Result<Version, ParseError> {
    let file_name = final_segment(identifier);

    let matched = VERSION_PATTERN
        .find(file_name)
        .map(|m| m.as_str())
        .ok_or_else(|| ParseError::NoVersionFound(identifier.to_string()))?;

    let cleaned = strip_archive_suffix(matched);
    let (semver, metadata) = parse_semver(cleaned)?;
    let build_number = match metadata {
        Some(metadata) => parse_build_number(&metadata)?,
        None => 0,
    };

    debug!(
        "Parsed {:?} as {} (build {})",
        identifier, semver, build_number
    );

    Ok(Version {
        semver,
        build_number,
        source: identifier.to_string(),
    })
}

/// Check that an identifier carries a well-formed version
pub fn validate(identifier: &str) -> Result<(), ParseError> {
    parse(identifier).map(|_| ())
}

/// Whether a file name ends in one of the archive extensions
pub fn is_archive_name(name: &str) -> bool {
    ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn final_segment(identifier: &str) -> &str {
    identifier.rsplit('/').next().unwrap_or(identifier)
}

fn strip_archive_suffix(matched: &str) -> &str {
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| matched.strip_suffix(suffix))
        .unwrap_or(matched)
}

/// Parse a cleaned version string, padding a partial core with zeros
///
/// Returns the version with its build metadata removed, and that metadata.
fn parse_semver(cleaned: &str) -> Result<(semver::Version, Option<String>), ParseError> {
    let invalid = |reason: String| ParseError::InvalidSemver {
        input: cleaned.to_string(),
        reason,
    };

    let captures = VERSION_PATTERN
        .captures(cleaned)
        .filter(|c| c.get(0).is_some_and(|m| m.len() == cleaned.len()))
        .ok_or_else(|| invalid("unexpected characters".to_string()))?;

    let field = |index: usize| captures.get(index).map_or("0", |m| m.as_str());
    let mut normalized = format!("{}.{}.{}", field(1), field(2), field(3));
    if let Some(pre) = captures.get(4) {
        normalized.push('-');
        normalized.push_str(pre.as_str());
    }
    if let Some(build) = captures.get(5) {
        normalized.push('+');
        normalized.push_str(build.as_str());
    }

    let mut version = semver::Version::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    let metadata = (!version.build.is_empty()).then(|| version.build.to_string());
    version.build = BuildMetadata::EMPTY;

    Ok((version, metadata))
}

fn parse_build_number(metadata: &str) -> Result<u64, ParseError> {
    let digits = metadata.strip_prefix(BUILD_PREFIX).unwrap_or(metadata);
    digits
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidBuildNumber(metadata.to_string()))
}
