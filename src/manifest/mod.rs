//! The release catalog
//!
//! A [`Manifest`] is a named list of known versions plus opaque metadata. It
//! is mutated offline in a single batch (see [`file::merge_new_version`]) and
//! persisted as JSON.
//!
//! Persisted entries only hold `{version, build_number, filename}`. On load
//! every entry is re-derived by parsing its filename with the same parser used
//! for new artifacts, so there is one interpretation of a name.

pub mod file;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::version::{ParseError, Series, Version, compare, parse};

pub use file::{load, merge_new_version, save};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to access manifest {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path:?}: {source}")]
    Json {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Passed through verbatim, in file order
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Parse `identifier` and append it; no de-duplication or sorting
    pub fn add_version(&mut self, identifier: &str) -> Result<&Version, ParseError> {
        let version = parse(identifier)?;
        debug!("Adding {} from {:?}", version, identifier);
        self.versions.push(version);
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Drop repeated entries, keeping the first occurrence of each
    pub fn deduplicate(&mut self) {
        let before = self.versions.len();
        let mut seen = HashSet::new();
        self.versions.retain(|v| seen.insert(v.dedup_key()));

        let dropped = before - self.versions.len();
        if dropped > 0 {
            debug!("Dropped {} duplicate versions", dropped);
        }
    }

    /// Stable ascending sort
    pub fn sort(&mut self) {
        self.versions.sort_by(compare);
    }

    /// Sort the catalog and return its maximum
    pub fn latest(&mut self) -> Option<&Version> {
        if self.versions.is_empty() {
            return None;
        }
        self.sort();
        self.versions.last()
    }

    /// Maximum within a series, leaving the catalog order untouched
    pub fn latest_in(&self, series: Option<Series>) -> Option<&Version> {
        crate::version::semver::find_latest(
            self.versions
                .iter()
                .filter(|v| series.is_none_or(|s| s.contains(v))),
        )
    }

    /// Find the catalog entry equal to `version`, with its original source
    pub fn find(&self, version: &Version) -> Option<&Version> {
        self.versions.iter().find(|v| *v == version)
    }
}

/// Persisted shape of one catalog entry
#[derive(Debug, Serialize, Deserialize)]
struct VersionRecord {
    version: String,
    #[serde(default)]
    build_number: u64,
    #[serde(default, rename = "filename")]
    file_name: String,
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        VersionRecord {
            version: self.semver_string(),
            build_number: self.build_number(),
            file_name: self.source().to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = VersionRecord::deserialize(deserializer)?;
        let identifier = if record.file_name.is_empty() {
            &record.version
        } else {
            &record.file_name
        };
        let version = parse(identifier).map_err(serde::de::Error::custom)?;

        if version.semver_string() != record.version || version.build_number() != record.build_number
        {
            warn!(
                "Stored entry {}+{} disagrees with {:?}, using {}",
                record.version,
                record.build_number,
                identifier,
                version.semver_string()
            );
        }

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn manifest_of(identifiers: &[&str]) -> Manifest {
        let mut manifest = Manifest::new("Sample Manifest", "This is a sample manifest");
        for identifier in identifiers {
            manifest.add_version(identifier).unwrap();
        }
        manifest
    }

    fn entries(manifest: &Manifest) -> Vec<(String, u64)> {
        manifest
            .versions
            .iter()
            .map(|v| (v.semver().to_string(), v.build_number()))
            .collect()
    }

    #[test]
    fn add_version_appends_parsed_entry() {
        let mut manifest = manifest_of(&["/path/to/1.0.0+1.tar.gz", "/path/to/molt-v1.0.1-beta+2"]);

        let added = manifest.add_version("/path/to/1.0.3-ui+100.tar.gz").unwrap();

        assert_eq!(added.semver_string(), "1.0.3-ui+100");
        assert_eq!(added.build_number(), 100);
        assert_eq!(manifest.versions.len(), 3);
        assert_eq!(manifest.versions[2].source(), "/path/to/1.0.3-ui+100.tar.gz");
    }

    #[test]
    fn add_version_rejects_invalid_identifier_without_mutating() {
        let mut manifest = manifest_of(&["1.0.0+1"]);

        let result = manifest.add_version("test.json");

        assert_eq!(
            result.unwrap_err(),
            ParseError::NoVersionFound("test.json".to_string())
        );
        assert_eq!(manifest.versions.len(), 1);
    }

    #[rstest]
    #[case(&[], &[])]
    #[case(&["1.0.0+1", "1.0.1+2"], &[("1.0.0", 1), ("1.0.1", 2)])]
    #[case(
        &["1.0.0+1", "1.0.1+2", "1.0.1+2", "1.0.0+1"],
        &[("1.0.0", 1), ("1.0.1", 2)]
    )]
    #[case(
        &["1.0.1+2", "1.0.0+1", "/other/path/1.0.1+2.tar.gz"],
        &[("1.0.1", 2), ("1.0.0", 1)]
    )]
    #[case(&["1.0.0+1", "1.0.0+2", "1.0.0"], &[("1.0.0", 1), ("1.0.0", 2), ("1.0.0", 0)])]
    fn deduplicate_keeps_first_occurrence(
        #[case] identifiers: &[&str],
        #[case] expected: &[(&str, u64)],
    ) {
        let mut manifest = manifest_of(identifiers);

        manifest.deduplicate();

        let expected: Vec<(String, u64)> =
            expected.iter().map(|(v, b)| (v.to_string(), *b)).collect();
        assert_eq!(entries(&manifest), expected);
    }

    #[test]
    fn deduplicate_keeps_source_of_first_occurrence() {
        let mut manifest = manifest_of(&["/a/1.0.0.tar.gz", "/b/1.0.0.tar.gz"]);

        manifest.deduplicate();

        assert_eq!(manifest.versions.len(), 1);
        assert_eq!(manifest.versions[0].source(), "/a/1.0.0.tar.gz");
    }

    #[test]
    fn deduplicate_is_idempotent() {
        let mut manifest = manifest_of(&["2.0.0", "1.0.0+1", "2.0.0", "1.0.0+1", "1.0.0+2"]);

        manifest.deduplicate();
        let once = manifest.clone();
        manifest.deduplicate();

        assert_eq!(manifest, once);
    }

    #[test]
    fn sort_orders_ascending() {
        let mut manifest = manifest_of(&["2.0.0", "2.0.0-ui+2", "1.0.0", "2.0.0-ui+1", "1.10.0"]);

        manifest.sort();

        let sorted: Vec<String> = manifest.versions.iter().map(|v| v.canonical()).collect();
        assert_eq!(
            sorted,
            vec!["1.0.0", "1.10.0", "2.0.0-ui+ui.1", "2.0.0-ui+ui.2", "2.0.0"]
        );
    }

    #[test]
    fn sort_is_stable_for_equal_entries() {
        let mut manifest = manifest_of(&["/b/1.0.0.tar.gz", "0.1.0", "/a/1.0.0.tar.gz"]);

        manifest.sort();

        let sources: Vec<&str> = manifest.versions.iter().map(|v| v.source()).collect();
        assert_eq!(sources, vec!["0.1.0", "/b/1.0.0.tar.gz", "/a/1.0.0.tar.gz"]);
    }

    #[test]
    fn latest_on_empty_catalog_is_none() {
        let mut manifest = Manifest::default();

        assert!(manifest.latest().is_none());
    }

    #[test]
    fn latest_prefers_final_release_over_same_core_prereleases() {
        let mut manifest = manifest_of(&["1.0.0", "2.0.0", "2.0.0-ui+1", "2.0.0-ui+2"]);

        let latest = manifest.latest().unwrap();

        assert_eq!(latest.semver_string(), "2.0.0");
        assert_eq!(latest.build_number(), 0);
    }

    #[test]
    fn latest_prefers_newest_build_among_prereleases() {
        let mut manifest = manifest_of(&["2.0.0-ui+2", "1.0.0", "2.0.0-ui+7", "2.0.0-ui+3"]);

        let latest = manifest.latest().unwrap();

        assert_eq!(latest.canonical(), "2.0.0-ui+ui.7");
    }

    #[test]
    fn latest_sorts_the_catalog() {
        let mut manifest = manifest_of(&["3.0.0", "1.0.0", "2.0.0"]);

        manifest.latest();

        assert_eq!(
            entries(&manifest),
            vec![
                ("1.0.0".to_string(), 0),
                ("2.0.0".to_string(), 0),
                ("3.0.0".to_string(), 0)
            ]
        );
    }

    #[test]
    fn latest_in_filters_by_series_without_reordering() {
        let manifest = manifest_of(&["24.2.0", "24.1.5", "24.1.9-beta+3", "23.9.9"]);

        let latest = manifest.latest_in(Some("24.1".parse().unwrap())).unwrap();

        assert_eq!(latest.canonical(), "24.1.9-beta+ui.3");
        assert_eq!(manifest.versions[0].canonical(), "24.2.0");
        assert_eq!(
            manifest.latest_in(None).map(Version::canonical),
            Some("24.2.0".to_string())
        );
        assert!(manifest.latest_in(Some("25".parse().unwrap())).is_none());
    }

    #[test]
    fn version_serializes_as_record() {
        let version = parse("/path/to/molt-v1.0.1-beta+2").unwrap();

        assert_eq!(
            serde_json::to_value(&version).unwrap(),
            json!({
                "version": "1.0.1-beta+2",
                "build_number": 2,
                "filename": "/path/to/molt-v1.0.1-beta+2"
            })
        );
    }

    #[test]
    fn version_deserializes_from_filename() {
        let version: Version = serde_json::from_value(json!({
            "version": "1.0.3-ui+100",
            "build_number": 100,
            "filename": "/path/to/1.0.3-ui+100.tar.gz"
        }))
        .unwrap();

        assert_eq!(version.semver_string(), "1.0.3-ui+100");
        assert_eq!(version.build_number(), 100);
        assert_eq!(version.source(), "/path/to/1.0.3-ui+100.tar.gz");
    }

    #[test]
    fn version_deserialization_prefers_filename_over_stored_fields() {
        let version: Version = serde_json::from_value(json!({
            "version": "9.9.9",
            "build_number": 1,
            "filename": "1.0.0+5.tar.gz"
        }))
        .unwrap();

        assert_eq!(version.semver_string(), "1.0.0+5");
    }

    #[test]
    fn version_deserialization_falls_back_to_version_field() {
        let version: Version = serde_json::from_value(json!({
            "version": "1.2.3+4",
            "build_number": 4
        }))
        .unwrap();

        assert_eq!(version.canonical(), "1.2.3+ui.4");
    }

    #[test]
    fn version_deserialization_rejects_unparseable_filename() {
        let result = serde_json::from_value::<Version>(json!({
            "version": "1.0.0",
            "build_number": 0,
            "filename": "https://server.com/best/24.1.5-beta+new.tar.gz"
        }));

        assert!(result.is_err());
    }
}
