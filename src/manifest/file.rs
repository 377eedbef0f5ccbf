//! Manifest persistence

use std::path::Path;

use tracing::info;

use crate::manifest::{Manifest, ManifestError};

/// Read a manifest from a JSON file
pub fn load(path: &Path) -> Result<Manifest, ManifestError> {
    let data = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    from_json(&data, path)
}

pub(crate) fn from_json(data: &str, path: &Path) -> Result<Manifest, ManifestError> {
    serde_json::from_str(data).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a manifest as indented JSON with a trailing newline
pub fn save(manifest: &Manifest, path: &Path) -> Result<(), ManifestError> {
    let mut data = serde_json::to_string_pretty(manifest).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    data.push('\n');

    std::fs::write(path, data).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Add one artifact to a persisted manifest
///
/// Loads `prev_path`, appends the version parsed from `identifier`, removes
/// duplicates, sorts, and writes the result to `output_path`. Assumes a
/// single writer.
pub fn merge_new_version(
    prev_path: &Path,
    output_path: &Path,
    identifier: &str,
) -> Result<Manifest, ManifestError> {
    let mut manifest = load(prev_path)?;
    let before = manifest.versions.len();

    let added = manifest.add_version(identifier)?.canonical();
    manifest.deduplicate();
    manifest.sort();

    save(&manifest, output_path)?;

    if manifest.versions.len() > before {
        info!(
            "Added {} to {:?} ({} versions)",
            added,
            output_path,
            manifest.versions.len()
        );
    } else {
        info!("{} already listed, wrote {:?} unchanged", added, output_path);
    }

    Ok(manifest)
}
