use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::version::Series;

// =============================================================================
// Server constants
// =============================================================================

/// Address the gateway binds when none is configured
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Timeout for starting an archive download in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Document served for a version root or a directory
pub const ROOT_DOCUMENT: &str = "index.html";

/// Version segment that resolves to the newest published version
pub const LATEST: &str = "latest";

/// Catalog file published next to the archives in a bucket
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Gateway configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub listen: String,
    /// Root of the unpacked versions; defaults to `<data dir>/cache`
    pub cache_dir: Option<PathBuf>,
    /// Series `latest` is restricted to, e.g. `"24.1"`
    pub series: Option<String>,
    /// Download start timeout in milliseconds
    pub fetch_timeout_ms: u64,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            cache_dir: None,
            series: None,
            fetch_timeout_ms: FETCH_TIMEOUT_MS,
            store: StoreConfig::default(),
        }
    }
}

/// Where archives come from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StoreConfig {
    #[serde(rename_all = "camelCase")]
    Http { base_url: String },
    Directory { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Directory {
            path: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    /// Read configuration from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(cache_dir)
    }

    pub fn series(&self) -> Result<Option<Series>, crate::version::ParseError> {
        self.series.as_deref().map(str::parse).transpose()
    }
}

/// Returns the path to the data directory for hermitcrab.
/// Uses $XDG_DATA_HOME/hermitcrab if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/hermitcrab,
/// or ./hermitcrab if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the default root of the version cache.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("hermitcrab.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("hermitcrab")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<ServerConfig>(json!({
            "series": "24.1"
        }))
        .unwrap();

        assert_eq!(result.series.as_deref(), Some("24.1"));
        assert_eq!(result.listen, DEFAULT_LISTEN_ADDR);
        assert_eq!(result.fetch_timeout_ms, FETCH_TIMEOUT_MS);
        assert_eq!(result.store, StoreConfig::default());
    }

    #[test]
    fn server_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<ServerConfig>(json!({
            "listen": "0.0.0.0:9000",
            "cacheDir": "/var/cache/hermitcrab",
            "series": "24",
            "fetchTimeoutMs": 5000,
            "store": {
                "kind": "http",
                "baseUrl": "https://builds.example.com/ui"
            }
        }))
        .unwrap();

        assert_eq!(
            result,
            ServerConfig {
                listen: "0.0.0.0:9000".to_string(),
                cache_dir: Some(PathBuf::from("/var/cache/hermitcrab")),
                series: Some("24".to_string()),
                fetch_timeout_ms: 5000,
                store: StoreConfig::Http {
                    base_url: "https://builds.example.com/ui".to_string()
                },
            }
        );
    }

    #[test]
    fn directory_store_parses() {
        let result = serde_json::from_value::<StoreConfig>(json!({
            "kind": "directory",
            "path": "/srv/archives"
        }))
        .unwrap();

        assert_eq!(
            result,
            StoreConfig::Directory {
                path: PathBuf::from("/srv/archives")
            }
        );
    }

    #[test]
    fn series_is_parsed_on_demand() {
        let config = ServerConfig {
            series: Some("24.1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.series().unwrap(),
            Some(Series {
                major: 24,
                minor: Some(1)
            })
        );

        let config = ServerConfig {
            series: Some("next".to_string()),
            ..Default::default()
        };
        assert!(config.series().is_err());
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hermitcrab.json");
        std::fs::write(&path, r#"{ "listen": "127.0.0.1:1234" }"#).unwrap();

        let config = ServerConfig::load(&path).unwrap();

        assert_eq!(config.listen, "127.0.0.1:1234");
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let config = ServerConfig {
            cache_dir: Some(PathBuf::from("/tmp/versions")),
            ..Default::default()
        };

        assert_eq!(config.cache_root(), PathBuf::from("/tmp/versions"));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/hermitcrab"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/hermitcrab"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./hermitcrab"));
    }
}
