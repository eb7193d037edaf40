//! Persistent configuration for studsync.
//!
//! A single TOML file (default `~/.config/studsync/config.toml`) holds the
//! connection settings, the selected courses, the sync watermark
//! (`last_check`) and the name map — the id → title overrides that keep
//! local paths stable when the remote renames nodes.
//!
//! The name map and the watermark are the only state that survives a pass;
//! both are written back synchronously so an interrupted run never loses
//! a frozen name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("a default config was written to {0}; edit it (username, base_address) and run again")]
    Created(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// The on-disk settings. Unknown fields are preserved-by-ignoring; missing
/// fields fall back to defaults so old config files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Stud.IP account name.
    pub username: String,
    /// Root of the Rest.IP API, including the plugin prefix.
    pub base_address: String,
    /// Local directory the course tree is mirrored under. `~` is expanded.
    pub base_path: String,
    /// Seconds between passes when running continuously.
    pub interval: u64,
    /// Overwrite local files when the remote copy changed since last_check.
    pub overwrite: bool,
    /// Strip characters that are illegal on Windows/portable filesystems,
    /// not just on the local one.
    pub portable_names: bool,
    /// Read the password from the OS keyring instead of this file.
    pub use_keyring: bool,
    /// Fallback password, only honored when `use_keyring` is off.
    pub password: Option<String>,
    /// Watermark: epoch seconds of the last completed pass.
    pub last_check: i64,
    /// Courses to mirror, by id or by (frozen) title.
    pub selected_courses: Vec<String>,
    /// Node id → frozen local title.
    pub namemap: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: String::new(),
            base_address: "https://studip.uos.de/plugins.php/restipplugin/api".into(),
            base_path: "~/studip".into(),
            interval: 1200,
            overwrite: false,
            portable_names: true,
            use_keyring: true,
            password: None,
            last_check: 0,
            selected_courses: Vec::new(),
            namemap: BTreeMap::new(),
        }
    }
}

/// Settings plus the path they were loaded from.
#[derive(Debug)]
pub struct Config {
    path: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// `~/.config/studsync/config.toml` (platform equivalent).
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("studsync").join("config.toml"))
    }

    /// Load a config file. If it does not exist yet, a default file is
    /// written and [`ConfigError::Created`] asks the user to fill it in.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self {
                path: path.to_path_buf(),
                settings: Settings::default(),
            };
            config.save()?;
            return Err(ConfigError::Created(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            settings,
        })
    }

    /// Write the settings back to their file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let raw = toml::to_string_pretty(&self.settings)?;
        fs::write(&self.path, raw).map_err(|e| ConfigError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Look up a frozen title for a node id.
    pub fn namemap_lookup(&self, node_id: &str) -> Option<&str> {
        self.settings.namemap.get(node_id).map(String::as_str)
    }

    /// Freeze a title for a node id. Persists synchronously so the name
    /// survives an interrupted pass.
    pub fn namemap_set(&mut self, node_id: &str, title: &str) -> Result<(), ConfigError> {
        self.settings
            .namemap
            .insert(node_id.to_string(), title.to_string());
        self.save()
    }

    /// Whether a course was selected, matching either its id or its
    /// resolved title.
    pub fn is_selected(&self, course_id: &str, title: &str) -> bool {
        self.settings
            .selected_courses
            .iter()
            .any(|entry| entry == course_id || entry == title)
    }

    /// Advance the watermark to `now`, monotonically, and persist it.
    pub fn advance_watermark(&mut self, now: i64) -> Result<(), ConfigError> {
        self.settings.last_check = self.settings.last_check.max(now);
        self.save()
    }

    /// `base_path` with a leading `~` expanded to the home directory.
    pub fn base_path(&self) -> PathBuf {
        expand_tilde(&self.settings.base_path)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let config = Config {
            path,
            settings: Settings::default(),
        };
        (tmp, config)
    }

    #[test]
    fn test_missing_file_creates_default_and_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Created(_)));
        assert!(path.exists());

        // Second load succeeds with defaults.
        let config = Config::load(&path).unwrap();
        assert_eq!(config.settings.interval, 1200);
        assert!(config.settings.use_keyring);
    }

    #[test]
    fn test_roundtrip_preserves_namemap_and_watermark() {
        let (_tmp, mut config) = temp_config();
        config.namemap_set("c1", "Algorithms WS 23/24").unwrap();
        config.advance_watermark(1700000000).unwrap();

        let loaded = Config::load(&config.path).unwrap();
        assert_eq!(loaded.namemap_lookup("c1"), Some("Algorithms WS 23/24"));
        assert_eq!(loaded.settings.last_check, 1700000000);
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let (_tmp, mut config) = temp_config();
        config.advance_watermark(2000).unwrap();
        config.advance_watermark(1500).unwrap();
        assert_eq!(config.settings.last_check, 2000);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "username = \"jdoe\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.settings.username, "jdoe");
        assert_eq!(config.settings.interval, 1200);
        assert!(config.settings.namemap.is_empty());
    }

    #[test]
    fn test_is_selected_by_id_or_title() {
        let (_tmp, mut config) = temp_config();
        config.settings.selected_courses = vec!["c1".into(), "Databases WS 23/24".into()];

        assert!(config.is_selected("c1", "whatever"));
        assert!(config.is_selected("c9", "Databases WS 23/24"));
        assert!(!config.is_selected("c2", "Algorithms"));
    }

    #[test]
    fn test_malformed_config_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "interval = \"often\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/var/data"), PathBuf::from("/var/data"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/studip"), home.join("studip"));
        }
    }
}
