//! Store configuration, loaded from TOML.
//!
//! ```toml
//! max_name_len = 63
//! relative_library_paths = true
//! compact_files = false
//! skip_orphans_on_save = false
//! ```

use std::path::Path;

use datablock_types::{DEFAULT_MAX_NAME_LEN, MIN_NAME_LEN};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum entity and node name length in bytes, at least [`MIN_NAME_LEN`].
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
    /// Write libraries below the saved file's directory as `//relative` paths.
    #[serde(default = "default_true")]
    pub relative_library_paths: bool,
    #[serde(default)]
    pub compact_files: bool,
    /// Leave unused, unowned local entities out of saved files.
    #[serde(default)]
    pub skip_orphans_on_save: bool,
}

fn default_max_name_len() -> usize {
    DEFAULT_MAX_NAME_LEN
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            relative_library_paths: true,
            compact_files: false,
            skip_orphans_on_save: false,
        }
    }
}

impl StoreConfig {
    /// Parses a config file, failing on any read, parse or validation error.
    pub fn load_from(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the store cannot honour.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_name_len < MIN_NAME_LEN {
            return Err(StoreError::InvalidConfig(format!(
                "max_name_len must be at least {MIN_NAME_LEN}, got {}",
                self.max_name_len
            )));
        }
        Ok(())
    }

    /// Loads a config file, falling back to defaults when it is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No store config at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => {
                info!("Loaded store config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to load store config {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: StoreConfig = toml::from_str("compact_files = true").unwrap();
        assert!(config.compact_files);
        assert!(config.relative_library_paths);
        assert_eq!(config.max_name_len, 63);
    }

    #[test]
    fn load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::load_or_default(&dir.path().join("nope.toml"));
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn load_or_default_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_name_len = \"long\"").unwrap();

        assert!(StoreConfig::load_from(&path).is_err());
        assert_eq!(StoreConfig::load_or_default(&path), StoreConfig::default());
    }

    #[test]
    fn load_from_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "max_name_len = 16\nskip_orphans_on_save = true\n").unwrap();

        let config = StoreConfig::load_from(&path).unwrap();
        assert_eq!(config.max_name_len, 16);
        assert!(config.skip_orphans_on_save);
    }

    #[test]
    fn name_limit_below_minimum_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "max_name_len = 0\n").unwrap();

        let err = StoreConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
        assert!(err.to_string().contains("max_name_len"));
        assert_eq!(StoreConfig::load_or_default(&path), StoreConfig::default());

        std::fs::write(&path, "max_name_len = 8\n").unwrap();
        assert_eq!(StoreConfig::load_from(&path).unwrap().max_name_len, 8);
    }
}
