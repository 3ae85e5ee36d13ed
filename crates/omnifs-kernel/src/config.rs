//! Volume configuration.
//!
//! Format parameters and the default administrator, read from a RON file:
//!
//! ```ron
//! (
//!     total_size: 10485760,
//!     block_size: 4096,
//!     max_users: 50,
//!     admin_username: "admin",
//!     admin_password: "admin123",
//! )
//! ```
//!
//! Missing fields fall back to [`VolumeConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use omnifs_types::validate_username;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "OMNIFS_CONFIG";

pub const DEFAULT_TOTAL_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;
pub const DEFAULT_MAX_USERS: u32 = 50;

const MIN_BLOCK_SIZE: u64 = 512;
const MAX_USERS_LIMIT: u32 = 1024;

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parameters for formatting a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Bytes of data-block space.
    pub total_size: u64,
    pub block_size: u64,
    /// User table slots.
    pub max_users: u32,
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            total_size: DEFAULT_TOTAL_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_users: DEFAULT_MAX_USERS,
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        }
    }
}

impl VolumeConfig {
    /// Defaults with explicit geometry.
    pub fn with_geometry(total_size: u64, block_size: u64) -> Self {
        Self {
            total_size,
            block_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "block_size {} must be a power of two >= {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.total_size == 0 || self.total_size % self.block_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "total_size {} must be a non-zero multiple of block_size {}",
                self.total_size, self.block_size
            )));
        }
        if !(1..=MAX_USERS_LIMIT).contains(&self.max_users) {
            return Err(ConfigError::Invalid(format!(
                "max_users {} must be in 1..={MAX_USERS_LIMIT}",
                self.max_users
            )));
        }
        validate_username(&self.admin_username)
            .map_err(|e| ConfigError::Invalid(format!("admin_username: {e}")))?;
        Ok(())
    }

    /// Parse and validate RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: VolumeConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        info!(path = %path.display(), "loaded volume config");
        Ok(config)
    }

    /// Resolve the config for this process.
    ///
    /// An explicit path (or `OMNIFS_CONFIG`) must exist. The default path is
    /// optional: if it is absent the defaults apply.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(_) => Ok(Self::default()),
            None => {
                warn!("no config directory available, using default volume config");
                Ok(Self::default())
            }
        }
    }
}

/// Default config location (`~/.config/omnifs/config.ron`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("omnifs").join("config.ron"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VolumeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.total_size / config.block_size, 2560);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = VolumeConfig::from_ron("(block_size: 1024, max_users: 8)").unwrap();
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.max_users, 8);
        assert_eq!(config.total_size, DEFAULT_TOTAL_SIZE);
        assert_eq!(config.admin_username, "admin");
    }

    #[test]
    fn test_rejects_bad_geometry() {
        for config in [
            VolumeConfig::with_geometry(10 * 1024 * 1024, 1000),
            VolumeConfig::with_geometry(10 * 1024 * 1024, 256),
            VolumeConfig::with_geometry(4097, 4096),
            VolumeConfig::with_geometry(0, 4096),
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_rejects_bad_users() {
        let mut config = VolumeConfig::default();
        config.max_users = 0;
        assert!(config.validate().is_err());
        config.max_users = 4;
        config.admin_username = "bad name".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(total_size: 1048576, admin_password: \"s3cret\")").unwrap();
        let config = VolumeConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.total_size, 1048576);
        assert_eq!(config.admin_password, "s3cret");

        std::fs::write(&path, "(total_size: ").unwrap();
        assert!(matches!(
            VolumeConfig::load(&path),
            Err(ConfigError::Ron(_))
        ));
        assert!(matches!(
            VolumeConfig::load(&dir.path().join("missing.ron")),
            Err(ConfigError::Io(_))
        ));
    }
}
