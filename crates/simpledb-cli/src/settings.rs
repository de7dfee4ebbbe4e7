//! CLI settings file
//!
//! Settings are read from TOML, by default at
//! `<config dir>/simpledb/settings.toml`. A missing default file is not an
//! error; a missing file named with `--config` is.
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! database = "simpleDb__test"
//! username = "sbsst"
//!
//! [pool]
//! min_size = 1
//! max_size = 4
//!
//! [logging]
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use simpledb_connection::PoolConfig;
use simpledb_core::ConnectionConfig;

use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
    /// Log every statement at info level
    pub dev_mode: bool,
}

impl Settings {
    /// Location of the settings file when `--config` is not given
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("simpledb").join("settings.toml"))
    }

    /// Load settings from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(contents)?;
        settings.pool.validate()?;
        Ok(settings)
    }
}
