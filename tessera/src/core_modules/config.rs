//! Startup configuration for a balancing run.
//!
//! Loaded from TOML at runtime, with every field optional; anything missing falls
//! back to `BalanceConfig::default()`.

use crate::core_modules::error::PartitionError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Size of the rectangles the grid is cut into at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

/// Grid dimensions, the global target and the scheduler's retry bound.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// K: the number of readings every region is driven towards.
    pub target: u32,
    /// Initial tiling. `None` starts from a single region covering the grid.
    pub initial_tile: Option<TileSize>,
    /// Upper bound on consecutive transfer calls against one neighbor.
    pub max_transfer_attempts: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
            target: 10,
            initial_tile: None,
            max_transfer_attempts: 64,
        }
    }
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.width == 0 || self.height == 0 {
            return Err(PartitionError::InvalidConfig(format!(
                "grid must not be empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.target == 0 {
            return Err(PartitionError::InvalidConfig(
                "target reading count must be at least 1".to_string(),
            ));
        }
        if self.max_transfer_attempts == 0 {
            return Err(PartitionError::InvalidConfig(
                "max_transfer_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(tile) = self.initial_tile {
            if tile.width == 0 || tile.height == 0 {
                return Err(PartitionError::InvalidConfig(format!(
                    "tiles must not be empty, got {}x{}",
                    tile.width, tile.height
                )));
            }
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: None,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] PartitionError),
}
