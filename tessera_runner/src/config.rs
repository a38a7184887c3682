//! Runner settings: the engine's `BalanceConfig` plus everything that only the
//! binary cares about (where samples come from and where images go).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tessera::BalanceConfig;

/// Loaded from TOML. The engine settings live under a `[balance]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub balance: BalanceConfig,
    /// Readings drawn per batch.
    pub samples: usize,
    pub seed: u64,
    /// Draw a new batch every cycle instead of replaying the first one.
    pub resample: bool,
    /// Stop after this many cycles. `None` runs until interrupted.
    pub cycles: Option<u64>,
    pub output_dir: PathBuf,
    /// Pixels per grid cell in the rendered images.
    pub scale: u32,
    pub render: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            balance: BalanceConfig::default(),
            samples: 100,
            seed: 10,
            resample: false,
            cycles: None,
            output_dir: PathBuf::from("images"),
            scale: 8,
            render: true,
        }
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.balance.validate()?;
        anyhow::ensure!(self.scale > 0, "scale must be at least 1 pixel per cell");
        Ok(())
    }
}
