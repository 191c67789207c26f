use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{klog_debug, Error, Result};

/// Settings for a build run.
///
/// Read from `~/.kiln/kiln.toml`; command line flags override the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent worker slots per project graph.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Walk the graphs without running task bodies.
    #[serde(default)]
    pub dry_run: bool,
    /// Print per-task timings after the run.
    #[serde(default)]
    pub profiling: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            dry_run: false,
            profiling: false,
        }
    }
}

impl RunnerConfig {
    pub fn kiln_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".kiln"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::kiln_dir()?.join("kiln.toml"))
    }

    /// Worker slot count, never below one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        klog_debug!("RunnerConfig::load path={}", path.display());
        if !path.exists() {
            klog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        klog_debug!(
            "Config loaded: workers={}, dry_run={}, profiling={}",
            config.workers,
            config.dry_run,
            config.profiling
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                klog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        klog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
