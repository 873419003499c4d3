//! Where shotreel keeps preferences, project configs, logs and the cache.
//!
//! `--config-dir` beats `SHOTREEL_CONFIG_DIR`; with neither set the
//! platform config and data dirs (via dirs-next) get a `shotreel` subdir.
//! An override holds both config and data.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_ENV: &str = "SHOTREEL_CONFIG_DIR";

pub const PREFS_FILE: &str = "shotreel.json";
pub const LOG_FILE: &str = "shotreel.log";

const APP_DIR: &str = "shotreel";

#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Override for both config and data
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        Self {
            config_dir: cli_dir.or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from)),
        }
    }

    fn base(&self, platform: fn() -> Option<PathBuf>) -> PathBuf {
        match &self.config_dir {
            Some(dir) => dir.clone(),
            None => platform().map_or_else(|| PathBuf::from("."), |d| d.join(APP_DIR)),
        }
    }

    fn config_root(&self) -> PathBuf {
        self.base(dirs_next::config_dir)
    }

    fn data_root(&self) -> PathBuf {
        self.base(dirs_next::data_dir)
    }
}

pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config.config_root().join(name)
}

/// Logs and sessions.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    config.data_root().join(name)
}

/// `<project>.json` configs.
pub fn projects_dir(config: &PathConfig) -> PathBuf {
    config.config_root().join("projects")
}

pub fn cache_dir(config: &PathConfig) -> PathBuf {
    config.data_root().join("cache")
}

/// Create the projects dir (and so the config dir) plus the data dir.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    create(&projects_dir(config))?;
    create(&config.data_root())
}

fn create(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
}
