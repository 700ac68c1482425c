//! Config and data file locations.
//!
//! Priority for both directories:
//! 1. CLI `--config-dir`
//! 2. `VIDGATE_CONFIG_DIR` environment variable
//! 3. Current directory, if it already holds a vidgate file
//! 4. Platform directory from dirs-next:
//!    - Linux: `~/.config/vidgate` (config), `~/.local/share/vidgate` (data)
//!    - macOS: `~/Library/Application Support/vidgate`
//!    - Windows: `%APPDATA%\vidgate`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "vidgate";
const ENV_CONFIG_DIR: &str = "VIDGATE_CONFIG_DIR";

/// Files whose presence makes the current directory the config dir.
const LOCAL_MARKERS: &[&str] = &["vidgate.json", "vidgate.log"];

/// Overrides for the default application paths.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg → `VIDGATE_CONFIG_DIR` → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(ENV_CONFIG_DIR).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

#[derive(Debug, Clone, Copy)]
enum DirKind {
    Config,
    Data,
}

pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    app_dir(DirKind::Config, config).join(name)
}

/// Path of a data file (logs).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    app_dir(DirKind::Data, config).join(name)
}

/// Create the config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = app_dir(DirKind::Config, config);
    let data_dir = app_dir(DirKind::Data, config);

    for dir in [&config_dir, &data_dir] {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
    }
    Ok(())
}

fn app_dir(kind: DirKind, config: &PathConfig) -> PathBuf {
    let platform = match kind {
        DirKind::Config => dirs_next::config_dir(),
        DirKind::Data => dirs_next::data_dir(),
    };
    resolve_dir(config, std::env::current_dir().ok().as_deref(), platform)
}

fn resolve_dir(config: &PathConfig, cwd: Option<&Path>, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(cwd) = cwd.filter(|dir| has_local_files(dir)) {
        return cwd.to_path_buf();
    }
    platform
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}
