//! Unit and application configuration.
//!
//! `UnitConfig` replaces the option bag of an embedded player with named,
//! typed fields. `AppConfig` is what the simulator reads from `vidgate.json`.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::autoplay::{AutoplayGate, AutoplayMode};
use crate::core::host::PreloadMode;
use crate::core::pool::PoolLimits;
use crate::core::sources::{DEFAULT_ALTERNATE_MAX_WIDTH, SourceDescriptor, SourceError};

/// Config file name inside the config dir.
pub const CONFIG_FILE: &str = "vidgate.json";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pool limits: keep {target} of max {max_loaded} (need 0 < keep < max)")]
    InvalidPoolLimits { max_loaded: usize, target: usize },

    #[error("source #{index}: {source}")]
    InvalidSource {
        index: usize,
        #[source]
        source: SourceError,
    },
}

/// Colours of the custom controls. Opaque to the core, handed to the host
/// sink through `VisualSink::apply_style` when a unit is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub progress_upper_color: String,
    pub progress_lower_color: String,
    pub volume_upper_color: String,
    pub volume_lower_color: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            progress_upper_color: "currentColor".into(),
            progress_lower_color: "currentColor".into(),
            volume_upper_color: "currentColor".into(),
            volume_lower_color: "currentColor".into(),
        }
    }
}

/// Per-unit options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub autoplay: AutoplayMode,
    /// Autoplay only on viewports at least this wide (px).
    pub autoplay_min_width: u32,
    pub preload: PreloadMode,
    /// Viewports this wide or narrower use alternate sources (px).
    pub phone_max: u32,
    pub muted: bool,
    pub looping: bool,
    /// Host renders its own controls instead of the native ones.
    pub custom_controls: bool,
    /// Time a user play() may wait for data before "preplay" turns into
    /// "loading".
    pub loading_indicator_delay_ms: u64,
    /// Idle time after which the user-activity flag clears.
    pub activity_fade_ms: u64,
    pub style: StyleConfig,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            autoplay: AutoplayMode::None,
            autoplay_min_width: 0,
            preload: PreloadMode::None,
            phone_max: DEFAULT_ALTERNATE_MAX_WIDTH,
            muted: false,
            looping: false,
            custom_controls: false,
            loading_indicator_delay_ms: 2000,
            activity_fade_ms: 1350,
            style: StyleConfig::default(),
        }
    }
}

impl UnitConfig {
    pub fn gate(&self) -> AutoplayGate {
        AutoplayGate::new(self.autoplay, self.autoplay_min_width)
    }
}

/// Simulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolLimits,
    /// Width reported by the simulated viewport (px).
    pub viewport_width: u32,
    /// Defaults for every simulated unit.
    pub unit: UnitConfig,
    /// Source list shared by all units; generated per unit when empty.
    pub sources: Vec<SourceDescriptor>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool: PoolLimits::default(),
            viewport_width: 1280,
            unit: UnitConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `load()` if the file exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let PoolLimits { max_loaded, target } = self.pool;
        if PoolLimits::new(max_loaded, target).is_none() {
            return Err(ConfigError::InvalidPoolLimits { max_loaded, target });
        }
        for (index, source) in self.sources.iter().enumerate() {
            source
                .validate()
                .map_err(|source| ConfigError::InvalidSource { index, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UnitConfig::default();
        assert_eq!(config.phone_max, 667);
        assert_eq!(config.loading_indicator_delay_ms, 2000);
        assert_eq!(config.activity_fade_ms, 1350);
        assert_eq!(config.style.volume_lower_color, "currentColor");
        assert_eq!(config.gate().mode, AutoplayMode::None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "viewport_width": 375, "unit": { "autoplay": "canplaythrough", "autoplay_min_width": 700 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.viewport_width, 375);
        assert_eq!(config.unit.autoplay, AutoplayMode::OnFullBuffer);
        assert_eq!(config.unit.autoplay_min_width, 700);
        assert_eq!(config.unit.preload, PreloadMode::None);
        assert_eq!(config.pool, PoolLimits::default());
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.pool = PoolLimits { max_loaded: 4, target: 4 };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPoolLimits { max_loaded: 4, target: 4 })
        );

        config.pool = PoolLimits::default();
        config.sources = vec![SourceDescriptor::new("a.mp4"), SourceDescriptor::new("b.mkv")];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSource { index: 1, .. })));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("vidgate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.unit.muted = true;
        config.sources = vec![SourceDescriptor::new("a.webm").with_alternate("a-small.webm")];
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = Path::new("/nonexistent/vidgate/vidgate.json");
        assert_eq!(AppConfig::load_or_default(path).unwrap(), AppConfig::default());
    }
}
