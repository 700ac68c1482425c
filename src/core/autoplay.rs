//! Autoplay gate: decides whether a readiness event may start playback on
//! its own.
//!
//! Autoplay fires only when all of the following hold:
//! - a mode other than `None` is configured
//! - the viewport is at least `min_viewport_width` wide
//! - the readiness event satisfies the mode (`Immediate` on "can start",
//!   `OnFullBuffer` only on "can play through")
//! - the unit has not reached Playing/Paused yet in its current load cycle

use serde::{Deserialize, Serialize};

use crate::core::state::Readiness;

/// When a unit starts playing without being asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoplayMode {
    #[default]
    None,
    /// As soon as playback can start.
    Immediate,
    /// Only once the host reports it can play through without stalling.
    #[serde(rename = "canplaythrough", alias = "on-full-buffer")]
    OnFullBuffer,
}

impl AutoplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoplayMode::None => "none",
            AutoplayMode::Immediate => "immediate",
            AutoplayMode::OnFullBuffer => "canplaythrough",
        }
    }

    /// Minimum readiness this mode waits for (None for `AutoplayMode::None`).
    pub fn required_readiness(&self) -> Option<Readiness> {
        match self {
            AutoplayMode::None => None,
            AutoplayMode::Immediate => Some(Readiness::CanStart),
            AutoplayMode::OnFullBuffer => Some(Readiness::CanPlayThrough),
        }
    }
}

impl std::str::FromStr for AutoplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "false" => Ok(AutoplayMode::None),
            "immediate" | "true" | "on" => Ok(AutoplayMode::Immediate),
            "canplaythrough" | "on-full-buffer" => Ok(AutoplayMode::OnFullBuffer),
            other => Err(format!("unknown autoplay mode '{}'", other)),
        }
    }
}

/// Autoplay policy of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoplayGate {
    pub mode: AutoplayMode,
    pub min_viewport_width: u32,
}

impl AutoplayGate {
    pub fn new(mode: AutoplayMode, min_viewport_width: u32) -> Self {
        Self { mode, min_viewport_width }
    }

    /// Mode set and viewport wide enough.
    ///
    /// Used at construction and load start (show the loading indicator, force
    /// full preload), independently of any readiness event.
    pub fn eligible(&self, viewport_width: u32) -> bool {
        self.mode != AutoplayMode::None && viewport_width >= self.min_viewport_width
    }

    /// Whether `readiness` should start playback right now.
    pub fn allows(&self, readiness: Readiness, viewport_width: u32, cycle_started: bool) -> bool {
        if cycle_started || !self.eligible(viewport_width) {
            return false;
        }
        match self.mode.required_readiness() {
            Some(required) => readiness >= required,
            None => false,
        }
    }
}
