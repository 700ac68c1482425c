//! Notifications published on the shared [`EventBus`](crate::core::event_bus::EventBus).

use serde::Serialize;

use crate::core::error::UnitError;
use crate::core::host::VisualFlags;
use crate::core::ids::UnitId;
use crate::core::state::PlaybackState;

// === State ===

/// A unit's playback state changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateChangedEvent {
    pub unit: UnitId,
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// Presentation flags of a unit changed (also sent alongside every state change).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VisualStateEvent {
    pub unit: UnitId,
    pub state: PlaybackState,
    pub flags: VisualFlags,
}

// === Errors / pool ===

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitErrorEvent {
    pub unit: UnitId,
    pub error: UnitError,
}

/// Unit was unloaded by the pool to make room for another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnitEvictedEvent {
    pub unit: UnitId,
    /// Unit whose admission caused the eviction.
    pub admitted: UnitId,
}

/// Unit asks the host to enter or leave fullscreen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FullscreenRequestEvent {
    pub unit: UnitId,
    pub on: bool,
}

// === Lifecycle hooks ===

/// Lifecycle hook names exposed to integrators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Initialised,
    LoadStart,
    LoadedMetadata,
    CanPlay,
    CanPlayThrough,
    Playing,
    Pause,
    Ended,
    VolumeChange,
    TimeUpdate,
    Error,
    FullscreenChange,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Initialised => "initialised",
            Hook::LoadStart => "loadstart",
            Hook::LoadedMetadata => "loadedmetadata",
            Hook::CanPlay => "canplay",
            Hook::CanPlayThrough => "canplaythrough",
            Hook::Playing => "playing",
            Hook::Pause => "pause",
            Hook::Ended => "ended",
            Hook::VolumeChange => "volumechange",
            Hook::TimeUpdate => "timeupdate",
            Hook::Error => "error",
            Hook::FullscreenChange => "fullscreenchange",
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub unit: UnitId,
    pub hook: Hook,
}
