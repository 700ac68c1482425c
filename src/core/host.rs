//! Host capabilities a playback unit drives.
//!
//! The crate never touches a media element directly. A host provides:
//! - [`ResourceHandle`]: one media element (attach sources, play, pause, ...)
//! - [`ViewportQuery`]: current viewport width
//! - [`VisualSink`]: receives state + presentation flags to render
//!
//! Asynchronous host events come back through [`PlaybackUnit::deliver`]
//! as [`ResourceSignal`]s tagged with the [`LoadEpoch`] they belong to.
//!
//! [`PlaybackUnit::deliver`]: crate::core::unit::PlaybackUnit::deliver

use serde::{Deserialize, Serialize};

use crate::config::StyleConfig;
use crate::core::error::HostError;
use crate::core::ids::{LoadEpoch, UnitId};
use crate::core::sources::SelectedSource;
use crate::core::state::{PlayRejection, PlaybackState, Readiness};

/// How much the host should fetch before playback is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadMode {
    #[default]
    None,
    Metadata,
    Auto,
}

impl PreloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadMode::None => "none",
            PreloadMode::Metadata => "metadata",
            PreloadMode::Auto => "auto",
        }
    }
}

impl std::str::FromStr for PreloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PreloadMode::None),
            "metadata" => Ok(PreloadMode::Metadata),
            "auto" => Ok(PreloadMode::Auto),
            other => Err(format!("unknown preload mode '{}'", other)),
        }
    }
}

/// Immediate outcome of a play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRequest {
    Started,
    /// Completion arrives later as `PlayResolved` / `PlayRejected`.
    Pending,
    Rejected { rejection: PlayRejection, message: String },
}

/// One host media element.
pub trait ResourceHandle: Send {
    /// Attach `sources` and start fetching. Signals produced for this
    /// attachment must carry `epoch`.
    fn attach(
        &mut self,
        sources: &[SelectedSource],
        preload: PreloadMode,
        epoch: LoadEpoch,
    ) -> Result<(), HostError>;

    /// Detach sources and free buffered media.
    fn release(&mut self) -> Result<(), HostError>;

    fn play(&mut self, epoch: LoadEpoch) -> PlayRequest;
    fn pause(&mut self);

    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);

    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// Known once metadata is loaded.
    fn duration(&self) -> Option<f64>;

    fn set_looping(&mut self, looping: bool);
    fn set_preload(&mut self, preload: PreloadMode);
}

pub trait ViewportQuery: Send + Sync {
    /// Viewport width in CSS pixels.
    fn width(&self) -> u32;
}

pub trait VisualSink: Send + Sync {
    fn present(&self, unit: UnitId, state: PlaybackState, flags: &VisualFlags);
    fn set_fullscreen(&self, unit: UnitId, on: bool);
    /// Control colours for `unit`, sent once at construction.
    fn apply_style(&self, unit: UnitId, style: &StyleConfig);
}

/// Host event for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSignal {
    pub epoch: LoadEpoch,
    pub event: ResourceEvent,
}

impl ResourceSignal {
    pub fn new(epoch: LoadEpoch, event: ResourceEvent) -> Self {
        Self { epoch, event }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    LoadStart,
    LoadedMetadata,
    Ready(Readiness),
    PlayResolved,
    PlayRejected { rejection: PlayRejection, message: String },
    Ended,
    VolumeChanged { volume: f64, muted: bool },
    TimeUpdate,
    Error(String),
    FullscreenChanged(bool),
}

impl ResourceEvent {
    /// Belongs to a particular attachment; dropped when its epoch is stale.
    /// Volume and fullscreen describe the element itself and always apply.
    pub fn is_load_scoped(&self) -> bool {
        !matches!(
            self,
            ResourceEvent::VolumeChanged { .. } | ResourceEvent::FullscreenChanged(_)
        )
    }
}

/// Presentation flags, rendered by the host as classes/attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisualFlags {
    /// User asked to play, data not there yet.
    pub preplay: bool,
    /// Waiting for data long enough to show a spinner.
    pub loading: bool,
    pub playing: bool,
    pub paused: bool,
    pub ended: bool,
    pub error: bool,
    pub metadata_loaded: bool,
    pub can_play: bool,
    pub can_play_through: bool,
    pub muted: bool,
    pub fullscreen: bool,
    pub user_activity: bool,
    pub custom_controls: bool,
}

impl VisualFlags {
    /// Names of the set flags, in a stable order.
    pub fn class_names(&self) -> Vec<&'static str> {
        [
            (self.preplay, "preplay"),
            (self.loading, "loading"),
            (self.playing, "playing"),
            (self.paused, "paused"),
            (self.ended, "ended"),
            (self.error, "error"),
            (self.metadata_loaded, "metadata-loaded"),
            (self.can_play, "canplay"),
            (self.can_play_through, "canplaythrough"),
            (self.muted, "muted"),
            (self.fullscreen, "fullscreen"),
            (self.user_activity, "user-activity"),
            (self.custom_controls, "has-custom-controls"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}
