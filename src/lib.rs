//! vidgate - playback-control core for embedded video players.
//!
//! An explicit playback state machine, a bounded FIFO pool of loaded media
//! resources, an autoplay gate and viewport-dependent source selection,
//! composed by [`PlaybackUnit`] over host-provided capabilities.

// Core engine (state, pool, unit facade, events)
pub mod core;

// Host simulation and the simulator binary
pub mod cli;
pub mod config;
pub mod paths;
pub mod runner;
pub mod sim;

pub use config::{AppConfig, UnitConfig};
pub use core::autoplay::{AutoplayGate, AutoplayMode};
pub use core::error::{HostError, UnitError};
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::host::{PreloadMode, ResourceEvent, ResourceHandle, ResourceSignal, ViewportQuery, VisualFlags, VisualSink};
pub use core::ids::{LoadEpoch, UnitId};
pub use core::pool::{Evictable, LoadedResourcePool, PoolLimits};
pub use core::sources::{SelectedSource, SourceDescriptor, select_sources};
pub use core::state::{PlaybackState, PlaybackStateMachine, Readiness};
pub use core::unit::{PlaybackUnit, UnitServices};
