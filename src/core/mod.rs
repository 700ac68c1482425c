//! Core engine - state machine, pool, autoplay, sources, unit facade.
//!
//! Independent of any host: everything outside the process is reached
//! through the traits in [`host`].

pub mod autoplay;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod host;
pub mod ids;
pub mod pool;
pub mod sources;
pub mod state;
pub mod timer;
pub mod unit;

// Re-exports for convenience
pub use event_bus::EventBus;
pub use pool::LoadedResourcePool;
pub use state::{PlaybackState, PlaybackStateMachine};
pub use unit::PlaybackUnit;
