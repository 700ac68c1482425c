//! Error kinds surfaced by playback units and reported by host capabilities.
//!
//! Host-side failures (`HostError`, play rejections) never reach callers as
//! is: the unit translates them into one of the three `UnitError` kinds at
//! its boundary. None of them is fatal beyond the unit it belongs to.

use crate::core::ids::UnitId;

/// Error scoped to a single playback unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// Host refused to start playback without a user gesture.
    /// Recovered locally: the unit waits for the next explicit `play()`.
    #[error("{unit}: playback blocked by host autoplay policy")]
    AttachBlocked { unit: UnitId },

    /// Decode/network failure or a genuine play() rejection. Not retried.
    #[error("{unit}: failed to attach or play resource: {reason}")]
    AttachFailed { unit: UnitId, reason: String },

    /// Resource could not be released cleanly while being evicted.
    #[error("{unit}: failed to release resource on eviction: {reason}")]
    EvictionFailed { unit: UnitId, reason: String },
}

impl UnitError {
    /// Unit the error belongs to.
    pub fn unit(&self) -> UnitId {
        match self {
            UnitError::AttachBlocked { unit }
            | UnitError::AttachFailed { unit, .. }
            | UnitError::EvictionFailed { unit, .. } => *unit,
        }
    }
}

/// Failure reported by a host resource handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("attach failed: {0}")]
    Attach(String),

    #[error("release failed: {0}")]
    Release(String),
}
