//! Bounded FIFO pool of units holding a loaded media resource.
//!
//! Hosts cap how many media elements may buffer at once. Every unit that
//! starts loading is admitted here; when the pool is full the oldest members
//! are unloaded, in admission order, until the newcomer fits.
//!
//! Design:
//! - `IndexMap` keeps insertion order with O(1) lookup and removal by id
//! - members are held as `Weak<dyn Evictable>`: the pool never keeps a unit
//!   alive, a dropped unit simply vanishes on the next eviction pass
//! - evictions run synchronously, with the pool lock released, so an
//!   evicted unit may call back into the pool (`remove`) without deadlock

use indexmap::IndexMap;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::core::error::UnitError;
use crate::core::event_bus::EventEmitter;
use crate::core::events::{UnitErrorEvent, UnitEvictedEvent};
use crate::core::ids::UnitId;

/// Hard cap of simultaneously loaded resources.
pub const MAX_LOADED: usize = 6;
/// Members left before the newcomer is appended, once the pool is full.
pub const TARGET_AFTER_EVICT: usize = 5;

/// Something the pool can unload.
pub trait Evictable: Send + Sync {
    fn unit_id(&self) -> UnitId;

    /// Release the loaded resource now and return to the initial state.
    fn evict(&self) -> Result<(), UnitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolLimits {
    pub max_loaded: usize,
    pub target: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_loaded: MAX_LOADED,
            target: TARGET_AFTER_EVICT,
        }
    }
}

impl PoolLimits {
    /// `None` unless `0 < target < max_loaded`.
    pub fn new(max_loaded: usize, target: usize) -> Option<Self> {
        (target > 0 && target < max_loaded).then_some(Self { max_loaded, target })
    }
}

/// FIFO pool of loaded units. Share it via `Arc`.
pub struct LoadedResourcePool {
    limits: PoolLimits,
    members: Mutex<IndexMap<UnitId, Weak<dyn Evictable>>>,
    emitter: Option<EventEmitter>,
    evictions: AtomicU64,
}

impl std::fmt::Debug for LoadedResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedResourcePool")
            .field("limits", &self.limits)
            .field("members", &self.members())
            .field("evictions", &self.evictions())
            .finish()
    }
}

impl Default for LoadedResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedResourcePool {
    pub fn new() -> Self {
        Self::with_limits(PoolLimits::default())
    }

    pub fn with_limits(limits: PoolLimits) -> Self {
        debug!(
            "LoadedResourcePool: max {} loaded, evict down to {} before admitting",
            limits.max_loaded, limits.target
        );
        Self {
            limits,
            members: Mutex::new(IndexMap::with_capacity(limits.max_loaded)),
            emitter: None,
            evictions: AtomicU64::new(0),
        }
    }

    /// Publish evictions and eviction failures through `emitter`.
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Admit `unit`, evicting the oldest members while the pool holds more
    /// than `target`, then appending. The pool never exceeds `target + 1`,
    /// which `PoolLimits` keeps at or below `max_loaded`. No-op for a unit
    /// that is already a member.
    ///
    /// Returns the ids of the evicted units, oldest first.
    pub fn admit<E: Evictable + 'static>(&self, unit: &Arc<E>) -> Vec<UnitId> {
        let id = unit.unit_id();
        let mut evicted = Vec::new();

        loop {
            let victim = {
                let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
                if members.contains_key(&id) {
                    trace!("{} already in pool", id);
                    return evicted;
                }
                let full = members.len() > self.limits.target || members.len() >= self.limits.max_loaded;
                let victim = if !full {
                    None
                } else {
                    members.shift_remove_index(0)
                };
                if victim.is_none() {
                    let weak: Weak<dyn Evictable> = Arc::downgrade(unit) as Weak<dyn Evictable>;
                    members.insert(id, weak);
                    debug!("{} admitted, pool size {}", id, members.len());
                    return evicted;
                }
                victim
            };

            let Some((victim_id, handle)) = victim else {
                return evicted;
            };
            match handle.upgrade() {
                Some(victim) => {
                    self.evict_member(victim_id, victim.as_ref(), id);
                    evicted.push(victim_id);
                }
                None => trace!("{} dropped without teardown, forgetting it", victim_id),
            }
        }
    }

    fn evict_member(&self, victim_id: UnitId, victim: &dyn Evictable, admitted: UnitId) {
        warn!("Unloading {} to make room for {}", victim_id, admitted);
        self.evictions.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = victim.evict() {
            warn!("Eviction of {} failed: {}", victim_id, err);
            if let Some(emitter) = &self.emitter {
                emitter.emit(UnitErrorEvent { unit: victim_id, error: err });
            }
        }
        if let Some(emitter) = &self.emitter {
            emitter.emit(UnitEvictedEvent { unit: victim_id, admitted });
        }
    }

    /// Forget `id`. Returns whether it was a member.
    pub fn remove(&self, id: UnitId) -> bool {
        let removed = self
            .members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(&id)
            .is_some();
        if removed {
            debug!("{} left pool", id);
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.members.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.members.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&id)
    }

    /// Member ids, oldest first.
    pub fn members(&self) -> Vec<UnitId> {
        self.members.lock().unwrap_or_else(|e| e.into_inner()).keys().copied().collect()
    }

    /// Total evictions performed since construction.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
