//! PlaybackUnit - one controllable media instance.
//!
//! Composes a [`PlaybackStateMachine`], the shared [`LoadedResourcePool`]
//! and the host capabilities (resource handle, viewport, visual sink).
//!
//! # Command queue
//!
//! Every public operation becomes a [`UnitCommand`] pushed onto a FIFO
//! queue. Whoever finds the queue idle drains it; a command submitted while
//! the unit is draining (typically from a subscriber reacting to a
//! notification) is queued behind the current one instead of running
//! re-entrantly. Each command runs in three phases:
//!
//! 1. pool admission, when the command is about to attach a resource
//!    (may synchronously evict other units)
//! 2. state machine + resource calls under the core lock, collecting
//!    [`Notice`]s
//! 3. notices published with no lock held
//!
//! Pool evictions bypass the queue for the state change: [`Evictable::evict`]
//! unloads right away so the pool can finish its admission. Its notices are
//! queued at the front instead, so they reach the sink after whatever batch
//! the unit is still publishing and the sink ends on the current state.
//!
//! # Stale signals
//!
//! Every attach and every release advances the unit's [`LoadEpoch`]. Host
//! signals carry the epoch of the attachment that produced them; load-scoped
//! signals from an older epoch are dropped.

use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use crate::config::UnitConfig;
use crate::core::error::{HostError, UnitError};
use crate::core::event_bus::EventBus;
use crate::core::events::{
    FullscreenRequestEvent, Hook, LifecycleEvent, StateChangedEvent, UnitErrorEvent, VisualStateEvent,
};
use crate::core::host::{
    PlayRequest, PreloadMode, ResourceEvent, ResourceHandle, ResourceSignal, ViewportQuery, VisualFlags,
    VisualSink,
};
use crate::core::ids::{LoadEpoch, UnitId};
use crate::core::pool::{Evictable, LoadedResourcePool};
use crate::core::sources::{SourceDescriptor, select_sources};
use crate::core::autoplay::AutoplayMode;
use crate::core::state::{
    Command, Effect, PlayRejection, PlaybackState, PlaybackStateMachine, Readiness, StateChange,
};
use crate::core::timer::DebounceTimer;

/// Shared collaborators of every unit.
#[derive(Clone)]
pub struct UnitServices {
    pub pool: Arc<LoadedResourcePool>,
    pub bus: EventBus,
    pub viewport: Arc<dyn ViewportQuery>,
    pub sink: Arc<dyn VisualSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeStep {
    Up,
    Down,
}

/// Full player replacement: new sources plus the settings that travel with
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceRequest {
    pub sources: Vec<SourceDescriptor>,
    pub autoplay: AutoplayMode,
    /// Overrides the configured minimum autoplay width when set.
    pub autoplay_min_width: Option<u32>,
    pub preload: PreloadMode,
    pub muted: bool,
    pub looping: bool,
    pub custom_controls: bool,
}

/// Playback position for progress bars.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Progress {
    /// Current time rounded to the nearest 0.25 s.
    pub position: f64,
    pub duration: Option<f64>,
    /// Whole percent of the duration played.
    pub percent: Option<u32>,
}

#[derive(Debug, Clone)]
enum UnitCommand {
    Load,
    Play { at: Instant, show_loading: bool },
    Pause,
    Toggle { at: Instant },
    Unload,
    ReplaceSources(Vec<SourceDescriptor>),
    Configure(ReplaceRequest),
    Teardown,
    Deliver(ResourceSignal),
    Tick(Instant),
    AlterVolume(VolumeStep),
    ToggleMute,
    ScrubTo(f64),
    ToggleFullscreen,
    UserActivity(Instant),
    /// Notices of an eviction, published in order with the unit's own.
    Publish(Vec<Notice>),
}

/// Outcome of a command, published after the core lock is released.
#[derive(Debug, Clone)]
enum Notice {
    State(StateChange),
    Visual(PlaybackState, VisualFlags),
    Lifecycle(Hook),
    Error(UnitError),
    Fullscreen(bool),
    LeavePool,
}

type StateCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;

struct UnitCore {
    id: UnitId,
    config: UnitConfig,
    machine: PlaybackStateMachine,
    resource: Box<dyn ResourceHandle>,
    sources: Vec<SourceDescriptor>,
    epoch: LoadEpoch,
    /// Preload the current attachment was made with.
    attached_preload: Option<PreloadMode>,
    flags: VisualFlags,
    /// Last (state, flags) handed to the sink.
    presented: Option<(PlaybackState, VisualFlags)>,
    /// Sticky error flag; cleared by the next user play or source swap.
    fault: bool,
    last_error: Option<UnitError>,
    release_error: Option<HostError>,
    loading_timer: DebounceTimer,
    activity_timer: DebounceTimer,
    torn_down: bool,
}

pub struct PlaybackUnit {
    id: UnitId,
    me: Weak<PlaybackUnit>,
    services: UnitServices,
    core: Mutex<UnitCore>,
    queue: Mutex<VecDeque<UnitCommand>>,
    draining: AtomicBool,
    subscribers: Mutex<Vec<StateCallback>>,
}

impl std::fmt::Debug for PlaybackUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackUnit")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl PlaybackUnit {
    /// Create a unit.
    ///
    /// Autoplay-eligible units force `preload: auto`; any unit whose preload
    /// is not `none` starts loading right away.
    pub fn new(
        mut config: UnitConfig,
        mut resource: Box<dyn ResourceHandle>,
        sources: Vec<SourceDescriptor>,
        services: UnitServices,
    ) -> Arc<Self> {
        let id = UnitId::next();
        let width = services.viewport.width();
        if config.gate().eligible(width) {
            config.preload = PreloadMode::Auto;
        }

        resource.set_muted(config.muted);
        resource.set_looping(config.looping);
        resource.set_preload(config.preload);

        let flags = VisualFlags {
            muted: config.muted,
            custom_controls: config.custom_controls,
            ..Default::default()
        };
        let preload = config.preload;
        let style = config.style.clone();
        let core = UnitCore {
            id,
            machine: PlaybackStateMachine::new(config.gate()),
            loading_timer: DebounceTimer::new(config.loading_indicator_delay_ms),
            activity_timer: DebounceTimer::new(config.activity_fade_ms),
            config,
            resource,
            sources,
            epoch: LoadEpoch::default(),
            attached_preload: None,
            flags,
            presented: None,
            fault: false,
            last_error: None,
            release_error: None,
            torn_down: false,
        };

        let unit = Arc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            services,
            core: Mutex::new(core),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        });
        debug!("{} created ({} source(s), preload {})", id, unit.sources().len(), preload.as_str());

        unit.services.sink.apply_style(id, &style);
        let mut notices = vec![Notice::Lifecycle(Hook::Initialised)];
        unit.lock_core().refresh_visual(&mut notices);
        unit.publish(notices);

        if preload != PreloadMode::None {
            unit.load();
        }
        unit
    }

    // === Queries ===

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.lock_core().machine.state()
    }

    pub fn flags(&self) -> VisualFlags {
        self.lock_core().flags
    }

    pub fn config(&self) -> UnitConfig {
        self.lock_core().config.clone()
    }

    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.lock_core().sources.clone()
    }

    /// Epoch of the current (or last) attachment.
    pub fn epoch(&self) -> LoadEpoch {
        self.lock_core().epoch
    }

    pub fn is_loaded(&self) -> bool {
        self.lock_core().machine.is_attached()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock_core().torn_down
    }

    /// Most recent error, including silently recovered ones.
    pub fn last_error(&self) -> Option<UnitError> {
        self.lock_core().last_error.clone()
    }

    pub fn volume(&self) -> f64 {
        self.lock_core().resource.volume()
    }

    pub fn muted(&self) -> bool {
        self.lock_core().resource.muted()
    }

    pub fn progress(&self) -> Progress {
        let core = self.lock_core();
        let current = core.resource.current_time();
        let duration = core.resource.duration().filter(|d| d.is_finite() && *d > 0.0);
        Progress {
            position: (current * 4.0).round() / 4.0,
            duration,
            percent: duration.map(|d| ((current / d) * 100.0).floor().clamp(0.0, 100.0) as u32),
        }
    }

    /// Call `callback` on every state change of this unit.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    // === Operations ===

    pub fn load(&self) {
        self.submit(UnitCommand::Load);
    }

    pub fn play(&self) {
        self.submit(UnitCommand::Play { at: Instant::now(), show_loading: false });
    }

    pub fn pause(&self) {
        self.submit(UnitCommand::Pause);
    }

    /// Pause when playing, play otherwise.
    pub fn toggle(&self) {
        self.submit(UnitCommand::Toggle { at: Instant::now() });
    }

    pub fn unload(&self) {
        self.submit(UnitCommand::Unload);
    }

    /// Unload, swap the source list, and optionally play the new sources as
    /// soon as they are ready.
    pub fn replace_sources(&self, sources: Vec<SourceDescriptor>, play_immediately: bool) {
        let mut commands = vec![UnitCommand::ReplaceSources(sources)];
        if play_immediately {
            commands.push(UnitCommand::Play { at: Instant::now(), show_loading: true });
        }
        self.submit_all(commands);
    }

    /// Replace sources together with autoplay/preload/mute/loop settings.
    ///
    /// Plays immediately when autoplay is set and the viewport is at least
    /// the minimum autoplay width; preload is forced to `auto` in that case.
    pub fn replace_player(&self, request: ReplaceRequest) {
        let min_width = request
            .autoplay_min_width
            .unwrap_or_else(|| self.lock_core().config.autoplay_min_width);
        let play_immediately =
            request.autoplay != AutoplayMode::None && self.services.viewport.width() >= min_width;
        let sources = request.sources.clone();

        let mut commands = vec![
            UnitCommand::Configure(request),
            UnitCommand::ReplaceSources(sources),
        ];
        if play_immediately {
            commands.push(UnitCommand::Play { at: Instant::now(), show_loading: true });
        }
        self.submit_all(commands);
    }

    /// Pause, release, leave the pool. The unit ignores everything afterwards.
    pub fn teardown(&self) {
        self.submit(UnitCommand::Teardown);
    }

    /// Feed a host event.
    pub fn deliver(&self, signal: ResourceSignal) {
        self.submit(UnitCommand::Deliver(signal));
    }

    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Fire due timers as of `now`.
    pub fn tick_at(&self, now: Instant) {
        self.submit(UnitCommand::Tick(now));
    }

    pub fn alter_volume(&self, step: VolumeStep) {
        self.submit(UnitCommand::AlterVolume(step));
    }

    pub fn toggle_mute(&self) {
        self.submit(UnitCommand::ToggleMute);
    }

    /// Seek to `fraction` (0..=1) of the duration.
    pub fn scrub_to(&self, fraction: f64) {
        self.submit(UnitCommand::ScrubTo(fraction));
    }

    pub fn toggle_fullscreen(&self) {
        self.submit(UnitCommand::ToggleFullscreen);
    }

    /// Pointer moved over the player: show controls until idle.
    pub fn note_user_activity(&self) {
        self.submit(UnitCommand::UserActivity(Instant::now()));
    }

    // === Queue ===

    fn lock_core(&self) -> std::sync::MutexGuard<'_, UnitCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn submit(&self, command: UnitCommand) {
        self.submit_all(vec![command]);
    }

    fn submit_all(&self, commands: Vec<UnitCommand>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(commands);
        self.drain();
    }

    fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                trace!("{} busy, command queued", self.id);
                return;
            }
            loop {
                let next = self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                match next {
                    Some(command) => self.run(command),
                    None => break,
                }
            }
            self.draining.store(false, Ordering::Release);

            // A command may have slipped in between the last pop and the store
            if self.queue.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                return;
            }
        }
    }

    fn run(&self, command: UnitCommand) {
        trace!("{} <- {:?}", self.id, command);
        if let UnitCommand::Publish(notices) = command {
            self.publish(notices);
            return;
        }
        if self.needs_admission(&command) {
            if let Some(me) = self.me.upgrade() {
                self.services.pool.admit(&me);
            }
        }

        let width = self.services.viewport.width();
        let mut notices = Vec::new();
        {
            let mut core = self.lock_core();
            core.handle(command, width, &mut notices);
            core.refresh_visual(&mut notices);
        }
        self.publish(notices);
    }

    /// Whether `command` will attach a resource.
    fn needs_admission(&self, command: &UnitCommand) -> bool {
        let core = self.lock_core();
        if core.torn_down || core.machine.is_attached() {
            return false;
        }
        match command {
            UnitCommand::Load | UnitCommand::Play { .. } => true,
            UnitCommand::Toggle { .. } => core.machine.state() != PlaybackState::Playing,
            _ => false,
        }
    }

    fn publish(&self, notices: Vec<Notice>) {
        let bus = &self.services.bus;
        for notice in notices {
            match notice {
                Notice::State(change) => {
                    bus.emit(StateChangedEvent { unit: self.id, from: change.from, to: change.to });
                    let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    for callback in subscribers {
                        callback(&change);
                    }
                }
                Notice::Visual(state, flags) => {
                    self.services.sink.present(self.id, state, &flags);
                    bus.emit(VisualStateEvent { unit: self.id, state, flags });
                }
                Notice::Lifecycle(hook) => bus.emit(LifecycleEvent { unit: self.id, hook }),
                Notice::Error(error) => bus.emit(UnitErrorEvent { unit: self.id, error }),
                Notice::Fullscreen(on) => {
                    self.services.sink.set_fullscreen(self.id, on);
                    bus.emit(FullscreenRequestEvent { unit: self.id, on });
                }
                Notice::LeavePool => {
                    self.services.pool.remove(self.id);
                }
            }
        }
    }
}

impl Evictable for PlaybackUnit {
    fn unit_id(&self) -> UnitId {
        self.id
    }

    fn evict(&self) -> Result<(), UnitError> {
        let width = self.services.viewport.width();
        let mut notices = Vec::new();
        let result = {
            let mut core = self.lock_core();
            core.release_error = None;
            core.apply(Command::RequestUnload, width, &mut notices);
            core.refresh_visual(&mut notices);
            match core.release_error.take() {
                Some(err) => {
                    let error = UnitError::EvictionFailed { unit: self.id, reason: err.to_string() };
                    core.last_error = Some(error.clone());
                    Err(error)
                }
                None => Ok(()),
            }
        };
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_front(UnitCommand::Publish(notices));
        self.drain();
        result
    }
}

impl UnitCore {
    fn handle(&mut self, command: UnitCommand, width: u32, out: &mut Vec<Notice>) {
        if self.torn_down {
            trace!("{} torn down, ignoring {:?}", self.id, command);
            return;
        }
        match command {
            UnitCommand::Load => self.apply(Command::RequestLoad, width, out),
            UnitCommand::Play { at, show_loading } => self.user_play(at, show_loading, width, out),
            UnitCommand::Pause => self.apply(Command::UserPause, width, out),
            UnitCommand::Toggle { at } => {
                if self.machine.state() == PlaybackState::Playing {
                    self.apply(Command::UserPause, width, out);
                } else {
                    self.user_play(at, false, width, out);
                }
            }
            UnitCommand::Unload => self.apply(Command::RequestUnload, width, out),
            UnitCommand::ReplaceSources(sources) => {
                self.apply(Command::RequestUnload, width, out);
                debug!("{}: {} new source(s)", self.id, sources.len());
                self.sources = sources;
                self.fault = false;
            }
            UnitCommand::Configure(request) => self.configure(request, width),
            UnitCommand::Teardown => {
                if self.machine.state() == PlaybackState::Playing {
                    self.resource.pause();
                }
                self.apply(Command::RequestUnload, width, out);
                self.loading_timer.cancel();
                self.activity_timer.cancel();
                self.torn_down = true;
                out.push(Notice::LeavePool);
                debug!("{} torn down", self.id);
            }
            UnitCommand::Deliver(signal) => self.on_signal(signal, width, out),
            UnitCommand::Tick(now) => self.on_tick(now),
            UnitCommand::AlterVolume(step) => self.alter_volume(step),
            UnitCommand::ToggleMute => {
                let muted = !self.resource.muted();
                self.resource.set_muted(muted);
                self.sync_muted();
            }
            UnitCommand::ScrubTo(fraction) => {
                match self.resource.duration().filter(|d| d.is_finite()) {
                    Some(duration) if self.machine.is_attached() => {
                        self.resource.set_current_time(duration * fraction.clamp(0.0, 1.0));
                    }
                    _ => trace!("{}: nothing to scrub", self.id),
                }
            }
            UnitCommand::ToggleFullscreen => out.push(Notice::Fullscreen(!self.flags.fullscreen)),
            UnitCommand::UserActivity(now) => {
                self.flags.user_activity = true;
                self.activity_timer.schedule(now);
            }
            UnitCommand::Publish(notices) => out.extend(notices),
        }
    }

    fn user_play(&mut self, at: Instant, show_loading: bool, width: u32, out: &mut Vec<Notice>) {
        self.fault = false;
        self.flags.ended = false;
        if self.machine.is_attached() && self.attached_preload == Some(PreloadMode::Metadata) {
            self.resource.set_preload(PreloadMode::Auto);
            self.attached_preload = Some(PreloadMode::Auto);
        }

        self.apply(Command::UserPlay, width, out);

        if self.machine.state() == PlaybackState::Loading && self.machine.play_pending() {
            if show_loading {
                self.flags.loading = true;
            } else if !self.flags.loading {
                self.flags.preplay = true;
                self.loading_timer.schedule(at);
            }
        }
    }

    /// Apply a command to the machine, then carry out its effect.
    fn apply(&mut self, command: Command, width: u32, out: &mut Vec<Notice>) {
        let step = self.machine.apply(command);
        if let Some(change) = step.change {
            out.push(Notice::State(change));
        }
        if let Some(effect) = step.effect {
            self.execute(effect, width, out);
        }
    }

    fn execute(&mut self, effect: Effect, width: u32, out: &mut Vec<Notice>) {
        match effect {
            Effect::AttachResource => self.attach(width, out),
            Effect::StartPlayback => self.start_playback(width, out),
            Effect::PausePlayback => {
                self.resource.pause();
                out.push(Notice::Lifecycle(Hook::Pause));
            }
            Effect::ReleaseResource => self.release(out),
            Effect::ExitFullscreen => out.push(Notice::Fullscreen(false)),
        }
    }

    fn attach(&mut self, width: u32, out: &mut Vec<Notice>) {
        let eligible = self.machine.gate().eligible(width);
        let preload = match self.config.preload {
            PreloadMode::Metadata if !eligible && !self.machine.play_pending() => PreloadMode::Metadata,
            _ => PreloadMode::Auto,
        };
        let selected = select_sources(&self.sources, width, self.config.phone_max);
        self.epoch = self.epoch.next();

        self.flags.metadata_loaded = false;
        self.flags.can_play = false;
        self.flags.can_play_through = false;

        match self.resource.attach(&selected, preload, self.epoch) {
            Ok(()) => {
                debug!(
                    "{}: attached {} source(s) ({}, preload {})",
                    self.id,
                    selected.len(),
                    self.epoch,
                    preload.as_str()
                );
                self.attached_preload = Some(preload);
                if eligible && !self.machine.cycle_started() {
                    self.flags.loading = true;
                }
            }
            Err(err) => {
                warn!("{}: {}", self.id, err);
                self.fail(err.to_string(), out);
                self.apply(Command::RequestUnload, width, out);
            }
        }
    }

    fn start_playback(&mut self, width: u32, out: &mut Vec<Notice>) {
        match self.resource.play(self.epoch) {
            PlayRequest::Started => self.on_play_started(out),
            PlayRequest::Pending => trace!("{}: play pending", self.id),
            PlayRequest::Rejected { rejection, message } => {
                self.on_play_rejected(rejection, message, width, out)
            }
        }
    }

    fn on_play_started(&mut self, out: &mut Vec<Notice>) {
        self.flags.loading = false;
        self.flags.preplay = false;
        out.push(Notice::Lifecycle(Hook::Playing));
    }

    fn on_play_rejected(&mut self, rejection: PlayRejection, message: String, width: u32, out: &mut Vec<Notice>) {
        if self.machine.state() != PlaybackState::Playing {
            trace!("{}: stale play rejection ({:?})", self.id, rejection);
            return;
        }
        self.apply(Command::PlaybackRejected(rejection), width, out);
        match rejection {
            PlayRejection::Interrupted => trace!("{}: play interrupted by pause", self.id),
            PlayRejection::Blocked => {
                debug!("{}: play blocked by host, waiting for user gesture", self.id);
                self.flags.loading = false;
                self.flags.preplay = false;
                self.loading_timer.cancel();
                self.last_error = Some(UnitError::AttachBlocked { unit: self.id });
            }
            PlayRejection::Failed => {
                warn!("{}: play failed: {}", self.id, message);
                self.fail(message, out);
            }
        }
    }

    /// Flag the unit and surface an `AttachFailed`.
    fn fail(&mut self, reason: String, out: &mut Vec<Notice>) {
        let error = UnitError::AttachFailed { unit: self.id, reason };
        self.fault = true;
        self.last_error = Some(error.clone());
        out.push(Notice::Error(error));
        out.push(Notice::Lifecycle(Hook::Error));
    }

    fn release(&mut self, out: &mut Vec<Notice>) {
        if let Err(err) = self.resource.release() {
            warn!("{}: {}", self.id, err);
            self.release_error = Some(err);
        }
        self.epoch = self.epoch.next();
        self.attached_preload = None;
        self.flags.metadata_loaded = false;
        self.flags.can_play = false;
        self.flags.can_play_through = false;
        self.flags.preplay = false;
        self.flags.loading = false;
        self.loading_timer.cancel();
        out.push(Notice::LeavePool);
        debug!("{}: released ({})", self.id, self.epoch);
    }

    fn on_signal(&mut self, signal: ResourceSignal, width: u32, out: &mut Vec<Notice>) {
        let ResourceSignal { epoch, event } = signal;
        if event.is_load_scoped() && (epoch != self.epoch || !self.machine.is_attached()) {
            trace!("{}: stale {:?} ({}, current {})", self.id, event, epoch, self.epoch);
            return;
        }

        match event {
            ResourceEvent::LoadStart => {
                if self.machine.gate().eligible(width) && !self.machine.cycle_started() {
                    self.flags.loading = true;
                }
                out.push(Notice::Lifecycle(Hook::LoadStart));
            }
            ResourceEvent::LoadedMetadata => {
                self.flags.metadata_loaded = true;
                out.push(Notice::Lifecycle(Hook::LoadedMetadata));
            }
            ResourceEvent::Ready(readiness) => {
                match readiness {
                    Readiness::CanStart => {
                        self.flags.can_play = true;
                        out.push(Notice::Lifecycle(Hook::CanPlay));
                    }
                    Readiness::CanPlayThrough => {
                        self.flags.can_play_through = true;
                        out.push(Notice::Lifecycle(Hook::CanPlayThrough));
                    }
                }
                self.apply(Command::ResourceReady { readiness, viewport_width: width }, width, out);
            }
            ResourceEvent::PlayResolved => {
                if self.machine.state() == PlaybackState::Playing {
                    self.on_play_started(out);
                } else {
                    trace!("{}: play resolved after leaving playing", self.id);
                }
            }
            ResourceEvent::PlayRejected { rejection, message } => {
                self.on_play_rejected(rejection, message, width, out)
            }
            ResourceEvent::Ended => {
                self.apply(Command::ResourceEnded, width, out);
                if self.machine.state() == PlaybackState::Ended {
                    out.push(Notice::Lifecycle(Hook::Ended));
                }
            }
            ResourceEvent::VolumeChanged { volume, muted } => {
                self.flags.muted = muted || volume <= 0.0;
                out.push(Notice::Lifecycle(Hook::VolumeChange));
            }
            ResourceEvent::TimeUpdate => out.push(Notice::Lifecycle(Hook::TimeUpdate)),
            ResourceEvent::Error(message) => {
                warn!("{}: resource error: {}", self.id, message);
                self.fail(message, out);
                self.apply(Command::RequestUnload, width, out);
            }
            ResourceEvent::FullscreenChanged(on) => {
                self.flags.fullscreen = on;
                out.push(Notice::Lifecycle(Hook::FullscreenChange));
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.loading_timer.fire_at(now) && self.machine.state() == PlaybackState::Loading {
            debug!("{}: still waiting for data, showing loading", self.id);
            self.flags.preplay = false;
            self.flags.loading = true;
        }
        if self.activity_timer.fire_at(now) {
            self.flags.user_activity = false;
        }
    }

    fn configure(&mut self, request: ReplaceRequest, width: u32) {
        self.config.autoplay = request.autoplay;
        if let Some(min_width) = request.autoplay_min_width {
            self.config.autoplay_min_width = min_width;
        }
        self.config.muted = request.muted;
        self.config.looping = request.looping;
        self.config.custom_controls = request.custom_controls;

        let gate = self.config.gate();
        self.config.preload = if request.autoplay != AutoplayMode::None && width >= gate.min_viewport_width {
            PreloadMode::Auto
        } else {
            request.preload
        };
        self.machine.set_gate(gate);

        self.resource.set_preload(self.config.preload);
        self.resource.set_muted(request.muted);
        self.resource.set_looping(request.looping);
        self.flags.custom_controls = request.custom_controls;
        self.sync_muted();
    }

    fn alter_volume(&mut self, step: VolumeStep) {
        // Step from the value floored to one decimal so repeated steps land on
        // tenths
        let tenths = (self.resource.volume() * 10.0).floor();
        let target = match step {
            VolumeStep::Up if tenths < 10.0 => Some((tenths + 1.0) / 10.0),
            VolumeStep::Down if tenths > 0.0 => Some((tenths - 1.0) / 10.0),
            _ => None,
        };
        if let Some(volume) = target {
            self.resource.set_volume(volume.clamp(0.0, 1.0));
        }
        self.resource.set_muted(false);
        self.sync_muted();
    }

    fn sync_muted(&mut self) {
        self.flags.muted = self.resource.muted() || self.resource.volume() <= 0.0;
    }

    /// Derive state flags and queue a visual notice if anything changed.
    fn refresh_visual(&mut self, out: &mut Vec<Notice>) {
        let state = self.machine.state();
        if state != PlaybackState::Loading {
            self.flags.preplay = false;
            self.flags.loading = false;
            self.loading_timer.cancel();
        }
        self.flags.playing = state == PlaybackState::Playing;
        self.flags.paused = state == PlaybackState::Paused;
        self.flags.ended = state == PlaybackState::Ended;
        self.flags.error = self.fault;

        if self.presented != Some((state, self.flags)) {
            self.presented = Some((state, self.flags));
            out.push(Notice::Visual(state, self.flags));
        }
    }
}
