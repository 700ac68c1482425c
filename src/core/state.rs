//! Playback lifecycle of a single unit.
//!
//! **Why**: every playback unit needs one authoritative answer to "what is
//! it doing now", independent of how the host reports media events.
//!
//! # Lifecycle
//!
//! ```text
//! Initial --load--> Loading --ready/play--> Playing <--pause/play--> Paused
//!                                              |
//!                                            ended --> Ended --play--> Playing
//! any --unload--> Initial
//! ```
//!
//! The machine is pure bookkeeping: it never touches the resource. Each
//! applied command yields at most one [`Effect`] which the owning unit
//! executes against its host resource.
//!
//! # Load cycle
//!
//! A cycle starts on `RequestLoad` from `Initial` and ends on
//! `RequestUnload`. Once a cycle reached Playing or Paused, readiness events
//! can no longer autoplay it: a manual pause racing with a late readiness
//! event must win.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::autoplay::AutoplayGate;

/// Discrete playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Initial,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Initial => "initial",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffer level announced by a readiness event. Ordered: play-through
/// implies can-start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Readiness {
    CanStart,
    CanPlayThrough,
}

/// Why the host refused a play request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Autoplay policy: needs a user gesture. Silent, retried on next play().
    Blocked,
    /// play() was interrupted by a pause(). Not an error at all.
    Interrupted,
    /// Anything else. Flags the unit, never auto-retried.
    Failed,
}

/// State-changing input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RequestLoad,
    ResourceReady { readiness: Readiness, viewport_width: u32 },
    UserPlay,
    UserPause,
    ResourceEnded,
    RequestUnload,
    PlaybackRejected(PlayRejection),
}

/// Side effect the owner must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    AttachResource,
    StartPlayback,
    PausePlayback,
    ReleaseResource,
    ExitFullscreen,
}

/// Reported to observers on every actual state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// Result of applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub state: PlaybackState,
    pub change: Option<StateChange>,
    pub effect: Option<Effect>,
}

type StateObserver = Box<dyn Fn(&StateChange) + Send + Sync>;

/// Explicit playback state machine with observer hook.
pub struct PlaybackStateMachine {
    state: PlaybackState,
    gate: AutoplayGate,
    /// Resource currently attached (AttachResource issued, no release since)
    attached: bool,
    /// Best readiness seen in this cycle
    readiness: Option<Readiness>,
    /// Reached Playing or Paused in this cycle
    cycle_started: bool,
    /// User asked to play before the resource was ready
    play_pending: bool,
    /// Where an optimistic Playing returns to if the host rejects play()
    resume_to: PlaybackState,
    errored: bool,
    observers: Vec<StateObserver>,
}

impl fmt::Debug for PlaybackStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackStateMachine")
            .field("state", &self.state)
            .field("attached", &self.attached)
            .field("readiness", &self.readiness)
            .field("cycle_started", &self.cycle_started)
            .field("play_pending", &self.play_pending)
            .field("errored", &self.errored)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl PlaybackStateMachine {
    pub fn new(gate: AutoplayGate) -> Self {
        Self {
            state: PlaybackState::Initial,
            gate,
            attached: false,
            readiness: None,
            cycle_started: false,
            play_pending: false,
            resume_to: PlaybackState::Initial,
            errored: false,
            observers: Vec::new(),
        }
    }

    // === Queries ===

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn gate(&self) -> AutoplayGate {
        self.gate
    }

    pub fn set_gate(&mut self, gate: AutoplayGate) {
        self.gate = gate;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn readiness(&self) -> Option<Readiness> {
        self.readiness
    }

    pub fn cycle_started(&self) -> bool {
        self.cycle_started
    }

    pub fn play_pending(&self) -> bool {
        self.play_pending
    }

    pub fn errored(&self) -> bool {
        self.errored
    }

    /// Register an observer called with every state change.
    pub fn observe<F>(&mut self, observer: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    // === Transitions ===

    /// Apply `command`, returning the resulting state.
    pub fn transition(&mut self, command: Command) -> PlaybackState {
        self.apply(command).state
    }

    /// Apply `command`, returning the state, the change (if any) and the
    /// effect the owner must execute.
    pub fn apply(&mut self, command: Command) -> Step {
        let from = self.state;
        let effect = match command {
            Command::RequestLoad => self.on_request_load(),
            Command::ResourceReady { readiness, viewport_width } => {
                self.on_ready(readiness, viewport_width)
            }
            Command::UserPlay => self.on_user_play(),
            Command::UserPause => self.on_user_pause(),
            Command::ResourceEnded => self.on_ended(),
            Command::RequestUnload => self.on_unload(),
            Command::PlaybackRejected(rejection) => self.on_rejected(rejection),
        };

        let change = (from != self.state).then_some(StateChange { from, to: self.state });
        match change {
            Some(change) => {
                debug!("{:?}: {} -> {}", command, change.from, change.to);
                for observer in &self.observers {
                    observer(&change);
                }
            }
            None => trace!("{:?}: no state change ({})", command, self.state),
        }

        Step { state: self.state, change, effect }
    }

    fn enter(&mut self, state: PlaybackState) {
        if matches!(state, PlaybackState::Playing | PlaybackState::Paused) {
            self.cycle_started = true;
        }
        self.state = state;
    }

    fn start_playback(&mut self) -> Option<Effect> {
        self.resume_to = self.state;
        self.play_pending = false;
        self.enter(PlaybackState::Playing);
        Some(Effect::StartPlayback)
    }

    fn on_request_load(&mut self) -> Option<Effect> {
        if self.attached {
            return None;
        }
        self.attached = true;
        if self.state == PlaybackState::Initial {
            self.readiness = None;
            self.cycle_started = false;
            self.errored = false;
            self.enter(PlaybackState::Loading);
        }
        Some(Effect::AttachResource)
    }

    fn on_ready(&mut self, readiness: Readiness, viewport_width: u32) -> Option<Effect> {
        if !self.attached {
            trace!("Readiness {:?} without attached resource, ignored", readiness);
            return None;
        }
        self.readiness = Some(self.readiness.map_or(readiness, |r| r.max(readiness)));

        if self.state != PlaybackState::Loading {
            return None;
        }
        if self.play_pending {
            return self.start_playback();
        }
        if !self.errored && self.gate.allows(readiness, viewport_width, self.cycle_started) {
            return self.start_playback();
        }
        None
    }

    fn on_user_play(&mut self) -> Option<Effect> {
        self.errored = false;
        match self.state {
            PlaybackState::Playing => None,
            PlaybackState::Initial => {
                self.play_pending = true;
                self.on_request_load()
            }
            PlaybackState::Paused if !self.attached => {
                self.play_pending = true;
                self.attached = true;
                self.enter(PlaybackState::Loading);
                Some(Effect::AttachResource)
            }
            PlaybackState::Loading | PlaybackState::Paused if self.readiness.is_none() => {
                self.play_pending = true;
                self.enter(PlaybackState::Loading);
                None
            }
            PlaybackState::Loading | PlaybackState::Paused | PlaybackState::Ended => {
                self.start_playback()
            }
        }
    }

    fn on_user_pause(&mut self) -> Option<Effect> {
        self.play_pending = false;
        match self.state {
            PlaybackState::Ended | PlaybackState::Paused => None,
            _ => {
                self.enter(PlaybackState::Paused);
                self.attached.then_some(Effect::PausePlayback)
            }
        }
    }

    fn on_ended(&mut self) -> Option<Effect> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.enter(PlaybackState::Ended);
        Some(Effect::ExitFullscreen)
    }

    fn on_unload(&mut self) -> Option<Effect> {
        let was_attached = self.attached;
        self.attached = false;
        self.readiness = None;
        self.cycle_started = false;
        self.play_pending = false;
        self.errored = false;
        self.resume_to = PlaybackState::Initial;
        self.state = PlaybackState::Initial;
        was_attached.then_some(Effect::ReleaseResource)
    }

    fn on_rejected(&mut self, rejection: PlayRejection) -> Option<Effect> {
        if self.state != PlaybackState::Playing {
            trace!("Stale play rejection {:?} in {}", rejection, self.state);
            return None;
        }
        match rejection {
            PlayRejection::Interrupted => {}
            PlayRejection::Blocked => {
                self.state = self.resume_to;
            }
            PlayRejection::Failed => {
                self.state = self.resume_to;
                self.errored = true;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::autoplay::AutoplayMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn machine(mode: AutoplayMode, min_width: u32) -> PlaybackStateMachine {
        PlaybackStateMachine::new(AutoplayGate::new(mode, min_width))
    }

    fn ready(readiness: Readiness, width: u32) -> Command {
        Command::ResourceReady { readiness, viewport_width: width }
    }

    #[test]
    fn test_initial_is_entry_state() {
        let m = machine(AutoplayMode::None, 0);
        assert_eq!(m.state(), PlaybackState::Initial);
        assert!(!m.is_attached());
    }

    #[test]
    fn test_load_attaches_once() {
        let mut m = machine(AutoplayMode::None, 0);
        let step = m.apply(Command::RequestLoad);
        assert_eq!(step.state, PlaybackState::Loading);
        assert_eq!(step.effect, Some(Effect::AttachResource));

        let again = m.apply(Command::RequestLoad);
        assert_eq!(again.effect, None);
        assert_eq!(again.change, None);
    }

    #[test]
    fn test_readiness_without_autoplay_stays_loading() {
        let mut m = machine(AutoplayMode::None, 0);
        m.transition(Command::RequestLoad);
        assert_eq!(m.transition(ready(Readiness::CanPlayThrough, 1024)), PlaybackState::Loading);
        assert_eq!(m.readiness(), Some(Readiness::CanPlayThrough));
    }

    #[test]
    fn test_autoplay_immediate() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        let step = m.apply(ready(Readiness::CanStart, 500));
        assert_eq!(step.state, PlaybackState::Playing);
        assert_eq!(step.effect, Some(Effect::StartPlayback));
    }

    #[test]
    fn test_autoplay_full_buffer() {
        let mut m = machine(AutoplayMode::OnFullBuffer, 700);
        m.transition(Command::RequestLoad);
        assert_eq!(m.transition(ready(Readiness::CanStart, 800)), PlaybackState::Loading);
        assert_eq!(m.transition(ready(Readiness::CanPlayThrough, 800)), PlaybackState::Playing);
    }

    #[test]
    fn test_pause_from_every_non_ended_state() {
        for setup in [
            vec![],
            vec![Command::RequestLoad],
            vec![Command::RequestLoad, Command::UserPlay, ready(Readiness::CanStart, 0)],
        ] {
            let mut m = machine(AutoplayMode::None, 0);
            for cmd in setup {
                m.transition(cmd);
            }
            assert_eq!(m.transition(Command::UserPause), PlaybackState::Paused);
        }
    }

    #[test]
    fn test_pause_ignored_when_ended() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        let step = m.apply(Command::ResourceEnded);
        assert_eq!(step.state, PlaybackState::Ended);
        assert_eq!(step.effect, Some(Effect::ExitFullscreen));
        assert_eq!(m.transition(Command::UserPause), PlaybackState::Ended);
    }

    #[test]
    fn test_stale_readiness_after_pause() {
        let mut m = machine(AutoplayMode::OnFullBuffer, 0);
        m.transition(Command::RequestLoad);
        m.transition(Command::UserPause);
        assert_eq!(m.transition(ready(Readiness::CanPlayThrough, 1920)), PlaybackState::Paused);
        assert!(m.cycle_started());
    }

    #[test]
    fn test_user_play_when_playing_is_silent() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        let changes = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&changes);
        m.observe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        let seen = changes.load(Ordering::SeqCst);

        let step = m.apply(Command::UserPlay);
        assert_eq!(step.change, None);
        assert_eq!(step.effect, None);
        assert_eq!(changes.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_user_play_from_initial_waits_for_readiness() {
        let mut m = machine(AutoplayMode::None, 0);
        let step = m.apply(Command::UserPlay);
        assert_eq!(step.state, PlaybackState::Loading);
        assert_eq!(step.effect, Some(Effect::AttachResource));
        assert!(m.play_pending());

        // Pending user play ignores the (absent) autoplay mode
        let step = m.apply(ready(Readiness::CanStart, 0));
        assert_eq!(step.state, PlaybackState::Playing);
        assert_eq!(step.effect, Some(Effect::StartPlayback));
        assert!(!m.play_pending());
    }

    #[test]
    fn test_pause_cancels_pending_play() {
        let mut m = machine(AutoplayMode::None, 0);
        m.transition(Command::UserPlay);
        m.transition(Command::UserPause);
        assert!(!m.play_pending());
        assert_eq!(m.transition(ready(Readiness::CanStart, 0)), PlaybackState::Paused);
    }

    #[test]
    fn test_play_from_unattached_pause_attaches() {
        let mut m = machine(AutoplayMode::None, 0);
        m.transition(Command::UserPause);
        let step = m.apply(Command::UserPlay);
        assert_eq!(step.state, PlaybackState::Loading);
        assert_eq!(step.effect, Some(Effect::AttachResource));
        assert!(m.is_attached());
    }

    #[test]
    fn test_unload_returns_to_initial() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        let step = m.apply(Command::RequestUnload);
        assert_eq!(step.state, PlaybackState::Initial);
        assert_eq!(step.effect, Some(Effect::ReleaseResource));
        assert!(!m.is_attached());
        assert!(!m.cycle_started());

        // Nothing to release twice
        assert_eq!(m.apply(Command::RequestUnload).effect, None);
    }

    #[test]
    fn test_unload_while_loading_drops_late_readiness() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(Command::RequestUnload);
        assert_eq!(m.transition(ready(Readiness::CanPlayThrough, 0)), PlaybackState::Initial);
    }

    #[test]
    fn test_ended_replays_on_user_play() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        m.transition(Command::ResourceEnded);
        let step = m.apply(Command::UserPlay);
        assert_eq!(step.state, PlaybackState::Playing);
        assert_eq!(step.effect, Some(Effect::StartPlayback));
    }

    #[test]
    fn test_blocked_rejection_reverts_silently() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        let state = m.transition(Command::PlaybackRejected(PlayRejection::Blocked));
        assert_eq!(state, PlaybackState::Loading);
        assert!(!m.errored());

        // No further autoplay in this cycle, but the user can still play
        assert_eq!(m.transition(ready(Readiness::CanPlayThrough, 0)), PlaybackState::Loading);
        assert_eq!(m.transition(Command::UserPlay), PlaybackState::Playing);
    }

    #[test]
    fn test_failed_rejection_flags_error() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        m.transition(Command::UserPause);
        m.transition(Command::UserPlay);
        let state = m.transition(Command::PlaybackRejected(PlayRejection::Failed));
        assert_eq!(state, PlaybackState::Paused);
        assert!(m.errored());
    }

    #[test]
    fn test_interrupted_and_stale_rejections_ignored() {
        let mut m = machine(AutoplayMode::Immediate, 0);
        m.transition(Command::RequestLoad);
        m.transition(ready(Readiness::CanStart, 0));
        assert_eq!(
            m.transition(Command::PlaybackRejected(PlayRejection::Interrupted)),
            PlaybackState::Playing
        );

        m.transition(Command::UserPause);
        assert_eq!(
            m.transition(Command::PlaybackRejected(PlayRejection::Failed)),
            PlaybackState::Paused
        );
        assert!(!m.errored());
    }

    #[test]
    fn test_observer_sees_old_and_new() {
        let mut m = machine(AutoplayMode::None, 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        m.observe(move |change| s.lock().unwrap().push(*change));

        m.transition(Command::RequestLoad);
        m.transition(Command::UserPause);
        m.transition(Command::RequestUnload);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                StateChange { from: PlaybackState::Initial, to: PlaybackState::Loading },
                StateChange { from: PlaybackState::Loading, to: PlaybackState::Paused },
                StateChange { from: PlaybackState::Paused, to: PlaybackState::Initial },
            ]
        );
    }
}
