//! Headless host: simulated media elements, viewport and visual sink.
//!
//! Drives playback units without a browser. Each [`SimulatedResource`] logs
//! every call into a [`SimLog`] and posts its asynchronous events (load
//! start, deferred play completions, readiness pushed by a
//! [`SimController`]) onto a crossbeam channel. A [`SignalRouter`] drains
//! those channels into the owning units, the way a host event loop would.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::config::StyleConfig;
use crate::core::error::HostError;
use crate::core::host::{
    PlayRequest, PreloadMode, ResourceEvent, ResourceHandle, ResourceSignal, ViewportQuery, VisualFlags,
    VisualSink,
};
use crate::core::ids::{LoadEpoch, UnitId};
use crate::core::sources::SelectedSource;
use crate::core::state::{PlayRejection, PlaybackState, Readiness};
use crate::core::unit::PlaybackUnit;

/// Duration reported once metadata is loaded (seconds).
pub const SIM_DURATION: f64 = 30.0;

/// Upper bound of pump rounds in `SignalRouter::settle`.
const MAX_SETTLE_ROUNDS: usize = 64;

/// How a simulated element answers play().
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayBehavior {
    /// Starts synchronously.
    #[default]
    Immediate,
    /// Resolves later through a `PlayResolved` signal.
    Deferred,
    /// Autoplay policy refuses every play().
    Blocked,
    /// play() rejects later with a genuine failure.
    Failing,
}

impl std::str::FromStr for PlayBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(PlayBehavior::Immediate),
            "deferred" => Ok(PlayBehavior::Deferred),
            "blocked" => Ok(PlayBehavior::Blocked),
            "failing" => Ok(PlayBehavior::Failing),
            other => Err(format!("unknown play behavior '{}'", other)),
        }
    }
}

/// One recorded call on a simulated element.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Attach { urls: Vec<String>, preload: PreloadMode, epoch: LoadEpoch },
    Release,
    Play(LoadEpoch),
    Pause,
    SetVolume(f64),
    SetMuted(bool),
    Seek(f64),
    SetLooping(bool),
    SetPreload(PreloadMode),
}

/// Shared call log.
#[derive(Debug, Clone, Default)]
pub struct SimLog {
    calls: Arc<Mutex<Vec<SimCall>>>,
}

impl SimLog {
    fn push(&self, call: SimCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, pred: impl Fn(&SimCall) -> bool) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).iter().filter(|c| pred(*c)).count()
    }

    /// URL lists of every attach, in order.
    pub fn attached_urls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|c| match c {
                SimCall::Attach { urls, .. } => Some(urls.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> usize {
        self.count(|c| matches!(c, SimCall::Release))
    }

    pub fn plays(&self) -> usize {
        self.count(|c| matches!(c, SimCall::Play(_)))
    }
}

#[derive(Debug, Default)]
struct SimState {
    /// Epoch of the current attachment.
    epoch: Option<LoadEpoch>,
    current_time: f64,
    duration: Option<f64>,
    volume: f64,
    muted: bool,
}

/// Simulated media element.
pub struct SimulatedResource {
    behavior: PlayBehavior,
    state: Arc<Mutex<SimState>>,
    log: SimLog,
    outbox: Sender<ResourceSignal>,
    fail_attach: bool,
    fail_release: bool,
}

impl SimulatedResource {
    /// Element plus the controller and log that observe it.
    pub fn new(behavior: PlayBehavior) -> (Self, SimController) {
        let (tx, rx) = unbounded();
        let state = Arc::new(Mutex::new(SimState { volume: 1.0, ..Default::default() }));
        let log = SimLog::default();
        let resource = Self {
            behavior,
            state: Arc::clone(&state),
            log: log.clone(),
            outbox: tx.clone(),
            fail_attach: false,
            fail_release: false,
        };
        let controller = SimController { state, log, outbox: tx, inbox: rx };
        (resource, controller)
    }

    /// Every attach fails.
    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    /// Every release fails (the element is still detached).
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, epoch: LoadEpoch, event: ResourceEvent) {
        if self.outbox.send(ResourceSignal::new(epoch, event)).is_err() {
            trace!("Sim outbox closed, signal dropped");
        }
    }

    fn post_volume(&self) {
        let (volume, muted, epoch) = {
            let s = self.lock();
            (s.volume, s.muted, s.epoch.unwrap_or_default())
        };
        self.post(epoch, ResourceEvent::VolumeChanged { volume, muted });
    }
}

impl ResourceHandle for SimulatedResource {
    fn attach(
        &mut self,
        sources: &[SelectedSource],
        preload: PreloadMode,
        epoch: LoadEpoch,
    ) -> Result<(), HostError> {
        let urls: Vec<String> = sources.iter().map(|s| s.url.clone()).collect();
        self.log.push(SimCall::Attach { urls: urls.clone(), preload, epoch });
        if self.fail_attach {
            return Err(HostError::Attach(format!("no playable source in {:?}", urls)));
        }
        if urls.is_empty() {
            return Err(HostError::Attach("no sources".into()));
        }
        {
            let mut s = self.lock();
            s.epoch = Some(epoch);
            s.current_time = 0.0;
            s.duration = None;
        }
        self.post(epoch, ResourceEvent::LoadStart);
        if preload != PreloadMode::None {
            self.lock().duration = Some(SIM_DURATION);
            self.post(epoch, ResourceEvent::LoadedMetadata);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), HostError> {
        self.log.push(SimCall::Release);
        {
            let mut s = self.lock();
            s.epoch = None;
            s.duration = None;
            s.current_time = 0.0;
        }
        if self.fail_release {
            return Err(HostError::Release("element still referenced".into()));
        }
        Ok(())
    }

    fn play(&mut self, epoch: LoadEpoch) -> PlayRequest {
        self.log.push(SimCall::Play(epoch));
        match self.behavior {
            PlayBehavior::Immediate => PlayRequest::Started,
            PlayBehavior::Deferred => {
                self.post(epoch, ResourceEvent::PlayResolved);
                PlayRequest::Pending
            }
            PlayBehavior::Blocked => PlayRequest::Rejected {
                rejection: PlayRejection::Blocked,
                message: "play() requires a user gesture".into(),
            },
            PlayBehavior::Failing => {
                self.post(
                    epoch,
                    ResourceEvent::PlayRejected {
                        rejection: PlayRejection::Failed,
                        message: "media decode error".into(),
                    },
                );
                PlayRequest::Pending
            }
        }
    }

    fn pause(&mut self) {
        self.log.push(SimCall::Pause);
    }

    fn volume(&self) -> f64 {
        self.lock().volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.log.push(SimCall::SetVolume(volume));
        self.lock().volume = volume;
        self.post_volume();
    }

    fn muted(&self) -> bool {
        self.lock().muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.push(SimCall::SetMuted(muted));
        let changed = {
            let mut s = self.lock();
            std::mem::replace(&mut s.muted, muted) != muted
        };
        if changed {
            self.post_volume();
        }
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.log.push(SimCall::Seek(seconds));
        let epoch = {
            let mut s = self.lock();
            s.current_time = seconds;
            s.epoch
        };
        if let Some(epoch) = epoch {
            self.post(epoch, ResourceEvent::TimeUpdate);
        }
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn set_looping(&mut self, looping: bool) {
        self.log.push(SimCall::SetLooping(looping));
    }

    fn set_preload(&mut self, preload: PreloadMode) {
        self.log.push(SimCall::SetPreload(preload));
    }
}

/// Test/driver side of a simulated element: pushes host events.
#[derive(Clone)]
pub struct SimController {
    state: Arc<Mutex<SimState>>,
    log: SimLog,
    outbox: Sender<ResourceSignal>,
    inbox: Receiver<ResourceSignal>,
}

impl SimController {
    pub fn log(&self) -> &SimLog {
        &self.log
    }

    /// Receiving end for a `SignalRouter`.
    pub fn signals(&self) -> Receiver<ResourceSignal> {
        self.inbox.clone()
    }

    /// Epoch of the current attachment, if any.
    pub fn epoch(&self) -> Option<LoadEpoch> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).epoch
    }

    /// Post `event` for the current attachment. Returns false when nothing
    /// is attached.
    pub fn emit(&self, event: ResourceEvent) -> bool {
        match self.epoch() {
            Some(epoch) => {
                self.emit_at(epoch, event);
                true
            }
            None => {
                trace!("Sim: {:?} with nothing attached, dropped", event);
                false
            }
        }
    }

    /// Post `event` tagged with an explicit (possibly stale) epoch.
    pub fn emit_at(&self, epoch: LoadEpoch, event: ResourceEvent) {
        if self.outbox.send(ResourceSignal::new(epoch, event)).is_err() {
            trace!("Sim outbox closed, signal dropped");
        }
    }

    pub fn ready(&self, readiness: Readiness) -> bool {
        self.emit(ResourceEvent::Ready(readiness))
    }

    /// Play to the end.
    pub fn finish(&self) -> bool {
        {
            let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(duration) = s.duration {
                s.current_time = duration;
            }
        }
        self.emit(ResourceEvent::Ended)
    }

    pub fn advance(&self, seconds: f64) -> bool {
        {
            let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let end = s.duration.unwrap_or(f64::INFINITY);
            s.current_time = (s.current_time + seconds).min(end);
        }
        self.emit(ResourceEvent::TimeUpdate)
    }

    pub fn fail(&self, message: &str) -> bool {
        self.emit(ResourceEvent::Error(message.to_string()))
    }

    pub fn fullscreen_changed(&self, on: bool) -> bool {
        self.emit(ResourceEvent::FullscreenChanged(on))
    }
}

/// Viewport with a settable width.
#[derive(Debug)]
pub struct FixedViewport {
    width: AtomicU32,
}

impl FixedViewport {
    pub fn new(width: u32) -> Self {
        Self { width: AtomicU32::new(width) }
    }

    pub fn set_width(&self, width: u32) {
        debug!("Viewport width -> {}", width);
        self.width.store(width, Ordering::Relaxed);
    }
}

impl ViewportQuery for FixedViewport {
    fn width(&self) -> u32 {
        self.width.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub unit: UnitId,
    pub state: PlaybackState,
    pub flags: VisualFlags,
}

/// Sink that remembers everything it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingSink {
    presented: Mutex<Vec<Presented>>,
    fullscreen: Mutex<Vec<(UnitId, bool)>>,
    styles: Mutex<Vec<(UnitId, StyleConfig)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, unit: UnitId) -> Vec<Presented> {
        self.presented
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| p.unit == unit)
            .cloned()
            .collect()
    }

    pub fn last(&self, unit: UnitId) -> Option<Presented> {
        self.history(unit).pop()
    }

    pub fn fullscreen_requests(&self) -> Vec<(UnitId, bool)> {
        self.fullscreen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Style last applied to `unit`.
    pub fn style(&self, unit: UnitId) -> Option<StyleConfig> {
        self.styles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(id, _)| *id == unit)
            .map(|(_, style)| style.clone())
    }
}

impl VisualSink for RecordingSink {
    fn present(&self, unit: UnitId, state: PlaybackState, flags: &VisualFlags) {
        trace!("{} presents {} [{}]", unit, state, flags.class_names().join(" "));
        self.presented
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Presented { unit, state, flags: *flags });
    }

    fn set_fullscreen(&self, unit: UnitId, on: bool) {
        self.fullscreen.lock().unwrap_or_else(|e| e.into_inner()).push((unit, on));
    }

    fn apply_style(&self, unit: UnitId, style: &StyleConfig) {
        self.styles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((unit, style.clone()));
    }
}

/// Routes queued host signals to their units.
#[derive(Default)]
pub struct SignalRouter {
    routes: Vec<(Weak<PlaybackUnit>, Receiver<ResourceSignal>)>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, unit: &Arc<PlaybackUnit>, signals: Receiver<ResourceSignal>) {
        self.routes.push((Arc::downgrade(unit), signals));
    }

    /// Deliver everything queued right now. Returns the number of signals
    /// delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        self.routes.retain(|(unit, signals)| {
            let Some(unit) = unit.upgrade() else {
                return false;
            };
            let pending: Vec<ResourceSignal> = signals.try_iter().collect();
            delivered += pending.len();
            for signal in pending {
                unit.deliver(signal);
            }
            true
        });
        delivered
    }

    /// Pump until no unit produces further signals.
    pub fn settle(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let delivered = self.pump();
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
        warn!("SignalRouter: still busy after {} rounds", MAX_SETTLE_ROUNDS);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> SelectedSource {
        SelectedSource { url: url.into(), media_type: Some("video/mp4".into()), is_alternate: false }
    }

    #[test]
    fn test_attach_posts_load_events() {
        let (mut resource, controller) = SimulatedResource::new(PlayBehavior::Immediate);
        let epoch = LoadEpoch::default().next();
        resource.attach(&[source("a.mp4")], PreloadMode::Metadata, epoch).unwrap();

        let events: Vec<ResourceEvent> = controller.signals().try_iter().map(|s| s.event).collect();
        assert_eq!(events, [ResourceEvent::LoadStart, ResourceEvent::LoadedMetadata]);
        assert_eq!(controller.epoch(), Some(epoch));
        assert_eq!(resource.duration(), Some(SIM_DURATION));
    }

    #[test]
    fn test_release_detaches() {
        let (mut resource, controller) = SimulatedResource::new(PlayBehavior::Immediate);
        resource.attach(&[source("a.mp4")], PreloadMode::None, LoadEpoch::default()).unwrap();
        resource.release().unwrap();
        assert_eq!(controller.epoch(), None);
        assert!(!controller.ready(Readiness::CanStart));
        assert_eq!(controller.log().releases(), 1);
    }

    #[test]
    fn test_play_behaviors() {
        let epoch = LoadEpoch::default();
        let (mut deferred, controller) = SimulatedResource::new(PlayBehavior::Deferred);
        assert_eq!(deferred.play(epoch), PlayRequest::Pending);
        assert_eq!(
            controller.signals().try_recv().map(|s| s.event),
            Ok(ResourceEvent::PlayResolved)
        );

        let (mut blocked, _) = SimulatedResource::new(PlayBehavior::Blocked);
        assert!(matches!(
            blocked.play(epoch),
            PlayRequest::Rejected { rejection: PlayRejection::Blocked, .. }
        ));
    }

    #[test]
    fn test_failing_hooks() {
        let (resource, _) = SimulatedResource::new(PlayBehavior::Immediate);
        let mut resource = resource.failing_attach().failing_release();
        assert!(resource.attach(&[source("a.mp4")], PreloadMode::Auto, LoadEpoch::default()).is_err());
        assert!(resource.release().is_err());
    }

    #[test]
    fn test_parse_behavior() {
        assert_eq!("Deferred".parse::<PlayBehavior>(), Ok(PlayBehavior::Deferred));
        assert!("later".parse::<PlayBehavior>().is_err());
    }
}
