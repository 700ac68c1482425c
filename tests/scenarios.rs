//! End-to-end playback scenarios against the simulated host.

use std::sync::{Arc, Mutex};

use vidgate::core::events::{Hook, LifecycleEvent, StateChangedEvent, UnitErrorEvent, UnitEvictedEvent};
use vidgate::config::StyleConfig;
use vidgate::core::pool::MAX_LOADED;
use vidgate::sim::{FixedViewport, PlayBehavior, RecordingSink, SignalRouter, SimController, SimulatedResource};
use vidgate::{
    AutoplayMode, EventBus, LoadedResourcePool, PlaybackState, PlaybackUnit, PoolLimits, Readiness,
    ResourceEvent, SourceDescriptor, UnitConfig, UnitError, UnitId, UnitServices, downcast_event,
};

struct Harness {
    bus: EventBus,
    pool: Arc<LoadedResourcePool>,
    viewport: Arc<FixedViewport>,
    sink: Arc<RecordingSink>,
    router: SignalRouter,
}

impl Harness {
    fn new(width: u32) -> Self {
        Self::with_limits(width, PoolLimits::default())
    }

    fn with_limits(width: u32, limits: PoolLimits) -> Self {
        let bus = EventBus::new();
        Self {
            pool: Arc::new(LoadedResourcePool::with_limits(limits).with_emitter(bus.emitter())),
            bus,
            viewport: Arc::new(FixedViewport::new(width)),
            sink: Arc::new(RecordingSink::new()),
            router: SignalRouter::new(),
        }
    }

    fn services(&self) -> UnitServices {
        UnitServices {
            pool: Arc::clone(&self.pool),
            bus: self.bus.clone(),
            viewport: self.viewport.clone(),
            sink: self.sink.clone(),
        }
    }

    fn spawn_with(
        &mut self,
        config: UnitConfig,
        resource: SimulatedResource,
        controller: SimController,
        name: &str,
    ) -> (Arc<PlaybackUnit>, SimController) {
        let sources = vec![
            SourceDescriptor::new(format!("/v/{}.mp4", name)).with_alternate(format!("/v/{}-m.mp4", name)),
        ];
        let unit = PlaybackUnit::new(config, Box::new(resource), sources, self.services());
        self.router.connect(&unit, controller.signals());
        self.router.settle();
        (unit, controller)
    }

    fn spawn(&mut self, config: UnitConfig, behavior: PlayBehavior) -> (Arc<PlaybackUnit>, SimController) {
        let (resource, controller) = SimulatedResource::new(behavior);
        self.spawn_with(config, resource, controller, "clip")
    }

    fn ready(&mut self, controller: &SimController, readiness: Readiness) {
        assert!(controller.ready(readiness), "nothing attached");
        self.router.settle();
    }

    fn settle(&mut self) {
        self.router.settle();
    }
}

fn ids(units: &[Arc<PlaybackUnit>]) -> Vec<UnitId> {
    units.iter().map(|u| u.id()).collect()
}

#[test]
fn seventh_load_evicts_first_and_pool_never_exceeds_max() {
    let mut h = Harness::new(1280);
    let max_seen = Arc::new(Mutex::new(0usize));
    let pool = Arc::clone(&h.pool);
    let m = Arc::clone(&max_seen);
    h.bus.subscribe::<StateChangedEvent, _>(move |_| {
        let mut max = m.lock().unwrap();
        *max = (*max).max(pool.size());
    });
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&evicted);
    h.bus.subscribe::<UnitEvictedEvent, _>(move |ev| e.lock().unwrap().push((ev.unit, ev.admitted)));

    let units: Vec<_> = (0..7).map(|_| h.spawn(UnitConfig::default(), PlayBehavior::Immediate).0).collect();
    for unit in &units[..6] {
        unit.load();
        h.settle();
    }
    assert_eq!(h.pool.size(), MAX_LOADED);
    assert!(evicted.lock().unwrap().is_empty());

    units[6].load();
    h.settle();
    assert_eq!(*evicted.lock().unwrap(), [(units[0].id(), units[6].id())]);
    assert_eq!(h.pool.members(), ids(&units[1..]));
    assert_eq!(units[0].state(), PlaybackState::Initial);
    assert!(!units[0].is_loaded());
    assert!(units[1..].iter().all(|u| u.state() == PlaybackState::Loading));
    assert!(*max_seen.lock().unwrap() <= MAX_LOADED);
}

#[test]
fn eviction_is_strict_fifo_over_many_loads() {
    let mut h = Harness::new(1280);
    let units: Vec<_> = (0..12).map(|_| h.spawn(UnitConfig::default(), PlayBehavior::Immediate).0).collect();
    for unit in &units {
        unit.load();
        assert!(h.pool.size() <= MAX_LOADED);
    }
    assert_eq!(h.pool.members(), ids(&units[6..]));
    assert!(units[..6].iter().all(|u| u.state() == PlaybackState::Initial));
}

#[test]
fn loading_twice_is_idempotent() {
    let mut h = Harness::new(1280);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    unit.load();
    unit.load();
    assert_eq!(h.pool.size(), 1);
    assert_eq!(controller.log().attached_urls().len(), 1);
}

#[test]
fn pause_during_loading_beats_late_readiness() {
    let mut h = Harness::new(1280);
    let config = UnitConfig { autoplay: AutoplayMode::OnFullBuffer, ..Default::default() };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);
    assert_eq!(unit.state(), PlaybackState::Loading);

    unit.pause();
    h.ready(&controller, Readiness::CanPlayThrough);
    assert_eq!(unit.state(), PlaybackState::Paused);
    assert_eq!(controller.log().plays(), 0);
}

#[test]
fn unload_while_loading_ignores_deferred_readiness() {
    let mut h = Harness::new(1280);
    let config = UnitConfig { autoplay: AutoplayMode::Immediate, ..Default::default() };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);
    let old_epoch = controller.epoch().unwrap();

    unit.unload();
    controller.emit_at(old_epoch, ResourceEvent::Ready(Readiness::CanPlayThrough));
    h.settle();

    assert_eq!(unit.state(), PlaybackState::Initial);
    assert!(!h.pool.contains(unit.id()));
    assert_eq!(controller.log().plays(), 0);
}

#[test]
fn full_buffer_autoplay_waits_for_play_through() {
    let mut h = Harness::new(800);
    let config = UnitConfig {
        autoplay: AutoplayMode::OnFullBuffer,
        autoplay_min_width: 700,
        ..Default::default()
    };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);

    h.ready(&controller, Readiness::CanStart);
    assert_eq!(unit.state(), PlaybackState::Loading);
    h.ready(&controller, Readiness::CanPlayThrough);
    assert_eq!(unit.state(), PlaybackState::Playing);
}

#[test]
fn narrow_viewport_disables_autoplay_and_picks_alternate() {
    let mut h = Harness::new(375);
    let config = UnitConfig {
        autoplay: AutoplayMode::Immediate,
        autoplay_min_width: 700,
        ..Default::default()
    };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);
    assert_eq!(unit.state(), PlaybackState::Initial);

    unit.load();
    h.ready(&controller, Readiness::CanPlayThrough);
    assert_eq!(unit.state(), PlaybackState::Loading);
    assert_eq!(controller.log().attached_urls(), [vec!["/v/clip-m.mp4".to_string()]]);
}

#[test]
fn replace_sources_while_playing_restarts_with_new_list() {
    let mut h = Harness::new(1280);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    unit.play();
    h.settle();
    h.ready(&controller, Readiness::CanStart);
    assert_eq!(unit.state(), PlaybackState::Playing);

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    unit.subscribe(move |change| t.lock().unwrap().push((change.from, change.to)));

    unit.replace_sources(vec![SourceDescriptor::new("/v/next.webm")], true);
    h.settle();
    assert!(unit.flags().loading);
    h.ready(&controller, Readiness::CanStart);

    use PlaybackState::*;
    assert_eq!(
        *transitions.lock().unwrap(),
        [(Playing, Initial), (Initial, Loading), (Loading, Playing)]
    );
    assert_eq!(controller.log().attached_urls().last(), Some(&vec!["/v/next.webm".to_string()]));
    assert!(h.pool.contains(unit.id()));
}

#[test]
fn replace_sources_without_play_stays_initial() {
    let mut h = Harness::new(1280);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    unit.load();
    unit.replace_sources(vec![SourceDescriptor::new("/v/other.mp4")], false);
    h.settle();

    assert_eq!(unit.state(), PlaybackState::Initial);
    assert_eq!(controller.log().releases(), 1);
    assert_eq!(unit.sources()[0].primary, "/v/other.mp4");
}

#[test]
fn blocked_autoplay_reverts_without_error_event() {
    let mut h = Harness::new(1280);
    let config = UnitConfig { autoplay: AutoplayMode::Immediate, ..Default::default() };
    let (unit, controller) = h.spawn(config, PlayBehavior::Blocked);
    h.ready(&controller, Readiness::CanStart);

    assert_eq!(unit.state(), PlaybackState::Loading);
    assert!(!unit.flags().error);
    assert!(!unit.flags().loading);
    assert!(h.bus.poll().iter().all(|e| downcast_event::<UnitErrorEvent>(e).is_none()));
    assert_eq!(unit.last_error(), Some(UnitError::AttachBlocked { unit: unit.id() }));
}

#[test]
fn deferred_play_resolves_to_playing_hook() {
    let mut h = Harness::new(1280);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Deferred);
    unit.play();
    h.settle();
    h.ready(&controller, Readiness::CanStart);
    assert_eq!(unit.state(), PlaybackState::Playing);

    let hooks: Vec<Hook> = h
        .bus
        .poll()
        .iter()
        .filter_map(|e| downcast_event::<LifecycleEvent>(e).map(|l| l.hook))
        .collect();
    assert_eq!(
        hooks,
        [Hook::Initialised, Hook::LoadStart, Hook::LoadedMetadata, Hook::CanPlay, Hook::Playing]
    );
}

#[test]
fn failing_play_surfaces_error_and_is_not_retried() {
    let mut h = Harness::new(1280);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Failing);
    unit.play();
    h.settle();
    h.ready(&controller, Readiness::CanStart);

    assert_ne!(unit.state(), PlaybackState::Playing);
    assert!(unit.flags().error);
    h.ready(&controller, Readiness::CanPlayThrough);
    assert_eq!(controller.log().plays(), 1);

    let errors: Vec<UnitError> = h
        .bus
        .poll()
        .iter()
        .filter_map(|e| downcast_event::<UnitErrorEvent>(e).map(|u| u.error.clone()))
        .collect();
    assert!(matches!(errors.as_slice(), [UnitError::AttachFailed { .. }]));
}

#[test]
fn failed_eviction_still_frees_the_slot() {
    let mut h = Harness::new(1280);
    let (resource, controller) = SimulatedResource::new(PlayBehavior::Immediate);
    let (stubborn, _) = h.spawn_with(UnitConfig::default(), resource.failing_release(), controller, "stubborn");
    stubborn.load();

    let others: Vec<_> = (0..6).map(|_| h.spawn(UnitConfig::default(), PlayBehavior::Immediate).0).collect();
    for unit in &others {
        unit.load();
    }

    assert!(!h.pool.contains(stubborn.id()));
    assert_eq!(h.pool.members(), ids(&others));
    assert_eq!(stubborn.state(), PlaybackState::Initial);
    let errors: Vec<UnitError> = h
        .bus
        .poll()
        .iter()
        .filter_map(|e| downcast_event::<UnitErrorEvent>(e).map(|u| u.error.clone()))
        .collect();
    assert!(matches!(errors.as_slice(), [UnitError::EvictionFailed { .. }]));
}

#[test]
fn ended_exits_fullscreen_and_replays() {
    let mut h = Harness::new(1280);
    let config = UnitConfig { autoplay: AutoplayMode::Immediate, ..Default::default() };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);
    h.ready(&controller, Readiness::CanStart);

    unit.toggle_fullscreen();
    assert!(controller.fullscreen_changed(true));
    h.settle();
    assert!(unit.flags().fullscreen);

    assert!(controller.finish());
    h.settle();
    assert_eq!(unit.state(), PlaybackState::Ended);
    assert!(unit.flags().ended);
    assert_eq!(h.sink.fullscreen_requests(), [(unit.id(), true), (unit.id(), false)]);

    unit.pause();
    assert_eq!(unit.state(), PlaybackState::Ended);
    unit.toggle();
    assert_eq!(unit.state(), PlaybackState::Playing);
}

#[test]
fn teardown_releases_and_goes_inert() {
    let mut h = Harness::new(1280);
    let config = UnitConfig { autoplay: AutoplayMode::Immediate, ..Default::default() };
    let (unit, controller) = h.spawn(config, PlayBehavior::Immediate);
    h.ready(&controller, Readiness::CanStart);

    unit.teardown();
    unit.play();
    unit.load();
    h.settle();

    assert_eq!(unit.state(), PlaybackState::Initial);
    assert!(unit.is_torn_down());
    assert!(!h.pool.contains(unit.id()));
    assert_eq!(controller.log().releases(), 1);
    assert_eq!(controller.log().attached_urls().len(), 1);
    let last = h.sink.last(unit.id()).unwrap();
    assert_eq!(last.state, PlaybackState::Initial);
}

#[test]
fn replace_player_applies_settings() {
    let mut h = Harness::new(1024);
    let (unit, controller) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    unit.replace_player(vidgate::core::unit::ReplaceRequest {
        sources: vec![SourceDescriptor::new("/v/promo.mp4")],
        autoplay: AutoplayMode::Immediate,
        autoplay_min_width: Some(900),
        muted: true,
        looping: true,
        ..Default::default()
    });
    h.settle();
    h.ready(&controller, Readiness::CanStart);

    assert_eq!(unit.state(), PlaybackState::Playing);
    assert!(unit.muted());
    assert!(unit.flags().muted);
    assert_eq!(unit.config().preload, vidgate::PreloadMode::Auto);

    // Too narrow for autoplay: sources swap, nothing plays
    h.viewport.set_width(800);
    unit.replace_player(vidgate::core::unit::ReplaceRequest {
        sources: vec![SourceDescriptor::new("/v/other.mp4")],
        autoplay: AutoplayMode::Immediate,
        autoplay_min_width: Some(900),
        ..Default::default()
    });
    h.settle();
    assert_eq!(unit.state(), PlaybackState::Initial);
}

#[test]
fn eviction_from_a_state_callback_leaves_sink_on_final_state() {
    let mut h = Harness::with_limits(1280, PoolLimits::new(2, 1).unwrap());
    let (first, first_ctl) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    let (second, _) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);
    let (late, _) = h.spawn(UnitConfig::default(), PlayBehavior::Immediate);

    // Starting playback on `first` loads `late`, which evicts `first` while
    // its own Playing notices are still going out
    let l = Arc::clone(&late);
    first.subscribe(move |change| {
        if change.to == PlaybackState::Playing {
            l.load();
        }
    });
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    first.subscribe(move |change| t.lock().unwrap().push((change.from, change.to)));

    first.play();
    h.settle();
    second.load();
    h.ready(&first_ctl, Readiness::CanStart);

    assert_eq!(first.state(), PlaybackState::Initial);
    assert!(!first.flags().playing);
    let shown = h.sink.last(first.id()).unwrap();
    assert_eq!(shown.state, PlaybackState::Initial);
    assert!(!shown.flags.playing);
    assert_eq!(h.pool.members(), [second.id(), late.id()]);

    use PlaybackState::*;
    assert_eq!(
        *transitions.lock().unwrap(),
        [(Initial, Loading), (Loading, Playing), (Playing, Initial)]
    );
}

#[test]
fn style_reaches_the_sink_on_creation() {
    let mut h = Harness::new(1280);
    let style = StyleConfig { progress_upper_color: "#ff0000".into(), ..Default::default() };
    let config = UnitConfig { style: style.clone(), ..Default::default() };
    let (unit, _) = h.spawn(config, PlayBehavior::Immediate);
    assert_eq!(h.sink.style(unit.id()), Some(style));
}
