//! Simulation runner - entry point of the `vidgate` binary.
//!
//! Builds one pool and N simulated players, loads them in order, feeds them
//! readiness, and reports where every unit ended up.

use anyhow::Result;
use log::{debug, info, trace};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::cli::Args;
use crate::config::{AppConfig, CONFIG_FILE};
use crate::core::event_bus::EventBus;
use crate::core::events::{UnitErrorEvent, UnitEvictedEvent};
use crate::core::pool::LoadedResourcePool;
use crate::core::sources::SourceDescriptor;
use crate::core::state::{PlaybackState, Readiness};
use crate::core::unit::{PlaybackUnit, UnitServices};
use crate::paths;
use crate::sim::{FixedViewport, PlayBehavior, RecordingSink, SignalRouter, SimController, SimulatedResource};

/// What to simulate.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub units: usize,
    pub config: AppConfig,
    pub behavior: PlayBehavior,
    pub play_all: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub id: u64,
    pub state: PlaybackState,
    pub loaded: bool,
    pub flags: Vec<&'static str>,
    pub attaches: usize,
    pub releases: usize,
    pub plays: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvictionReport {
    pub unit: u64,
    pub admitted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub viewport_width: u32,
    /// Pool members, oldest first.
    pub pool: Vec<u64>,
    pub evictions: Vec<EvictionReport>,
    pub errors: Vec<String>,
    pub units: Vec<UnitReport>,
}

impl SimulationReport {
    /// Human-readable multi-line summary.
    pub fn render(&self) -> String {
        let ids = |ids: &[u64]| ids.iter().map(|id| format!("unit#{}", id)).collect::<Vec<_>>().join(" ");
        let mut out = format!("viewport: {}px\npool: [{}]\n", self.viewport_width, ids(&self.pool));
        for ev in &self.evictions {
            out.push_str(&format!("evicted: unit#{} (for unit#{})\n", ev.unit, ev.admitted));
        }
        for err in &self.errors {
            out.push_str(&format!("error: {}\n", err));
        }
        for unit in &self.units {
            out.push_str(&format!(
                "unit#{:<3} {:<8} loaded={:<5} attaches={} releases={} plays={} [{}]\n",
                unit.id,
                unit.state.as_str(),
                unit.loaded,
                unit.attaches,
                unit.releases,
                unit.plays,
                unit.flags.join(" ")
            ));
        }
        out
    }
}

/// Sources for the `index`-th unit when the config lists none.
fn generated_sources(index: usize) -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new(format!("/media/clip-{}.mp4", index))
            .with_alternate(format!("/media/clip-{}-small.mp4", index)),
        SourceDescriptor::new(format!("/media/clip-{}.webm", index)),
    ]
}

/// Run a plan to completion.
pub fn simulate(plan: &SimulationPlan) -> SimulationReport {
    let config = &plan.config;
    let bus = EventBus::new();
    let pool = Arc::new(LoadedResourcePool::with_limits(config.pool).with_emitter(bus.emitter()));
    let sink = Arc::new(RecordingSink::new());
    let services = UnitServices {
        pool: Arc::clone(&pool),
        bus: bus.clone(),
        viewport: Arc::new(FixedViewport::new(config.viewport_width)),
        sink: sink.clone(),
    };

    let evictions = Arc::new(Mutex::new(Vec::new()));
    let ev = Arc::clone(&evictions);
    bus.subscribe::<UnitEvictedEvent, _>(move |e| {
        ev.lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EvictionReport { unit: e.unit.get(), admitted: e.admitted.get() });
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let er = Arc::clone(&errors);
    bus.subscribe::<UnitErrorEvent, _>(move |e| {
        er.lock().unwrap_or_else(|e| e.into_inner()).push(e.error.to_string());
    });

    let mut router = SignalRouter::new();
    let mut players: Vec<(Arc<PlaybackUnit>, SimController)> = Vec::with_capacity(plan.units);

    for index in 1..=plan.units {
        let sources = if config.sources.is_empty() {
            generated_sources(index)
        } else {
            config.sources.clone()
        };
        let (resource, controller) = SimulatedResource::new(plan.behavior);
        let unit = PlaybackUnit::new(config.unit.clone(), Box::new(resource), sources, services.clone());
        router.connect(&unit, controller.signals());

        unit.load();
        router.settle();
        deliver_readiness(&controller, &mut router);
        debug!("{} after load: {}", unit.id(), unit.state());
        players.push((unit, controller));
    }

    if plan.play_all {
        for (unit, controller) in &players {
            unit.play();
            router.settle();
            deliver_readiness(controller, &mut router);
            debug!("{} after play: {}", unit.id(), unit.state());
        }
    }
    router.settle();
    trace!("{} event(s) left on the bus", bus.poll().len());

    let units = players
        .iter()
        .map(|(unit, controller)| {
            let log = controller.log();
            UnitReport {
                id: unit.id().get(),
                state: unit.state(),
                loaded: unit.is_loaded(),
                flags: unit.flags().class_names(),
                attaches: log.attached_urls().len(),
                releases: log.releases(),
                plays: log.plays(),
                last_error: unit.last_error().map(|e| e.to_string()),
            }
        })
        .collect();

    let report = SimulationReport {
        viewport_width: config.viewport_width,
        pool: pool.members().iter().map(|id| id.get()).collect(),
        evictions: std::mem::take(&mut *evictions.lock().unwrap_or_else(|e| e.into_inner())),
        errors: std::mem::take(&mut *errors.lock().unwrap_or_else(|e| e.into_inner())),
        units,
    };
    info!(
        "Simulated {} unit(s): {} loaded, {} eviction(s)",
        plan.units,
        report.pool.len(),
        report.evictions.len()
    );
    report
}

fn deliver_readiness(controller: &SimController, router: &mut SignalRouter) {
    for readiness in [Readiness::CanStart, Readiness::CanPlayThrough] {
        if controller.ready(readiness) {
            router.settle();
        }
    }
}

/// Resolve config, apply CLI overrides, simulate, print.
pub fn run(args: Args) -> Result<()> {
    let path_config = paths::PathConfig::from_env_and_cli(args.config_dir.clone());
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| paths::config_file(CONFIG_FILE, &path_config));
    info!("Config path: {}", config_path.display());

    let mut config = AppConfig::load_or_default(&config_path)?;
    if let Some(width) = args.width {
        config.viewport_width = width;
    }
    if let Some(mode) = args.autoplay {
        config.unit.autoplay = mode;
    }
    if let Some(min_width) = args.min_width {
        config.unit.autoplay_min_width = min_width;
    }
    if let Some(preload) = args.preload {
        config.unit.preload = preload;
    }
    config.validate()?;

    let plan = SimulationPlan {
        units: args.units,
        config,
        behavior: args.behavior,
        play_all: args.play_all,
    };
    let report = simulate(&plan);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
