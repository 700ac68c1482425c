use clap::Parser;
use std::path::PathBuf;

use crate::core::autoplay::AutoplayMode;
use crate::core::host::PreloadMode;
use crate::sim::PlayBehavior;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Pool:   ", crate::core::pool::MAX_LOADED, " loaded max, ",
    crate::core::pool::TARGET_AFTER_EVICT, " kept before admitting\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless playback-policy simulator
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Number of simulated players
    #[arg(short = 'n', long = "units", value_name = "N", default_value_t = 7)]
    pub units: usize,

    /// Viewport width in pixels (overrides config)
    #[arg(short = 'w', long = "width", value_name = "PX")]
    pub width: Option<u32>,

    /// Autoplay mode: none, immediate, canplaythrough
    #[arg(short = 'a', long = "autoplay", value_name = "MODE")]
    pub autoplay: Option<AutoplayMode>,

    /// Minimum viewport width for autoplay
    #[arg(long = "min-width", value_name = "PX")]
    pub min_width: Option<u32>,

    /// Preload mode: none, metadata, auto
    #[arg(short = 'p', long = "preload", value_name = "MODE")]
    pub preload: Option<PreloadMode>,

    /// How simulated elements answer play(): immediate, deferred, blocked, failing
    #[arg(short = 'b', long = "behavior", value_name = "KIND", default_value = "immediate")]
    pub behavior: PlayBehavior,

    /// Call play() on every unit after loading
    #[arg(long = "play-all")]
    pub play_all: bool,

    /// Config file (default: vidgate.json in the config dir)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Enable debug logging to file (default: vidgate.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
