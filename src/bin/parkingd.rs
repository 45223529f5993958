//! parkingd - parking occupancy daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by PARKING_CONFIG, then PARKING_* overrides, then flags)
//! 2. Loads and validates the region file
//! 3. Opens the configured frame source (stub://, image directory, or video file)
//! 4. Runs the occupancy engine until end of stream or Ctrl-C
//! 5. Reads `+` / `-` lines on stdin to adjust sensitivity between frames
//! 6. Prints final statistics and optionally writes a JSON run summary

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_kernel::ingest::stall_row;
use parking_kernel::ui::ConsoleDisplay;
use parking_kernel::{
    control_channel, load_region_file, open_source, Command, ConfigOverrides, ControlHandle,
    FrameReport, FrameSource, OccupancyEngine, ParkingConfig, RegionSet, RunEnd, RunSummary,
    StatusSink,
};

/// Spaces in the built-in layout used for stub:// sources without a region file.
const SYNTHETIC_SPACES: u32 = 6;
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Overrides PARKING_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Region file (YAML, JSON or TOML).
    #[arg(long)]
    regions: Option<PathBuf>,
    /// Frame source: stub://<name>, an image directory, or a video file.
    #[arg(long)]
    source: Option<String>,
    /// Initial occupancy threshold.
    #[arg(long)]
    sensitivity: Option<f64>,
    /// Skip this many frames before processing.
    #[arg(long)]
    start_frame: Option<u64>,
    /// Write a JSON run summary here on exit.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Console output: auto, plain, pretty.
    #[arg(long, default_value = "auto", env = "PARKING_UI")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config_path = args
        .config
        .or_else(|| std::env::var_os("PARKING_CONFIG").map(PathBuf::from));
    let overrides = ConfigOverrides {
        source_url: args.source,
        regions_path: args.regions,
        sensitivity: args.sensitivity,
        start_frame: args.start_frame,
        report_path: args.report,
    };
    let cfg = ParkingConfig::load_with(config_path.as_deref(), &overrides)?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let display = ConsoleDisplay::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let regions = {
        let _stage = display.stage("Load regions");
        match &cfg.regions_path {
            Some(path) => load_region_file(path)?,
            None => {
                log::info!(
                    "no region file; using a {}-space synthetic layout",
                    SYNTHETIC_SPACES
                );
                RegionSet::from_definitions(&stall_row(SYNTHETIC_SPACES))?
            }
        }
    };

    let mut source = {
        let _stage = display.stage("Open frame source");
        let mut source = open_source(&cfg.source, &regions)?;
        source.connect()?;
        source
    };

    log::info!(
        "parkingd running. source={} spaces={} sensitivity={} detect_delay={}ms",
        cfg.source.url,
        regions.len(),
        cfg.engine.sensitivity,
        cfg.engine.detect_delay.as_millis()
    );

    let (handle, control) = control_channel();
    let stop = handle.clone();
    ctrlc::set_handler(move || {
        stop.stop();
    })
    .expect("error setting Ctrl-C handler");
    spawn_command_reader(handle);

    let mut engine = OccupancyEngine::new(regions, cfg.engine);
    let mut sink = HealthLogged::new(display);
    let stats = engine.run(&mut source, &mut sink, &control)?;

    let source_stats = source.stats();
    log::info!(
        "parkingd finished ({}). frames={} captured={} source={}",
        match stats.end {
            RunEnd::EndOfStream => "end of stream",
            RunEnd::Stopped => "stopped",
        },
        stats.frames,
        source_stats.frames_captured,
        source_stats.name
    );

    if let Some(path) = &cfg.report_path {
        engine
            .summary()
            .write_json(path)
            .with_context(|| format!("write report to {}", path.display()))?;
    }
    Ok(())
}

/// Forwards `+`/`=` and `-`/`_` keys typed on stdin to the engine.
fn spawn_command_reader(handle: ControlHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            for key in line.trim().chars() {
                match Command::from_key(key) {
                    Some(command) => {
                        if !handle.send(command) {
                            return;
                        }
                    }
                    None => log::warn!("ignoring key '{}'; use + or -", key),
                }
            }
        }
    });
}

/// Display sink that also writes a periodic count line to the log.
struct HealthLogged<K> {
    inner: K,
    last_log: Instant,
}

impl<K: StatusSink> HealthLogged<K> {
    fn new(inner: K) -> Self {
        Self {
            inner,
            last_log: Instant::now(),
        }
    }
}

impl<K: StatusSink> StatusSink for HealthLogged<K> {
    fn on_frame(&mut self, report: &FrameReport) {
        if self.last_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "lot health frame={} t={:.1}s vacant={} occupied={} sensitivity={:.1}",
                report.frame_index,
                report.timestamp_s,
                report.counts.vacant,
                report.counts.occupied,
                report.sensitivity
            );
            self.last_log = Instant::now();
        }
        self.inner.on_frame(report);
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        self.inner.on_finish(summary);
    }
}
