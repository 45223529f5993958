//! demo - end-to-end synthetic run of the parking occupancy kernel
//!
//! Scripts vehicles into a row of synthetic stalls, runs the full pipeline
//! (blur, reference capture, scoring, debounce, aggregation) and checks that
//! every scripted arrival and departure was reported.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use parking_kernel::ingest::{stall_row, PreprocessedSource};
use parking_kernel::ui::ConsoleDisplay;
use parking_kernel::{
    EngineConfig, FrameReport, FrameSource, HistorySettings, Occupancy, OccupancyEngine,
    RegionSet, RunControl, RunSummary, StatusSink, SyntheticLot, Transition,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic video.
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    /// Frames per second for synthetic source.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Number of stalls in the synthetic lot.
    #[arg(long, default_value_t = 4)]
    spaces: u32,
    /// Optional deterministic seed for sensor noise.
    #[arg(long)]
    seed: Option<u64>,
    /// Console output: auto, plain, pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
    /// Write a JSON run summary here.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.spaces == 0 {
        return Err(anyhow!("spaces must be >= 1"));
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let display = ConsoleDisplay::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let regions = RegionSet::from_definitions(&stall_row(args.spaces))?;
    let lot = SyntheticLot::for_regions("demo", &regions, args.fps)
        .with_noise(3)
        .with_seed(args.seed.unwrap_or(0))
        .with_frame_limit(args.seconds * args.fps as u64);
    let script = lot.vehicles().to_vec();
    let mut source = PreprocessedSource::new(lot);

    let config = EngineConfig {
        history: HistorySettings {
            interval: Duration::from_secs(1),
            capacity: Some(120),
        },
        ..EngineConfig::default()
    };
    let mut engine = OccupancyEngine::new(regions, config);
    let mut sink = Recorder {
        display,
        transitions: Vec::new(),
    };
    source.connect()?;
    let stats = engine.run(&mut source, &mut sink, &RunControl::detached())?;
    log::info!("demo processed {} frames", stats.frames);

    // Every arrival (and departure) that happened at least one detect delay
    // before the end of the video must have been reported.
    let end_s = args.seconds as f64;
    let settle = engine.detect_delay().as_secs_f64() + 1.0 / args.fps as f64;
    let mut expected = 0usize;
    for (pos, vehicle) in script.iter().enumerate() {
        let id = pos as u32;
        if vehicle.arrive_s + settle <= end_s {
            expected += 1;
            check_reported(&sink.transitions, id, Occupancy::Occupied)?;
        }
        if let Some(depart) = vehicle.depart_s {
            if depart + settle <= end_s {
                expected += 1;
                check_reported(&sink.transitions, id, Occupancy::Vacant)?;
            }
        }
    }
    if sink.transitions.len() != expected {
        return Err(anyhow!(
            "expected {} transitions, saw {}",
            expected,
            sink.transitions.len()
        ));
    }

    if let Some(path) = &args.report {
        engine.summary().write_json(path)?;
    }
    println!("demo ok: {} transitions across {} spaces", expected, args.spaces);
    Ok(())
}

fn check_reported(
    transitions: &[Transition],
    region_id: u32,
    to: Occupancy,
) -> Result<()> {
    if transitions
        .iter()
        .any(|t| t.region_id == region_id && t.to == to)
    {
        Ok(())
    } else {
        Err(anyhow!("space {} never became {}", region_id + 1, to))
    }
}

struct Recorder {
    display: ConsoleDisplay,
    transitions: Vec<Transition>,
}

impl StatusSink for Recorder {
    fn on_frame(&mut self, report: &FrameReport) {
        self.transitions.extend(report.transitions.iter().copied());
        self.display.on_frame(report);
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        self.display.on_finish(summary);
    }
}
