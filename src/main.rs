//! Runs a TrafCOD program against simulated traffic lights and detectors and prints
//! the emitted events as JSON lines.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use trafcod::{ControllerConfig, Detector, Program, Simulation, TraceRequest, TrafficLight};

/// Run a TrafCOD traffic control program
#[derive(Parser, Debug)]
#[command(name = "trafcod")]
#[command(version)]
struct Args {
    /// Path to the TrafCOD program
    #[arg(value_name = "FILE")]
    program: PathBuf,

    /// Id of the controller; traffic lights are named `<id>.<stream>.1`
    #[arg(long, default_value = "TC1")]
    id: String,

    /// Path to a JSON file with controller settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to a detector script with `<tenths> <detector-id> <0|1>` lines
    #[arg(short, long, value_name = "FILE")]
    detectors: Option<PathBuf>,

    /// Number of 0.1 s steps to simulate
    #[arg(short, long, default_value_t = 600)]
    ticks: usize,

    /// Trace all variables of a stream (can be repeated)
    #[arg(long, value_name = "STREAM")]
    trace_stream: Vec<u8>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// A scripted change of detector occupancy.
struct DetectorChange {
    time: u64,
    sensor: String,
    occupied: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let text = std::fs::read_to_string(&args.program)
        .with_context(|| format!("Failed to read {}", args.program.display()))?;
    let program = Program::parse(&text)
        .with_context(|| format!("Failed to load {}", args.program.display()))?;
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ControllerConfig::from_json(&json)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => ControllerConfig::default(),
    };
    let mut script = match &args.detectors {
        Some(path) => read_script(path)?,
        None => vec![],
    };
    script.sort_by_key(|change| change.time);

    let mut sim = Simulation::new();
    let streams: BTreeSet<u8> = program
        .variables()
        .iter()
        .filter(|(_, var)| var.is_output())
        .filter_map(|(_, var)| var.stream())
        .collect();
    for stream in streams {
        sim.add_traffic_light(TrafficLight::new(format!("{}.{:02}.1", args.id, stream)));
    }
    for (_, var) in program.variables().iter() {
        if let Some(sensor) = var.sensor_id() {
            sim.add_detector(Detector::new(sensor));
        }
    }
    let controller = sim.add_controller(&args.id, program, config);
    for stream in &args.trace_stream {
        let request = TraceRequest::Stream {
            stream: Some(*stream),
            trace: true,
        };
        sim.trace(controller, &request)?;
    }

    let mut script = script.into_iter().peekable();
    for _ in 0..args.ticks {
        while let Some(change) = script.next_if(|change| change.time <= sim.time()) {
            let Some(detector) = sim.find_detector(&change.sensor) else {
                bail!("Unknown detector {} in detector script", change.sensor);
            };
            sim.set_detector(detector, change.occupied)?;
        }
        sim.step()?;
        for event in sim.take_events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}

/// Reads a detector script; blank lines and lines starting with `#` are skipped.
fn read_script(path: &Path) -> Result<Vec<DetectorChange>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut changes = vec![];
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [time, sensor, occupied] = fields[..] else {
            bail!("{}:{}: expected `<tenths> <detector-id> <0|1>`", path.display(), lineno + 1);
        };
        changes.push(DetectorChange {
            time: time
                .parse()
                .with_context(|| format!("{}:{}: bad time", path.display(), lineno + 1))?,
            sensor: sensor.to_ascii_uppercase(),
            occupied: occupied != "0",
        });
    }
    Ok(changes)
}

fn init_logging(verbose: u8) {
    use log::LevelFilter;

    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
