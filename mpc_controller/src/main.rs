//! # MPC Controller
//!
//! Real-time control process of the MPC bridge. Opens (or creates) the shared
//! exchange segment, performs RT setup and ticks the controller loop against
//! the simulated arm until interrupted.

use clap::Parser;
use mpc_common::config::{load_bridge_config, BridgeConfig};
use mpc_controller::cycle::{rt_setup, CycleRunner};
use mpc_controller::sim::SimulatedArm;
use mpc_controller::target::parse_target;
use mpc_controller::telemetry::{spawn_csv_writer, TelemetrySink, TelemetryWriter};
use mpc_controller::{ControllerLoop, TargetMailbox};
use mpc_shared_memory::{ExchangeSegment, SegmentOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// MPC Controller: real-time side of the MPC bridge
#[derive(Parser, Debug)]
#[command(name = "mpc_controller")]
#[command(version)]
#[command(about = "Fixed-rate joint controller consuming MPC feedback laws")]
struct Args {
    /// Path to the bridge configuration TOML.
    #[arg(short, long, default_value = "config/bridge.toml")]
    config: PathBuf,

    /// CPU core to pin the RT thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Unlink a leftover segment before starting.
    #[arg(long)]
    fresh: bool,

    /// Read targets (`x y z` per line) from stdin.
    #[arg(long)]
    target_stdin: bool,

    /// Stop after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    duration: Option<f64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("MPC Controller v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("MPC Controller shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_bridge_config(&args.config)?;
    let dims = config.dims()?;
    info!(
        "Config OK: cycle_time={}µs, joints={}, ocp_step={}s",
        config.controller.cycle_time_us,
        dims.joint_count(),
        config.ocp.time_step,
    );

    if args.fresh && ExchangeSegment::remove(&config.segment.name)? {
        warn!(segment = %config.segment.name, "Removed leftover segment (--fresh)");
    }
    let options = SegmentOptions {
        clear_stale: config.segment.clear_stale,
        ..SegmentOptions::default()
    };
    let segment = ExchangeSegment::open_or_create(&config.segment.name, dims, &options)?;
    info!(
        segment = segment.name(),
        created = segment.is_creator(),
        "Exchange segment ready"
    );

    let mailbox = TargetMailbox::new();
    if args.target_stdin {
        spawn_stdin_targets(mailbox.clone())?;
    }

    let (sink, writer) = start_telemetry(&config)?;
    let controller = ControllerLoop::new(&config, segment, mailbox, sink)?;

    let cycle_time = Duration::from_micros(config.controller.cycle_time_us);
    let arm = SimulatedArm::new(dims, cycle_time.as_secs_f64());
    let mut runner = CycleRunner::new(controller, arm, cycle_time)?;
    if let Some(seconds) = args.duration {
        let cycles = (seconds * 1e6 / config.controller.cycle_time_us as f64).ceil() as u64;
        runner = runner.with_max_cycles(cycles);
    }

    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let result = runner.run(&running);

    // Dropping the sink lets the writer drain and exit.
    drop(runner.controller_mut().take_telemetry());
    if let Some(writer) = writer {
        match writer.join() {
            Ok(rows) => info!(rows, "Telemetry flushed"),
            Err(e) => warn!("Telemetry writer failed: {e}"),
        }
    }

    result?;
    Ok(())
}

type Telemetry = (Option<TelemetrySink>, Option<TelemetryWriter>);

fn start_telemetry(config: &BridgeConfig) -> Result<Telemetry, Box<dyn std::error::Error>> {
    if !config.telemetry.enabled {
        return Ok((None, None));
    }
    let (sink, writer) = spawn_csv_writer(&config.telemetry, &config.robot.joint_names)?;
    Ok((Some(sink), Some(writer)))
}

/// Feed stdin lines into the target mailbox until EOF.
fn spawn_stdin_targets(mailbox: TargetMailbox) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("mpc-target-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_target(&line) {
                    Some(target) => {
                        info!(?target, "Target received");
                        mailbox.post(target);
                    }
                    None => warn!(line = %line.trim(), "Ignoring malformed target (expected `x y z`)"),
                }
            }
        })?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
