//! # MPC Solver
//!
//! Solver process of the MPC bridge. Opens (or creates) the shared exchange
//! segment, publishes the robot description and runs the solver loop with
//! the built-in posture regulator until interrupted.

use clap::Parser;
use mpc_common::config::load_bridge_config;
use mpc_shared_memory::{ExchangeSegment, SegmentOptions};
use mpc_solver::{PostureRegulator, SolverLoop};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// MPC Solver: non-real-time side of the MPC bridge
#[derive(Parser, Debug)]
#[command(name = "mpc_solver")]
#[command(version)]
#[command(about = "Free-running OCP solver publishing feedback laws")]
struct Args {
    /// Path to the bridge configuration TOML.
    #[arg(short, long, default_value = "config/bridge.toml")]
    config: PathBuf,

    /// Robot description file (overrides `robot.description_path`).
    #[arg(long, value_name = "FILE")]
    description: Option<PathBuf>,

    /// Unlink a leftover segment before starting.
    #[arg(long)]
    fresh: bool,

    /// Stop after this many solve attempts.
    #[arg(long)]
    max_solves: Option<u64>,

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

    info!("MPC Solver v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("MPC Solver shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_bridge_config(&args.config)?;
    let dims = config.dims()?;
    info!(
        "Config OK: joints={}, ocp_step={}s, frequency={}Hz",
        dims.joint_count(),
        config.ocp.time_step,
        config.ocp.solver_frequency,
    );

    let description = match args.description.as_ref().or(config.robot.description_path.as_ref()) {
        Some(path) => {
            info!("Loading robot description from {}", path.display());
            Some(std::fs::read_to_string(path)?)
        }
        None => None,
    };

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

    let regulator = PostureRegulator::new(dims, &config.solver, &config.ocp)?;
    let mut solver_loop = SolverLoop::new(&config, segment, regulator, description)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    solver_loop.run(&running, args.max_solves)?;
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
