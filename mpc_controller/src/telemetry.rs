//! Fire-and-forget telemetry.
//!
//! The RT tick pushes fixed-size [`TelemetryRecord`]s into a bounded
//! `crossbeam` channel with `try_send`; a full channel drops the record and
//! counts it. A background thread drains the channel into a CSV file.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use heapless::Vec as FixedVec;
use mpc_common::config::TelemetryConfig;
use mpc_common::consts::{MAX_JOINTS, TARGET_DIM};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

/// Telemetry errors (startup and writer thread only)
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Output file could not be created
    #[error("Telemetry file error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or write failed
    #[error("Telemetry CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writer thread panicked
    #[error("Telemetry writer thread panicked")]
    WriterPanicked,
}

/// One controller tick, fixed-size
#[derive(Debug, Clone, Default)]
pub struct TelemetryRecord {
    /// Controller time [s]
    pub time: f64,
    /// Current target
    pub target: [f64; TARGET_DIM],
    /// Age of the law used [s], NaN without a law
    pub law_age: f64,
    /// Reference minus measured position [rad]
    pub position_error: FixedVec<f64, MAX_JOINTS>,
    /// Measured effort [Nm]
    pub effort: FixedVec<f64, MAX_JOINTS>,
    /// Commanded effort
    pub command_effort: FixedVec<f64, MAX_JOINTS>,
    /// Measured position [rad]
    pub position: FixedVec<f64, MAX_JOINTS>,
    /// Measured velocity [rad/s]
    pub velocity: FixedVec<f64, MAX_JOINTS>,
}

/// Producer side, owned by the controller loop
#[derive(Debug)]
pub struct TelemetrySink {
    tx: Sender<TelemetryRecord>,
    decimation: u32,
    countdown: u32,
    dropped: u64,
    sent: u64,
}

impl TelemetrySink {
    /// True on every `decimation`-th call
    #[inline]
    pub fn should_sample(&mut self) -> bool {
        if self.countdown <= 1 {
            self.countdown = self.decimation;
            true
        } else {
            self.countdown -= 1;
            false
        }
    }

    /// Queue `record` without blocking; returns `false` if it was dropped.
    #[inline]
    pub fn send(&mut self, record: TelemetryRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Records dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Records queued so far
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

/// Bounded telemetry channel without a writer (tests, custom consumers)
pub fn telemetry_channel(
    capacity: usize,
    decimation: u32,
) -> (TelemetrySink, Receiver<TelemetryRecord>) {
    let (tx, rx) = bounded(capacity.max(1));
    let decimation = decimation.max(1);
    (
        TelemetrySink {
            tx,
            decimation,
            countdown: 1,
            dropped: 0,
            sent: 0,
        },
        rx,
    )
}

/// Handle to the CSV writer thread
#[derive(Debug)]
pub struct TelemetryWriter {
    handle: JoinHandle<Result<u64, TelemetryError>>,
}

impl TelemetryWriter {
    /// Wait for the writer to drain the channel (after the sink is dropped).
    ///
    /// Returns the number of rows written.
    pub fn join(self) -> Result<u64, TelemetryError> {
        self.handle
            .join()
            .map_err(|_| TelemetryError::WriterPanicked)?
    }
}

/// CSV header for `joint_names`
pub fn csv_header(joint_names: &[String]) -> Vec<String> {
    let mut header: Vec<String> = ["time", "target_x", "target_y", "target_z", "law_age"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for name in joint_names {
        for column in ["pos_err", "effort", "effort_cmd", "position", "velocity"] {
            header.push(format!("{name}.{column}"));
        }
    }
    header
}

fn write_row<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    record: &TelemetryRecord,
) -> Result<(), csv::Error> {
    wtr.write_field(record.time.to_string())?;
    for t in record.target {
        wtr.write_field(t.to_string())?;
    }
    wtr.write_field(record.law_age.to_string())?;
    for i in 0..record.position.len() {
        for value in [
            record.position_error.get(i),
            record.effort.get(i),
            record.command_effort.get(i),
            record.position.get(i),
            record.velocity.get(i),
        ] {
            wtr.write_field(value.copied().unwrap_or(f64::NAN).to_string())?;
        }
    }
    wtr.write_record(None::<&[u8]>)
}

/// Create `config.path`, write the header and spawn the writer thread.
pub fn spawn_csv_writer(
    config: &TelemetryConfig,
    joint_names: &[String],
) -> Result<(TelemetrySink, TelemetryWriter), TelemetryError> {
    spawn_csv_writer_at(&config.path, config.queue_capacity, config.decimation, joint_names)
}

/// [`spawn_csv_writer`] with explicit parameters
pub fn spawn_csv_writer_at(
    path: &Path,
    capacity: usize,
    decimation: u32,
    joint_names: &[String],
) -> Result<(TelemetrySink, TelemetryWriter), TelemetryError> {
    let file = File::create(path)?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    wtr.write_record(csv_header(joint_names))?;

    let (sink, rx) = telemetry_channel(capacity, decimation);
    let display_path = path.display().to_string();

    let handle = thread::Builder::new()
        .name("mpc-telemetry".to_string())
        .spawn(move || -> Result<u64, TelemetryError> {
            let mut rows = 0u64;
            for record in rx.iter() {
                if let Err(e) = write_row(&mut wtr, &record) {
                    warn!(error = %e, "Telemetry row dropped");
                    continue;
                }
                rows += 1;
            }
            wtr.flush()?;
            info!(path = %display_path, rows, "Telemetry writer finished");
            Ok(rows)
        })?;

    info!(path = %path.display(), capacity, decimation, "Telemetry enabled");
    Ok((sink, TelemetryWriter { handle }))
}
