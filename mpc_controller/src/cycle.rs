//! Fixed-rate cycle driving the controller loop.
//!
//! ## RT Setup Sequence
//! 1. Pre-allocate all runtime state (done in `ControllerLoop::new`).
//! 2. `mlockall(MCL_CURRENT | MCL_FUTURE)`.
//! 3. Prefault stack pages.
//! 4. `sched_setaffinity` to the configured core.
//! 5. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! ## Cycle Loop
//! With the `rt` feature the loop sleeps on `CLOCK_MONOTONIC` with
//! `TIMER_ABSTIME` for drift-free pacing; otherwise it uses
//! `std::thread::sleep`. An overrun is counted and logged, never fatal: the
//! next tick still gets a usable command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::controller::ControllerLoop;
use crate::error::ControllerError;
use crate::hardware::HardwareInterface;

/// Overruns are logged on the first occurrence and then every this many.
const OVERRUN_LOG_EVERY: u64 = 1000;

/// Per-cycle timing statistics, updated without allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle body duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle body duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle body duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for the average.
    pub sum_cycle_ns: i64,
    /// Worst wake-up latency [ns].
    pub max_latency_ns: i64,
    /// Cycles whose body exceeded the period.
    pub overruns: u64,
}

impl CycleStats {
    /// Empty statistics.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            max_latency_ns: 0,
            overruns: 0,
        }
    }

    /// Record one cycle.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle body duration [ns].
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from RT setup and the cycle loop.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT setup (mlockall, affinity, scheduler, clock) failed
    #[error("RT setup failed: {0}")]
    RtSetup(String),

    /// The controller tick failed
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Process-wide RT primitives; the non-`rt` build keeps the same surface
/// with every call succeeding without touching the kernel.
#[cfg(feature = "rt")]
mod rt {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::sys::mman::{mlockall, MlockallFlags};
    use nix::unistd::Pid;

    use super::CycleError;

    fn failed(step: &str, err: impl std::fmt::Display) -> CycleError {
        CycleError::RtSetup(format!("{step}: {err}"))
    }

    pub(super) fn lock_memory() -> Result<(), CycleError> {
        mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
            .map_err(|e| failed("mlockall", e))
    }

    pub(super) fn pin_to_core(cpu: usize) -> Result<(), CycleError> {
        let mut cpus = CpuSet::new();
        cpus.set(cpu).map_err(|e| failed("cpu set", e))?;
        sched_setaffinity(Pid::from_raw(0), &cpus).map_err(|e| failed("sched_setaffinity", e))
    }

    pub(super) fn use_fifo(priority: i32) -> Result<(), CycleError> {
        let param = libc::sched_param { sched_priority: priority };
        // SAFETY: `param` outlives the call; pid 0 is the calling thread.
        match unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } {
            0 => Ok(()),
            _ => Err(failed(
                &format!("SCHED_FIFO priority {priority}"),
                std::io::Error::last_os_error(),
            )),
        }
    }
}

#[cfg(not(feature = "rt"))]
mod rt {
    use super::CycleError;

    pub(super) fn lock_memory() -> Result<(), CycleError> {
        Ok(())
    }

    pub(super) fn pin_to_core(_cpu: usize) -> Result<(), CycleError> {
        Ok(())
    }

    pub(super) fn use_fifo(_priority: i32) -> Result<(), CycleError> {
        Ok(())
    }
}

/// Bytes of stack touched before the loop starts.
const PREFAULT_STACK_BYTES: usize = 512 * 1024;

fn prefault_stack() {
    let mut pages = [0u8; PREFAULT_STACK_BYTES];
    for page in pages.chunks_mut(4096) {
        // SAFETY: `page` is a live, exclusive slice of the local array.
        unsafe { core::ptr::write_volatile(page.as_mut_ptr(), 1) };
    }
    core::hint::black_box(&pages);
}

/// Lock memory, prefault the stack, pin to `cpu_core` and switch to
/// SCHED_FIFO. Call once before [`CycleRunner::run`].
///
/// Without the `rt` feature only the stack prefault does anything.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt::lock_memory()?;
    prefault_stack();
    rt::pin_to_core(cpu_core)?;
    rt::use_fifo(rt_priority)
}

// ─── Cycle Runner ──────────────────────────────────────────────────

/// Owns the controller loop and the hardware, and paces the ticks.
pub struct CycleRunner<H: HardwareInterface> {
    controller: ControllerLoop,
    hardware: H,
    cycle_time_ns: i64,
    max_cycles: Option<u64>,
    stats: CycleStats,
}

impl<H: HardwareInterface> CycleRunner<H> {
    /// Create a runner ticking every `cycle_time`.
    ///
    /// # Errors
    ///
    /// `JointCountMismatch` if `hardware` exposes another joint count.
    pub fn new(
        controller: ControllerLoop,
        hardware: H,
        cycle_time: Duration,
    ) -> Result<Self, CycleError> {
        controller.check_hardware(&hardware)?;
        Ok(Self {
            controller,
            hardware,
            cycle_time_ns: cycle_time.as_nanos() as i64,
            max_cycles: None,
            stats: CycleStats::new(),
        })
    }

    /// Stop after `cycles` ticks.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Tick until `running` is cleared, the cycle limit is reached, or a
    /// tick fails.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        info!(
            cycle_time_us = self.cycle_time_ns / 1000,
            max_cycles = ?self.max_cycles,
            rt = cfg!(feature = "rt"),
            "Entering control cycle"
        );

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop(running);

        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop(running);

        info!(
            cycles = self.stats.cycle_count,
            avg_us = self.stats.avg_cycle_ns() / 1000,
            max_us = self.stats.max_cycle_ns / 1000,
            overruns = self.stats.overruns,
            "Control cycle stopped"
        );
        result
    }

    fn keep_running(&self, running: &AtomicBool) -> bool {
        running.load(Ordering::Relaxed)
            && self
                .max_cycles
                .is_none_or(|max| self.stats.cycle_count < max)
    }

    /// Drift-free loop on `CLOCK_MONOTONIC` absolute deadlines.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use nix::sys::time::{TimeSpec, TimeValLike};
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || {
            clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))
        };
        let period = Duration::from_nanos(self.cycle_time_ns as u64);
        let step = TimeSpec::from(period);
        let start = now()?;
        let mut deadline = start;

        while self.keep_running(running) {
            let woke = now()?;
            let latency_ns = (woke - deadline).num_nanoseconds().abs();
            deadline = deadline + step;
            let time = (woke - start).num_nanoseconds() as f64 * 1e-9;

            self.controller.update(time, period, &mut self.hardware)?;

            self.finish_cycle((now()? - woke).num_nanoseconds(), latency_ns);

            // EINTR only shortens the sleep; the next deadline is absolute.
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &deadline);
        }
        Ok(())
    }

    /// Simulation loop using `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use std::time::Instant;

        let period = Duration::from_nanos(self.cycle_time_ns as u64);
        let start = Instant::now();

        while self.keep_running(running) {
            let cycle_start = Instant::now();
            let time = cycle_start.duration_since(start).as_secs_f64();

            self.controller.update(time, period, &mut self.hardware)?;

            let elapsed = cycle_start.elapsed();
            self.finish_cycle(elapsed.as_nanos() as i64, 0);

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    fn finish_cycle(&mut self, duration_ns: i64, latency_ns: i64) {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > self.cycle_time_ns {
            self.stats.overruns += 1;
            if self.stats.overruns % OVERRUN_LOG_EVERY == 1 {
                warn!(
                    actual_us = duration_ns / 1000,
                    budget_us = self.cycle_time_ns / 1000,
                    overruns = self.stats.overruns,
                    "Cycle overrun"
                );
            }
        }
    }

    /// Timing statistics
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Controller loop
    pub fn controller(&self) -> &ControllerLoop {
        &self.controller
    }

    /// Mutable controller loop
    pub fn controller_mut(&mut self) -> &mut ControllerLoop {
        &mut self.controller
    }

    /// Hardware
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Give back the controller and hardware.
    pub fn into_parts(self) -> (ControllerLoop, H) {
        (self.controller, self.hardware)
    }
}
