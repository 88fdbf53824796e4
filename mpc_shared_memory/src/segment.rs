//! Exchange segment layout and guarded access.
//!
//! The segment is a single `#[repr(C)]` block mapped by both processes:
//!
//! ```text
//! ┌────────────────┬──────────────────────┬──────────────────────────────┐
//! │ SegmentHeader  │ pthread_mutex_t      │ ExchangeData                 │
//! │ magic, hash,   │ pshared, robust,     │ x_meas us xs0 xs1 Ks target  │
//! │ dims, pid table│ errorcheck           │ times, seqs, flags, URDF     │
//! └────────────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! Arrays are sized for [`MAX_JOINTS`]; the joint count fixed at creation is
//! recorded in the header and every view is trimmed to it. The header is
//! written once by the creator and read lock-free; everything in
//! [`ExchangeData`] is only reachable through an [`ExchangeGuard`].

use crate::error::{ShmError, ShmResult};
use crate::handshake::BootstrapFlags;
use crate::lock::{self, LockOutcome};
use crate::platform::{
    SHM_DIR, attach_segment_mmap, create_segment_mmap, get_current_pid, is_process_alive,
    segment_len, unlink_segment,
};
use memmap2::MmapMut;
use mpc_common::consts::{
    DESCRIPTION_CAPACITY, MAX_GAIN_LEN, MAX_JOINTS, MAX_STATE_DIM, TARGET_DIM,
};
use mpc_common::law::{ControlLaw, DimensionError, Dimensions};
use static_assertions::const_assert;
use std::marker::PhantomData;
use std::mem::{offset_of, size_of};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Magic number identifying an exchange segment ("MPC_XSG1")
pub const EXCHANGE_MAGIC: u64 = 0x4D50_435F_5853_4731;

const LAYOUT_VERSION: u64 = 2;

/// Number of attached-process slots in the header
pub const ATTACH_SLOTS: usize = 4;

const INIT_EMPTY: u32 = 0;
const INIT_IN_PROGRESS: u32 = 1;
const INIT_READY: u32 = 2;

const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Segment header, written once by the creator (except the PID table)
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Hash of the layout of the build that created the segment
    pub layout_hash: u64,
    /// Initialisation progress (empty, in progress, ready)
    pub init_state: AtomicU32,
    /// Joint count fixed at creation
    pub joint_count: u32,
    /// State dimension fixed at creation
    pub state_dim: u32,
    /// Process that created the segment
    pub creator_pid: AtomicU32,
    /// Processes mapping the segment; a slot is reused only once its
    /// process is dead
    pub attached_pids: [AtomicU32; ATTACH_SLOTS],
    /// Creation timestamp (ns since UNIX epoch)
    pub created_ts: u64,
}

impl SegmentHeader {
    /// Snapshot of the attached-process table (0 = free slot)
    pub fn attached(&self) -> [u32; ATTACH_SLOTS] {
        std::array::from_fn(|i| self.attached_pids[i].load(Ordering::Acquire))
    }

    /// Record `pid` in a free slot or one whose process is dead.
    ///
    /// Slots of live processes are never overwritten. Returns `false` if
    /// every slot belongs to another live process.
    fn register_pid(&self, pid: u32) -> bool {
        if self.attached().contains(&pid) {
            return true;
        }
        for slot in &self.attached_pids {
            let current = slot.load(Ordering::Acquire);
            if (current == 0 || !is_process_alive(current))
                && slot
                    .compare_exchange(current, pid, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return true;
            }
        }
        false
    }
}

/// Guarded payload of the segment
#[repr(C)]
pub struct ExchangeData {
    /// Measured state `[q, v]`
    pub x_meas: [f64; MAX_STATE_DIM],
    /// Feed-forward effort
    pub us: [f64; MAX_JOINTS],
    /// Reference state at the law timestamp
    pub xs0: [f64; MAX_STATE_DIM],
    /// Reference state one OCP step later
    pub xs1: [f64; MAX_STATE_DIM],
    /// Feedback gain, row-major `joint_count × state_dim`
    pub ks: [f64; MAX_GAIN_LEN],
    /// Task-space target
    pub target: [f64; TARGET_DIM],
    /// Controller time of the last measured-state write [s]
    pub current_time: f64,
    /// Controller time the current law was computed from [s]
    pub law_time: f64,
    /// Number of measured-state writes
    pub state_seq: u64,
    /// Odd while a law write is in progress, even otherwise
    pub law_seq: u64,
    /// Bootstrap flags (see [`BootstrapFlags`])
    pub flags: u32,
    /// Length of the published description in bytes
    pub description_len: u32,
    /// Robot description text (UTF-8)
    pub description: [u8; DESCRIPTION_CAPACITY],
}

/// Complete mapped layout
#[repr(C)]
pub struct ExchangeLayout {
    /// Header
    pub header: SegmentHeader,
    lock: libc::pthread_mutex_t,
    /// Guarded payload
    pub data: ExchangeData,
}

/// Mapped size of the segment in bytes
pub const LAYOUT_SIZE: usize = size_of::<ExchangeLayout>();

/// Layout hash of this build
pub const LAYOUT_HASH: u64 = layout_hash();

const_assert!(size_of::<SegmentHeader>() == 64);
const_assert!(offset_of!(SegmentHeader, created_ts) == 48);
const_assert!(offset_of!(ExchangeLayout, lock) == 64);
const_assert!(LAYOUT_SIZE % 8 == 0);

const fn layout_hash() -> u64 {
    let fields = [
        LAYOUT_VERSION,
        LAYOUT_SIZE as u64,
        MAX_JOINTS as u64,
        DESCRIPTION_CAPACITY as u64,
        size_of::<libc::pthread_mutex_t>() as u64,
        offset_of!(ExchangeLayout, data) as u64,
        offset_of!(ExchangeData, law_seq) as u64,
    ];
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < fields.len() {
        let mut byte = 0;
        while byte < 8 {
            hash ^= (fields[i] >> (8 * byte)) & 0xff;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
            byte += 1;
        }
        i += 1;
    }
    hash
}

/// Named vector fields of the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorField {
    /// Measured state
    XMeas,
    /// Feed-forward effort
    Us,
    /// Reference state at the law timestamp
    Xs0,
    /// Reference state one OCP step later
    Xs1,
    /// Feedback gain (row-major)
    Ks,
    /// Task-space target
    Target,
}

impl VectorField {
    /// Field name as used in logs and errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::XMeas => "x_meas",
            Self::Us => "us",
            Self::Xs0 => "xs0",
            Self::Xs1 => "xs1",
            Self::Ks => "Ks",
            Self::Target => "target",
        }
    }

    /// Number of valid entries for `dims`
    pub const fn len(self, dims: Dimensions) -> usize {
        match self {
            Self::XMeas | Self::Xs0 | Self::Xs1 => dims.state_dim(),
            Self::Us => dims.joint_count(),
            Self::Ks => dims.gain_len(),
            Self::Target => TARGET_DIM,
        }
    }
}

/// Options for [`ExchangeSegment::open_or_create`]
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Directory holding the segment file
    pub dir: PathBuf,
    /// Unlink a leftover segment whose recorded processes are all dead
    pub clear_stale: bool,
    /// How long to wait for a concurrent creator to finish initialising
    pub attach_timeout: Duration,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(SHM_DIR),
            clear_stale: true,
            attach_timeout: Duration::from_secs(2),
        }
    }
}

/// Handle to a mapped exchange segment.
///
/// Opening is idempotent: whichever process starts first creates and
/// initialises the segment, the other attaches and validates it. The segment
/// file outlives both handles; it is only removed by
/// [`ExchangeSegment::remove`] or by stale clearing on a later open.
pub struct ExchangeSegment {
    name: String,
    dims: Dimensions,
    created: bool,
    layout: NonNull<ExchangeLayout>,
    _mmap: MmapMut,
}

// SAFETY: header fields are immutable after initialisation or atomic; the
// payload is only reachable through `ExchangeGuard`, which holds the
// process-shared mutex.
unsafe impl Send for ExchangeSegment {}
unsafe impl Sync for ExchangeSegment {}

impl ExchangeSegment {
    /// Open the segment `name` for `dims`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if the segment was created for another joint count
    /// - `LayoutMismatch`/`SizeMismatch`/`BadMagic` if it was created by an
    ///   incompatible build
    /// - `NotReady` if a concurrent creator did not finish in time
    pub fn open_or_create(
        name: &str,
        dims: Dimensions,
        options: &SegmentOptions,
    ) -> ShmResult<Self> {
        validate_name(name)?;
        let path = options.dir.join(name);

        if options.clear_stale {
            clear_if_orphaned(&path, name)?;
        }

        match Self::create(&path, name, dims)? {
            Some(segment) => Ok(segment),
            None => Self::attach(&path, name, dims, options.attach_timeout),
        }
    }

    /// Open under `/dev/shm` with default options.
    pub fn open(name: &str, dims: Dimensions) -> ShmResult<Self> {
        Self::open_or_create(name, dims, &SegmentOptions::default())
    }

    /// Unlink the segment `name` under `/dev/shm`.
    ///
    /// Returns `false` if it did not exist. Mapped handles stay valid until
    /// dropped.
    pub fn remove(name: &str) -> ShmResult<bool> {
        Self::remove_in(Path::new(SHM_DIR), name)
    }

    /// Unlink the segment `name` under `dir`.
    pub fn remove_in(dir: &Path, name: &str) -> ShmResult<bool> {
        validate_name(name)?;
        let removed = unlink_segment(&dir.join(name))?;
        if removed {
            info!(segment = name, "Exchange segment removed");
        }
        Ok(removed)
    }

    fn create(path: &Path, name: &str, dims: Dimensions) -> ShmResult<Option<Self>> {
        let Some(mut mmap) = create_segment_mmap(path, name, LAYOUT_SIZE)? else {
            return Ok(None);
        };
        let layout = layout_ptr(&mut mmap);
        let pid = get_current_pid();

        let init = unsafe {
            let header = &(*layout.as_ptr()).header;
            header.creator_pid.store(pid, Ordering::Relaxed);
            header.register_pid(pid);
            header.init_state.store(INIT_IN_PROGRESS, Ordering::Relaxed);
            lock::init_process_mutex(ptr::addr_of_mut!((*layout.as_ptr()).lock))
        };
        if let Err(e) = init {
            error!(segment = name, error = %e, "Failed to initialise segment mutex");
            let _ = unlink_segment(path);
            return Err(e);
        }

        unsafe {
            let header = &mut (*layout.as_ptr()).header;
            header.magic = EXCHANGE_MAGIC;
            header.layout_hash = LAYOUT_HASH;
            header.joint_count = dims.joint_count() as u32;
            header.state_dim = dims.state_dim() as u32;
            header.created_ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            header.init_state.store(INIT_READY, Ordering::Release);
        }

        info!(
            segment = name,
            joints = dims.joint_count(),
            size = LAYOUT_SIZE,
            "Exchange segment created"
        );

        Ok(Some(Self {
            name: name.to_string(),
            dims,
            created: true,
            layout,
            _mmap: mmap,
        }))
    }

    fn attach(path: &Path, name: &str, dims: Dimensions, timeout: Duration) -> ShmResult<Self> {
        let deadline = Instant::now() + timeout;

        let mut mmap = loop {
            match segment_len(path)? {
                None => {
                    return Err(ShmError::NotFound {
                        name: name.to_string(),
                    });
                }
                Some(len) if len == LAYOUT_SIZE => {
                    let mmap = attach_segment_mmap(path, name)?;
                    let header = unsafe { &*mmap.as_ptr().cast::<SegmentHeader>() };
                    if header.init_state.load(Ordering::Acquire) == INIT_READY {
                        break mmap;
                    }
                }
                // Creator between open and truncate
                Some(0) => {}
                Some(len) => {
                    return Err(ShmError::SizeMismatch {
                        expected: LAYOUT_SIZE,
                        found: len,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(ShmError::NotReady {
                    name: name.to_string(),
                });
            }
            std::thread::sleep(ATTACH_POLL_INTERVAL);
        };

        let layout = layout_ptr(&mut mmap);
        let header = unsafe { &(*layout.as_ptr()).header };

        if header.magic != EXCHANGE_MAGIC {
            return Err(ShmError::BadMagic {
                name: name.to_string(),
            });
        }
        if header.layout_hash != LAYOUT_HASH {
            return Err(ShmError::LayoutMismatch {
                expected: LAYOUT_HASH,
                found: header.layout_hash,
            });
        }
        if header.joint_count as usize != dims.joint_count() {
            return Err(ShmError::DimensionMismatch {
                expected: dims.joint_count(),
                found: header.joint_count as usize,
            });
        }

        if !header.register_pid(get_current_pid()) {
            warn!(
                segment = name,
                slots = ATTACH_SLOTS,
                "All attach slots held by live processes; this process is not recorded"
            );
        }

        info!(
            segment = name,
            joints = dims.joint_count(),
            creator_pid = header.creator_pid.load(Ordering::Relaxed),
            "Attached to exchange segment"
        );

        Ok(Self {
            name: name.to_string(),
            dims,
            created: false,
            layout,
            _mmap: mmap,
        })
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions recorded at creation
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// True if this handle created the segment
    pub fn is_creator(&self) -> bool {
        self.created
    }

    /// Segment header
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &(*self.layout.as_ptr()).header }
    }

    fn mutex_ptr(&self) -> *mut libc::pthread_mutex_t {
        unsafe { ptr::addr_of_mut!((*self.layout.as_ptr()).lock) }
    }

    /// Acquire the segment mutex.
    ///
    /// The returned guard is the only way to reach the payload and releases
    /// the mutex on drop. If the previous holder died, the mutex is recovered
    /// and [`ExchangeGuard::recovered`] reports it.
    pub fn lock(&self) -> ShmResult<ExchangeGuard<'_>> {
        let outcome = unsafe { lock::lock(self.mutex_ptr())? };
        let recovered = outcome == LockOutcome::Recovered;
        if recovered {
            warn!(
                segment = %self.name,
                "Previous lock holder died; segment mutex recovered"
            );
        }
        Ok(ExchangeGuard {
            segment: self,
            recovered,
            _not_send: PhantomData,
        })
    }
}

impl std::fmt::Debug for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSegment")
            .field("name", &self.name)
            .field("joints", &self.dims.joint_count())
            .field("created", &self.created)
            .finish()
    }
}

fn layout_ptr(mmap: &mut MmapMut) -> NonNull<ExchangeLayout> {
    NonNull::from(&mut mmap[..]).cast::<ExchangeLayout>()
}

fn validate_name(name: &str) -> ShmResult<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Unlink the segment at `path` if every process recorded in it is dead.
fn clear_if_orphaned(path: &Path, name: &str) -> ShmResult<bool> {
    let Some(len) = segment_len(path)? else {
        return Ok(false);
    };
    if len < size_of::<SegmentHeader>() {
        return Ok(false);
    }

    let (creator, attached) = {
        let mmap = attach_segment_mmap(path, name)?;
        let header = unsafe { &*mmap.as_ptr().cast::<SegmentHeader>() };
        (header.creator_pid.load(Ordering::Acquire), header.attached())
    };

    // Creator has not recorded itself yet
    if creator == 0 {
        return Ok(false);
    }
    let live = attached
        .iter()
        .copied()
        .chain(std::iter::once(creator))
        .find(|&pid| is_process_alive(pid));
    if let Some(pid) = live {
        debug!(segment = name, creator, pid, "Existing segment is in use");
        return Ok(false);
    }

    info!(
        segment = name,
        creator,
        attached = ?attached,
        "Clearing stale segment left by a previous run"
    );
    unlink_segment(path)
}

/// Scoped access to the segment payload.
///
/// Holds the process-shared mutex; dropped guards release it. Copies in and
/// out are fixed-size and never allocate.
pub struct ExchangeGuard<'a> {
    segment: &'a ExchangeSegment,
    recovered: bool,
    // Must be unlocked by the locking thread
    _not_send: PhantomData<*const ()>,
}

impl ExchangeGuard<'_> {
    #[inline]
    fn data(&self) -> &ExchangeData {
        unsafe { &(*self.segment.layout.as_ptr()).data }
    }

    #[inline]
    fn data_mut(&mut self) -> &mut ExchangeData {
        unsafe { &mut (*self.segment.layout.as_ptr()).data }
    }

    /// Segment dimensions
    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.segment.dims
    }

    /// True if the mutex was recovered from a dead holder
    #[inline]
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    /// Read-only view of `field`, trimmed to the segment dimensions
    pub fn vector(&self, field: VectorField) -> &[f64] {
        let len = field.len(self.dims());
        let data = self.data();
        match field {
            VectorField::XMeas => &data.x_meas[..len],
            VectorField::Us => &data.us[..len],
            VectorField::Xs0 => &data.xs0[..len],
            VectorField::Xs1 => &data.xs1[..len],
            VectorField::Ks => &data.ks[..len],
            VectorField::Target => &data.target[..len],
        }
    }

    /// Mutable view of `field`, trimmed to the segment dimensions
    pub fn vector_mut(&mut self, field: VectorField) -> &mut [f64] {
        let len = field.len(self.dims());
        let data = self.data_mut();
        match field {
            VectorField::XMeas => &mut data.x_meas[..len],
            VectorField::Us => &mut data.us[..len],
            VectorField::Xs0 => &mut data.xs0[..len],
            VectorField::Xs1 => &mut data.xs1[..len],
            VectorField::Ks => &mut data.ks[..len],
            VectorField::Target => &mut data.target[..len],
        }
    }

    /// Write the measured state and controller time; returns the new state
    /// sequence number.
    pub fn write_measured_state(&mut self, x: &[f64], time: f64) -> ShmResult<u64> {
        let expected = self.dims().state_dim();
        if x.len() != expected {
            return Err(DimensionError::LengthMismatch {
                field: VectorField::XMeas.name(),
                expected,
                actual: x.len(),
            }
            .into());
        }
        self.vector_mut(VectorField::XMeas).copy_from_slice(x);
        let data = self.data_mut();
        data.current_time = time;
        data.state_seq = data.state_seq.wrapping_add(1);
        Ok(data.state_seq)
    }

    /// Number of measured-state writes so far
    #[inline]
    pub fn state_seq(&self) -> u64 {
        self.data().state_seq
    }

    /// Controller time of the last measured-state write
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.data().current_time
    }

    /// Overwrite the target
    pub fn write_target(&mut self, target: &[f64; TARGET_DIM]) {
        self.data_mut().target = *target;
    }

    /// Current target
    pub fn target(&self) -> [f64; TARGET_DIM] {
        self.data().target
    }

    /// Overwrite the whole law and its timestamp.
    ///
    /// The law sequence is odd for the duration of the copy, so a reader that
    /// recovers the mutex from a writer that died mid-copy sees a torn law.
    pub fn write_law(&mut self, law: &ControlLaw, law_time: f64) -> ShmResult<()> {
        law.validate(self.dims())?;
        let data = self.data_mut();
        data.law_seq |= 1;
        let n = law.us.len();
        let nx = law.xs0.len();
        data.us[..n].copy_from_slice(&law.us);
        data.xs0[..nx].copy_from_slice(&law.xs0);
        data.xs1[..nx].copy_from_slice(&law.xs1);
        data.ks[..law.ks.len()].copy_from_slice(&law.ks);
        data.law_time = law_time;
        data.law_seq = data.law_seq.wrapping_add(1);
        Ok(())
    }

    /// Copy the law into `law` (sized for the segment dimensions).
    ///
    /// Returns the law timestamp, or `None` if no complete law is present.
    pub fn read_law_into(&self, law: &mut ControlLaw) -> ShmResult<Option<f64>> {
        if !self.has_law() {
            return Ok(None);
        }
        law.set_from_slices(
            self.vector(VectorField::Us),
            self.vector(VectorField::Xs0),
            self.vector(VectorField::Xs1),
            self.vector(VectorField::Ks),
        )?;
        Ok(Some(self.data().law_time))
    }

    /// True if a complete law has been written
    #[inline]
    pub fn has_law(&self) -> bool {
        let seq = self.data().law_seq;
        seq != 0 && seq % 2 == 0
    }

    /// Law sequence number (odd while a write is incomplete)
    #[inline]
    pub fn law_seq(&self) -> u64 {
        self.data().law_seq
    }

    /// Controller time the current law was computed from
    #[inline]
    pub fn law_time(&self) -> f64 {
        self.data().law_time
    }

    /// Bootstrap flags
    #[inline]
    pub fn flags(&self) -> BootstrapFlags {
        BootstrapFlags::from_bits_retain(self.data().flags)
    }

    /// Latch one bootstrap flag; `Ok(true)` if newly set.
    pub fn latch(&mut self, flag: BootstrapFlags) -> ShmResult<bool> {
        let mut flags = self.flags();
        let newly = flags.latch(flag)?;
        if newly {
            self.data_mut().flags = flags.bits();
            debug!(
                segment = %self.segment.name,
                flag = BootstrapFlags::flag_name(flag),
                "Bootstrap flag latched"
            );
        }
        Ok(newly)
    }

    /// Publish the robot description and latch `DESCRIPTION_SENT`.
    pub fn publish_description(&mut self, text: &str) -> ShmResult<()> {
        let bytes = text.as_bytes();
        if bytes.len() > DESCRIPTION_CAPACITY {
            return Err(ShmError::DescriptionTooLarge {
                len: bytes.len(),
                capacity: DESCRIPTION_CAPACITY,
            });
        }
        let data = self.data_mut();
        data.description[..bytes.len()].copy_from_slice(bytes);
        data.description_len = bytes.len() as u32;
        self.latch(BootstrapFlags::DESCRIPTION_SENT)?;
        Ok(())
    }

    /// Published robot description, `None` before `DESCRIPTION_SENT`
    pub fn description(&self) -> ShmResult<Option<&str>> {
        if !self.flags().contains(BootstrapFlags::DESCRIPTION_SENT) {
            return Ok(None);
        }
        let data = self.data();
        let len = (data.description_len as usize).min(DESCRIPTION_CAPACITY);
        std::str::from_utf8(&data.description[..len])
            .map(Some)
            .map_err(|_| ShmError::InvalidDescription)
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = unsafe { lock::unlock(self.segment.mutex_ptr()) } {
            error!(segment = %self.segment.name, error = %e, "Failed to release segment mutex");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> SegmentOptions {
        SegmentOptions {
            dir: dir.path().to_path_buf(),
            clear_stale: true,
            attach_timeout: Duration::from_millis(200),
        }
    }

    fn dims(n: usize) -> Dimensions {
        Dimensions::new(n).unwrap()
    }

    // Above any pid_max, so never alive
    const DEAD_SOLVER_1: u32 = i32::MAX as u32;
    const DEAD_SOLVER_2: u32 = i32::MAX as u32 - 1;

    /// Pretend every recorded process has exited
    fn mark_dead(header: &SegmentHeader) {
        header.creator_pid.store(DEAD_SOLVER_1, Ordering::Release);
        for slot in &header.attached_pids {
            if slot.load(Ordering::Acquire) != 0 {
                slot.store(DEAD_SOLVER_1, Ordering::Release);
            }
        }
    }

    #[test]
    fn header_is_one_cache_line() {
        assert_eq!(size_of::<SegmentHeader>(), 64);
        assert_eq!(LAYOUT_HASH, layout_hash());
        assert_ne!(LAYOUT_HASH, 0);
    }

    #[test]
    fn second_open_attaches() {
        let dir = TempDir::new().unwrap();
        let a = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
        let b = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
        assert!(a.is_creator());
        assert!(!b.is_creator());
        assert_eq!(b.header().joint_count, 2);
        assert_eq!(b.header().state_dim, 4);
        let me = get_current_pid();
        let attached = b.header().attached();
        assert_eq!(attached.iter().filter(|&&pid| pid == me).count(), 1);
    }

    #[test]
    fn fresh_segment_has_no_law() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(3), &options(&dir)).unwrap();
        let guard = seg.lock().unwrap();
        let mut law = ControlLaw::zeros(dims(3));
        assert!(!guard.has_law());
        assert_eq!(guard.read_law_into(&mut law).unwrap(), None);
        assert!(guard.flags().is_empty());
        assert_eq!(guard.description().unwrap(), None);
    }

    #[test]
    fn torn_law_is_not_returned() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let mut guard = seg.lock().unwrap();
        let law = ControlLaw::from_slices(dims(1), &[1.0], &[0.0; 2], &[0.0; 2], &[0.0; 2]).unwrap();
        guard.write_law(&law, 0.5).unwrap();
        assert_eq!(guard.law_seq(), 2);

        // Writer died between the two sequence bumps
        guard.data_mut().law_seq = 3;
        let mut out = ControlLaw::zeros(dims(1));
        assert_eq!(guard.read_law_into(&mut out).unwrap(), None);

        guard.write_law(&law, 0.7).unwrap();
        assert_eq!(guard.law_seq(), 4);
        assert_eq!(guard.read_law_into(&mut out).unwrap(), Some(0.7));
        assert_eq!(out, law);
    }

    #[test]
    fn write_law_rejects_wrong_dims() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
        let mut guard = seg.lock().unwrap();
        let law = ControlLaw::zeros(dims(1));
        assert!(matches!(
            guard.write_law(&law, 0.0),
            Err(ShmError::Law(DimensionError::LengthMismatch { .. }))
        ));
        assert!(!guard.has_law());
    }

    #[test]
    fn measured_state_bumps_sequence() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let mut guard = seg.lock().unwrap();
        assert_eq!(guard.write_measured_state(&[0.1, 0.2], 1.0).unwrap(), 1);
        assert_eq!(guard.write_measured_state(&[0.3, 0.4], 1.001).unwrap(), 2);
        assert_eq!(guard.vector(VectorField::XMeas), &[0.3, 0.4]);
        assert_eq!(guard.current_time(), 1.001);
        assert!(guard.write_measured_state(&[0.0], 2.0).is_err());
        assert_eq!(guard.state_seq(), 2);
    }

    #[test]
    fn views_are_trimmed_to_dims() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(7), &options(&dir)).unwrap();
        let mut guard = seg.lock().unwrap();
        assert_eq!(guard.vector(VectorField::XMeas).len(), 14);
        assert_eq!(guard.vector(VectorField::Us).len(), 7);
        assert_eq!(guard.vector(VectorField::Ks).len(), 98);
        assert_eq!(guard.vector_mut(VectorField::Target).len(), TARGET_DIM);
    }

    #[test]
    fn description_roundtrip_and_capacity() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let mut guard = seg.lock().unwrap();
        guard.publish_description("<robot name=\"arm\"/>").unwrap();
        assert!(guard.flags().contains(BootstrapFlags::DESCRIPTION_SENT));
        assert_eq!(guard.description().unwrap(), Some("<robot name=\"arm\"/>"));

        let huge = "x".repeat(DESCRIPTION_CAPACITY + 1);
        assert!(matches!(
            guard.publish_description(&huge),
            Err(ShmError::DescriptionTooLarge { .. })
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        for name in ["", "a/b", ".."] {
            assert!(matches!(
                ExchangeSegment::open_or_create(name, dims(1), &options(&dir)),
                Err(ShmError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn stale_segment_is_cleared() {
        let dir = TempDir::new().unwrap();
        {
            let seg = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
            mark_dead(seg.header());
        }

        let mut keep = options(&dir);
        keep.clear_stale = false;
        assert!(matches!(
            ExchangeSegment::open_or_create("seg", dims(3), &keep),
            Err(ShmError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));

        let seg = ExchangeSegment::open_or_create("seg", dims(3), &options(&dir)).unwrap();
        assert!(seg.is_creator());
        assert_eq!(seg.dims().joint_count(), 3);
    }

    #[test]
    fn restarted_solvers_do_not_orphan_live_controller() {
        let dir = TempDir::new().unwrap();
        let first = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let controller = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();

        // First solver exits; the controller (this process) stays attached
        let header = first.header();
        header.creator_pid.store(DEAD_SOLVER_1, Ordering::Release);
        header.attached_pids[0].store(DEAD_SOLVER_1, Ordering::Release);
        header.attached_pids[1].store(get_current_pid(), Ordering::Release);

        // Second solver takes the dead slot, then exits as well
        assert!(header.register_pid(DEAD_SOLVER_2));
        assert_eq!(header.attached()[0], DEAD_SOLVER_2);
        assert_eq!(header.attached()[1], get_current_pid());

        // Third solver must attach to the controller's segment
        let third = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        assert!(!third.is_creator());
        let law = ControlLaw::from_slices(dims(1), &[1.0], &[0.0; 2], &[0.0; 2], &[0.0; 2]).unwrap();
        third.lock().unwrap().write_law(&law, 0.0).unwrap();
        assert!(controller.lock().unwrap().has_law());
    }

    #[test]
    fn live_slots_are_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let header = seg.header();
        let me = get_current_pid();
        for slot in &header.attached_pids {
            slot.store(me, Ordering::Release);
        }
        assert!(header.register_pid(me));
        assert!(!header.register_pid(DEAD_SOLVER_2));
        assert_eq!(header.attached(), [me; ATTACH_SLOTS]);
    }

    #[test]
    fn live_segment_is_not_cleared() {
        let dir = TempDir::new().unwrap();
        let _a = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
        let b = ExchangeSegment::open_or_create("seg", dims(2), &options(&dir)).unwrap();
        assert!(!b.is_creator());
    }

    #[test]
    fn remove_unlinks_file() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        drop(seg);
        assert!(ExchangeSegment::remove_in(dir.path(), "seg").unwrap());
        assert!(!ExchangeSegment::remove_in(dir.path(), "seg").unwrap());
    }

    #[test]
    fn size_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("seg"), vec![0u8; 128]).unwrap();
        let mut opts = options(&dir);
        opts.clear_stale = false;
        assert!(matches!(
            ExchangeSegment::open_or_create("seg", dims(1), &opts),
            Err(ShmError::SizeMismatch { found: 128, .. })
        ));
    }

    #[test]
    fn uninitialised_segment_times_out() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("seg"), vec![0u8; LAYOUT_SIZE]).unwrap();
        assert!(matches!(
            ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)),
            Err(ShmError::NotReady { .. })
        ));
    }

    #[test]
    fn dead_holder_is_recovered() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                let guard = seg.lock().unwrap();
                // Thread exits while holding the mutex
                std::mem::forget(guard);
            });
        });

        let guard = seg.lock().unwrap();
        assert!(guard.recovered());
        drop(guard);
        assert!(!seg.lock().unwrap().recovered());
    }

    #[test]
    fn relock_from_same_thread_is_an_error() {
        let dir = TempDir::new().unwrap();
        let seg = ExchangeSegment::open_or_create("seg", dims(1), &options(&dir)).unwrap();
        let _guard = seg.lock().unwrap();
        assert!(matches!(seg.lock(), Err(ShmError::Lock { .. })));
    }
}
