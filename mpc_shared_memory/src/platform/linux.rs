//! Linux-specific shared memory operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Directory backing POSIX shared memory on Linux
pub const SHM_DIR: &str = "/dev/shm";

/// Create a new segment file of `size` bytes and map it.
///
/// Returns `Ok(None)` when the file already exists, so that exactly one
/// process wins the creation race and every other caller attaches.
pub fn create_segment_mmap(path: &Path, name: &str, size: usize) -> ShmResult<Option<MmapMut>> {
    let file = match OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(ShmError::from_io(name, e)),
    };

    // Zero-filled by the kernel
    file.set_len(size as u64)?;

    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(Some(mmap))
}

/// Attach to an existing segment file
pub fn attach_segment_mmap(path: &Path, name: &str) -> ShmResult<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| ShmError::from_io(name, e))?;

    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}

/// Current size of a segment file, `None` if it does not exist
pub fn segment_len(path: &Path) -> ShmResult<Option<usize>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len() as usize)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Unlink a segment file. Returns `false` if it was already gone.
pub fn unlink_segment(path: &Path) -> ShmResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false,
        Err(nix::Error::EPERM) => true, // Exists, owned by someone else
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg");

        let first = create_segment_mmap(&path, "seg", 4096).unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().len(), 4096);

        let second = create_segment_mmap(&path, "seg", 4096).unwrap();
        assert!(second.is_none());
        assert_eq!(segment_len(&path).unwrap(), Some(4096));
    }

    #[test]
    fn attach_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = attach_segment_mmap(&dir.path().join("absent"), "absent");
        assert!(matches!(result, Err(ShmError::NotFound { .. })));
    }

    #[test]
    fn unlink_twice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg");
        create_segment_mmap(&path, "seg", 4096).unwrap();
        assert!(unlink_segment(&path).unwrap());
        assert!(!unlink_segment(&path).unwrap());
        assert_eq!(segment_len(&path).unwrap(), None);
    }

    #[test]
    fn own_process_is_alive() {
        assert!(is_process_alive(get_current_pid()));
        assert!(!is_process_alive(0));
    }
}
