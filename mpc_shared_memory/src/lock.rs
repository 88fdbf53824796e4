//! Robust process-shared mutex living inside the mapped segment.
//!
//! The mutex is `PTHREAD_PROCESS_SHARED`, `PTHREAD_MUTEX_ROBUST` and
//! `PTHREAD_MUTEX_ERRORCHECK`:
//!
//! - a holder that dies leaves the mutex in the owner-dead state; the next
//!   locker gets `EOWNERDEAD`, marks it consistent and carries on
//! - relocking from the thread that already holds it returns `EDEADLK`
//!   instead of hanging the caller
//!
//! There is no acquisition timeout: both sides only hold the lock for
//! fixed-size copies.

use crate::error::{ShmError, ShmResult};
use nix::errno::Errno;
use std::mem::MaybeUninit;

/// Result of a successful acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Normal acquisition
    Acquired,
    /// Previous holder died; state may be partially written
    Recovered,
}

fn check(op: &'static str, rc: libc::c_int) -> ShmResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(ShmError::Lock {
            op,
            source: Errno::from_raw(rc),
        })
    }
}

/// Initialise the mutex at `mutex`.
///
/// # Safety
///
/// `mutex` must point into a live shared mapping and no other process may use
/// it before this returns.
pub(crate) unsafe fn init_process_mutex(mutex: *mut libc::pthread_mutex_t) -> ShmResult<()> {
    let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    unsafe {
        check("attr_init", libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
        let result = (|| {
            check(
                "setpshared",
                libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
            )?;
            check(
                "setrobust",
                libc::pthread_mutexattr_setrobust(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_ROBUST),
            )?;
            check(
                "settype",
                libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_ERRORCHECK),
            )?;
            check("init", libc::pthread_mutex_init(mutex, attr.as_ptr()))
        })();
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        result
    }
}

/// Block until the mutex is held by the calling thread.
///
/// # Safety
///
/// `mutex` must have been initialised by [`init_process_mutex`] and its
/// mapping must outlive the lock.
pub(crate) unsafe fn lock(mutex: *mut libc::pthread_mutex_t) -> ShmResult<LockOutcome> {
    match unsafe { libc::pthread_mutex_lock(mutex) } {
        0 => Ok(LockOutcome::Acquired),
        libc::EOWNERDEAD => {
            check("consistent", unsafe { libc::pthread_mutex_consistent(mutex) })?;
            Ok(LockOutcome::Recovered)
        }
        rc => check("lock", rc).map(|_| LockOutcome::Acquired),
    }
}

/// Release the mutex.
///
/// # Safety
///
/// The calling thread must hold `mutex`.
pub(crate) unsafe fn unlock(mutex: *mut libc::pthread_mutex_t) -> ShmResult<()> {
    check("unlock", unsafe { libc::pthread_mutex_unlock(mutex) })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeapMutex(Box<libc::pthread_mutex_t>);

    impl HeapMutex {
        fn new() -> Self {
            let mut m = Box::new(unsafe { std::mem::zeroed::<libc::pthread_mutex_t>() });
            unsafe { init_process_mutex(&mut *m).unwrap() };
            Self(m)
        }
        fn ptr(&mut self) -> *mut libc::pthread_mutex_t {
            &mut *self.0
        }
    }

    #[test]
    fn lock_unlock() {
        let mut m = HeapMutex::new();
        unsafe {
            assert_eq!(lock(m.ptr()).unwrap(), LockOutcome::Acquired);
            unlock(m.ptr()).unwrap();
            assert_eq!(lock(m.ptr()).unwrap(), LockOutcome::Acquired);
            unlock(m.ptr()).unwrap();
        }
    }

    #[test]
    fn relock_reports_deadlock() {
        let mut m = HeapMutex::new();
        unsafe {
            lock(m.ptr()).unwrap();
            let err = lock(m.ptr()).unwrap_err();
            assert!(matches!(
                err,
                ShmError::Lock {
                    op: "lock",
                    source: Errno::EDEADLK
                }
            ));
            unlock(m.ptr()).unwrap();
        }
    }

    #[test]
    fn unlock_without_holding_fails() {
        let mut m = HeapMutex::new();
        assert!(unsafe { unlock(m.ptr()) }.is_err());
    }
}
