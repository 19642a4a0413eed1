//! The underlying OS mutex: a thin wrapper that adds timed acquisition and,
//! on platforms that support it, the priority-inheritance protocol
//! attribute.

use std::time::Duration;

/// A raw, non-recursive OS mutex supporting timed acquisition and an
/// optional priority-inheritance attribute.
///
/// On unix this wraps `libc::pthread_mutex_t` directly so that
/// `pthread_mutex_timedlock` and `pthread_mutexattr_setprotocol` are
/// available; elsewhere it falls back to a `Mutex<bool>` + `Condvar` deadline
/// loop with no priority-inheritance effect.
pub struct RawOsMutex {
    #[cfg(unix)]
    inner: unix_impl::Inner,
    #[cfg(not(unix))]
    inner: fallback_impl::Inner,
}

impl RawOsMutex {
    /// Creates a new unlocked mutex. `priority_inheritance` requests the OS
    /// protocol attribute where supported; failure to set it is logged, not
    /// fatal.
    #[must_use]
    pub fn new(priority_inheritance: bool) -> Self {
        #[cfg(unix)]
        {
            Self {
                inner: unix_impl::Inner::new(priority_inheritance),
            }
        }
        #[cfg(not(unix))]
        {
            if priority_inheritance {
                tracing::warn!(
                    target: "mutrace",
                    "priority inheritance requested but unsupported on this platform"
                );
            }
            Self {
                inner: fallback_impl::Inner::new(),
            }
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) {
        self.inner.lock();
    }

    /// Releases the lock. Caller must currently hold it.
    pub fn unlock(&self) {
        self.inner.unlock();
    }

    /// Attempts to acquire without blocking.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    /// Attempts to acquire, blocking at most `timeout`. A non-positive
    /// timeout degenerates to a single [`RawOsMutex::try_lock`] without
    /// invoking the OS timed-lock primitive at all.
    #[must_use]
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.try_lock();
        }
        self.inner.try_lock_for(timeout)
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::cell::UnsafeCell;
    use std::time::Duration;

    pub struct Inner {
        raw: UnsafeCell<libc::pthread_mutex_t>,
    }

    // SAFETY: `pthread_mutex_t` is designed for cross-thread sharing; all
    // access goes through the pthread API which synchronizes internally.
    unsafe impl Send for Inner {}
    unsafe impl Sync for Inner {}

    impl Inner {
        pub fn new(priority_inheritance: bool) -> Self {
            unsafe {
                let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
                let rc = libc::pthread_mutexattr_init(&mut attr);
                debug_assert_eq!(rc, 0);

                if priority_inheritance {
                    let rc = libc::pthread_mutexattr_setprotocol(&mut attr, libc::PTHREAD_PRIO_INHERIT);
                    if rc != 0 {
                        tracing::warn!(
                            target: "mutrace",
                            errno = rc,
                            "failed to set priority-inheritance protocol, mutex degrades to default"
                        );
                    }
                }

                let mut raw: libc::pthread_mutex_t = std::mem::zeroed();
                let rc = libc::pthread_mutex_init(&mut raw, &attr);
                debug_assert_eq!(rc, 0);
                libc::pthread_mutexattr_destroy(&mut attr);

                Self {
                    raw: UnsafeCell::new(raw),
                }
            }
        }

        pub fn lock(&self) {
            unsafe {
                let rc = libc::pthread_mutex_lock(self.raw.get());
                debug_assert_eq!(rc, 0);
            }
        }

        pub fn unlock(&self) {
            unsafe {
                let rc = libc::pthread_mutex_unlock(self.raw.get());
                debug_assert_eq!(rc, 0);
            }
        }

        pub fn try_lock(&self) -> bool {
            unsafe { libc::pthread_mutex_trylock(self.raw.get()) == 0 }
        }

        pub fn try_lock_for(&self, timeout: Duration) -> bool {
            let deadline = deadline_timespec(timeout);
            unsafe { libc::pthread_mutex_timedlock(self.raw.get(), &deadline) == 0 }
        }
    }

    impl Drop for Inner {
        fn drop(&mut self) {
            unsafe {
                libc::pthread_mutex_destroy(self.raw.get());
            }
        }
    }

    /// Builds an absolute `CLOCK_REALTIME` deadline `timeout` from now, as
    /// required by `pthread_mutex_timedlock`.
    fn deadline_timespec(timeout: Duration) -> libc::timespec {
        unsafe {
            let mut now: libc::timespec = std::mem::zeroed();
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
            let mut secs = now.tv_sec + timeout.as_secs() as libc::time_t;
            let mut nsecs = now.tv_nsec + i64::from(timeout.subsec_nanos());
            if nsecs >= 1_000_000_000 {
                secs += 1;
                nsecs -= 1_000_000_000;
            }
            libc::timespec {
                tv_sec: secs,
                tv_nsec: nsecs,
            }
        }
    }
}

#[cfg(not(unix))]
mod fallback_impl {
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    pub struct Inner {
        state: Mutex<bool>,
        cv: Condvar,
    }

    impl Inner {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(false),
                cv: Condvar::new(),
            }
        }

        pub fn lock(&self) {
            let mut locked = self.state.lock().unwrap();
            while *locked {
                locked = self.cv.wait(locked).unwrap();
            }
            *locked = true;
        }

        pub fn unlock(&self) {
            let mut locked = self.state.lock().unwrap();
            *locked = false;
            self.cv.notify_one();
        }

        pub fn try_lock(&self) -> bool {
            let mut locked = self.state.lock().unwrap();
            if *locked {
                false
            } else {
                *locked = true;
                true
            }
        }

        pub fn try_lock_for(&self, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            let mut locked = self.state.lock().unwrap();
            while *locked {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                let (guard, result) = self.cv.wait_timeout(locked, deadline - now).unwrap();
                locked = guard;
                if result.timed_out() && *locked {
                    return false;
                }
            }
            *locked = true;
            true
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_unlock_roundtrip() {
        let m = RawOsMutex::new(false);
        m.lock();
        m.unlock();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Arc::new(RawOsMutex::new(false));
        m.lock();
        assert!(!m.try_lock());
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn try_lock_for_zero_does_not_block() {
        let m = RawOsMutex::new(false);
        m.lock();
        let start = std::time::Instant::now();
        assert!(!m.try_lock_for(Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(50));
        m.unlock();
    }

    #[test]
    fn try_lock_for_succeeds_once_released() {
        let m = Arc::new(RawOsMutex::new(false));
        m.lock();
        let m2 = Arc::clone(&m);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            m2.unlock();
        });
        assert!(m.try_lock_for(Duration::from_secs(2)));
        handle.join().unwrap();
        m.unlock();
    }

    #[test]
    fn try_lock_for_expires_on_timeout() {
        let m = RawOsMutex::new(false);
        m.lock();
        assert!(!m.try_lock_for(Duration::from_millis(30)));
        m.unlock();
    }

    #[test]
    fn priority_inheritance_flag_does_not_break_construction() {
        let _m = RawOsMutex::new(true);
    }
}
