//! A condition variable paired with an [`InstrumentedMutex`] via
//! [`UniqueLock`], recording the wait as an auxiliary (non-mutex) edge so the
//! deadlock detector can traverse through it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar as StdCondvar, Mutex as StdMutex};
use std::time::Duration;

use crate::current::{current_thread_info, current_tid};
use crate::guards::UniqueLock;
use crate::mutex::{InstrumentedMutex, InstrumentedMutexGuard};

/// The outcome of a timed wait: whether the deadline elapsed before a
/// notification (or spurious wake) occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult {
    timed_out: bool,
}

impl WaitTimeoutResult {
    /// True if the wait's deadline elapsed.
    #[must_use]
    pub fn timed_out(self) -> bool {
        self.timed_out
    }
}

/// A condition variable for use with [`InstrumentedMutex`] via
/// [`UniqueLock`].
///
/// Internally this wraps the standard library's `Condvar`, paired with a
/// dummy signalling mutex rather than the caller's data mutex (the data
/// mutex is a raw OS mutex, not a `std::sync::Mutex`, so it cannot itself
/// back a `std::sync::Condvar`). The protocol is the textbook one: release
/// the data mutex, block on the internal condvar, reacquire the data mutex.
pub struct ConditionVariable {
    inner: StdCondvar,
    signal: StdMutex<u64>,
    /// Best-effort record of which thread most recently issued a notify,
    /// surfaced in descriptor dumps; this is a diagnostic hint, not a
    /// guaranteed causal link for spuriously-woken or multiply-notified
    /// waiters.
    last_notifier: AtomicU64,
}

impl ConditionVariable {
    /// Creates a new, unnotified condition variable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: StdCondvar::new(),
            signal: StdMutex::new(0),
            last_notifier: AtomicU64::new(0),
        }
    }

    fn release_for_wait<'a, T: ?Sized>(&self, lock: &mut UniqueLock<'a, T>) -> &'a InstrumentedMutex<T> {
        let guard = lock.take_guard().expect("ConditionVariable::wait: lock is not held");
        let handle = guard.handle();
        let order = guard.order();
        let mutex = guard.mutex();
        std::mem::forget(guard);
        mutex.raw_unlock_bare();

        let info = current_thread_info();
        info.push_held_for_cv(handle, order, self.last_notifier.load(Ordering::Relaxed));
        mutex
    }

    fn reacquire_after_wait<'a, T: ?Sized>(&self, lock: &mut UniqueLock<'a, T>, mutex: &'a InstrumentedMutex<T>) {
        mutex.raw_lock_bare();
        current_thread_info().remove_held_for_cv(mutex.handle(), mutex.order());
        lock.set_guard(InstrumentedMutexGuard::from_raw(mutex));
    }

    /// Blocks until notified. Spurious wakes are possible; callers needing
    /// a predicate should use [`ConditionVariable::wait_while`].
    pub fn wait<'a, T: ?Sized>(&self, mut lock: UniqueLock<'a, T>) -> UniqueLock<'a, T> {
        let mutex = self.release_for_wait(&mut lock);
        {
            let signalled = self.signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let _guard = self.inner.wait(signalled).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        self.reacquire_after_wait(&mut lock, mutex);
        lock
    }

    /// Blocks until `predicate` returns `false`, reacquiring the mutex
    /// between each spurious or real wake and re-running the predicate —
    /// the classic `while (predicate) wait()` loop, which also correctly
    /// re-enters the condvar's wait scope bookkeeping on every iteration
    /// rather than only once for the whole call.
    pub fn wait_while<'a, T: ?Sized, F>(&self, mut lock: UniqueLock<'a, T>, mut predicate: F) -> UniqueLock<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while predicate(&mut lock) {
            lock = self.wait(lock);
        }
        lock
    }

    /// Blocks until notified or `timeout` elapses.
    #[must_use]
    pub fn wait_timeout<'a, T: ?Sized>(
        &self,
        mut lock: UniqueLock<'a, T>,
        timeout: Duration,
    ) -> (UniqueLock<'a, T>, WaitTimeoutResult) {
        let mutex = self.release_for_wait(&mut lock);
        let timed_out = {
            let signalled = self.signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let (_guard, result) = self
                .inner
                .wait_timeout(signalled, timeout)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            result.timed_out()
        };
        self.reacquire_after_wait(&mut lock, mutex);
        (lock, WaitTimeoutResult { timed_out })
    }

    /// Blocks until `predicate` returns `false` or `timeout` elapses total,
    /// re-checking the predicate after every wake.
    pub fn wait_timeout_while<'a, T: ?Sized, F>(
        &self,
        mut lock: UniqueLock<'a, T>,
        timeout: Duration,
        mut predicate: F,
    ) -> (UniqueLock<'a, T>, WaitTimeoutResult)
    where
        F: FnMut(&mut T) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if !predicate(&mut lock) {
                return (lock, WaitTimeoutResult { timed_out: false });
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return (lock, WaitTimeoutResult { timed_out: true });
            }
            let (new_lock, result) = self.wait_timeout(lock, deadline - now);
            lock = new_lock;
            if result.timed_out() {
                return (lock, WaitTimeoutResult { timed_out: true });
            }
        }
    }

    /// Wakes one waiting thread, if any, and records this thread as the
    /// most recent notifier.
    pub fn notify_one(&self) {
        self.last_notifier.store(current_tid(), Ordering::Relaxed);
        *self.signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        self.inner.notify_one();
    }

    /// Wakes every waiting thread and records this thread as the most
    /// recent notifier.
    pub fn notify_all(&self) {
        self.last_notifier.store(current_tid(), Ordering::Relaxed);
        *self.signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        self.inner.notify_all();
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::order::Order;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn notify_one_wakes_a_single_waiter() {
        let mutex = Arc::new(InstrumentedMutex::with_order(Order::ThreadBase, false));
        let cv = Arc::new(ConditionVariable::new());

        let (m2, cv2) = (Arc::clone(&mutex), Arc::clone(&cv));
        let waiter = thread::spawn(move || {
            let lock = UniqueLock::new(&m2);
            let lock = cv2.wait_while(lock, |ready| !*ready);
            assert!(*lock);
        });

        thread::sleep(Duration::from_millis(20));
        {
            let mut lock = UniqueLock::new(&mutex);
            *lock = true;
        }
        cv.notify_one();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_timeout_reports_timeout_when_never_notified() {
        let mutex = InstrumentedMutex::with_order(Order::RingBuffer, ());
        let cv = ConditionVariable::new();
        let lock = UniqueLock::new(&mutex);
        let (_, result) = cv.wait_timeout(lock, Duration::from_millis(30));
        assert!(result.timed_out());
    }

    #[test]
    fn cv_wait_restores_held_stack_entry_after_wake() {
        let mutex = Arc::new(InstrumentedMutex::with_order(Order::EffectChain, 0u32));
        let cv = Arc::new(ConditionVariable::new());

        let (m2, cv2) = (Arc::clone(&mutex), Arc::clone(&cv));
        let waiter = thread::spawn(move || {
            let lock = UniqueLock::new(&m2);
            let lock = cv2.wait_while(lock, |v| *v == 0);
            let info = current_thread_info();
            assert_eq!(info.held_stack().physical_size(), 1);
            drop(lock);
        });

        thread::sleep(Duration::from_millis(20));
        {
            let mut lock = UniqueLock::new(&mutex);
            *lock = 1;
        }
        cv.notify_all();
        waiter.join().unwrap();
    }
}
