//! Guard flavors beyond the default checked [`InstrumentedMutexGuard`].

use std::ops::{Deref, DerefMut};

use crate::mutex::{InstrumentedMutex, InstrumentedMutexGuard};

/// The ordinary, order-checked guard returned by [`InstrumentedMutex::lock`].
pub type LockGuard<'a, T> = InstrumentedMutexGuard<'a, T>;

/// A guard acquired without running the pre-lock order/recursion check.
///
/// Held-stack and statistics bookkeeping still happen in full — only the
/// hierarchy violation check is skipped. Intended for call sites that
/// already know a particular acquisition pattern is safe (e.g. a designed
/// exception to the capability order) and want that exception explicit in
/// the type rather than silenced through a global configuration flag.
#[must_use]
pub struct LockGuardWithoutOrderCheck<'a, T: ?Sized + 'a> {
    inner: InstrumentedMutexGuard<'a, T>,
}

impl<'a, T: ?Sized> LockGuardWithoutOrderCheck<'a, T> {
    pub(crate) fn new(inner: InstrumentedMutexGuard<'a, T>) -> Self {
        Self { inner }
    }
}

impl<'a, T: ?Sized> Deref for LockGuardWithoutOrderCheck<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<'a, T: ?Sized> DerefMut for LockGuardWithoutOrderCheck<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized> InstrumentedMutex<T> {
    /// Acquires the mutex without the order/recursion check. See
    /// [`LockGuardWithoutOrderCheck`].
    pub fn lock_without_order_check(&self) -> LockGuardWithoutOrderCheck<'_, T> {
        LockGuardWithoutOrderCheck::new(self.lock_unchecked())
    }
}

/// A manually lockable/unlockable wrapper over an [`InstrumentedMutex`],
/// analogous to a C++ `unique_lock`: used where a guard's lifetime must be
/// released and reacquired within the same scope, as
/// [`crate::condvar::ConditionVariable::wait`] does.
pub struct UniqueLock<'a, T: ?Sized> {
    mutex: &'a InstrumentedMutex<T>,
    guard: Option<InstrumentedMutexGuard<'a, T>>,
}

impl<'a, T: ?Sized> UniqueLock<'a, T> {
    /// Locks `mutex` immediately.
    #[must_use]
    pub fn new(mutex: &'a InstrumentedMutex<T>) -> Self {
        let guard = mutex.lock();
        Self {
            mutex,
            guard: Some(guard),
        }
    }

    /// Wraps `mutex` without locking it.
    #[must_use]
    pub fn unlocked(mutex: &'a InstrumentedMutex<T>) -> Self {
        Self { mutex, guard: None }
    }

    /// True when this lock currently holds the mutex.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    /// Locks the mutex, if not already locked.
    pub fn lock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.mutex.lock());
        }
    }

    /// Unlocks the mutex, if currently locked.
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    pub(crate) fn mutex(&self) -> &'a InstrumentedMutex<T> {
        self.mutex
    }

    pub(crate) fn take_guard(&mut self) -> Option<InstrumentedMutexGuard<'a, T>> {
        self.guard.take()
    }

    pub(crate) fn set_guard(&mut self, guard: InstrumentedMutexGuard<'a, T>) {
        self.guard = Some(guard);
    }
}

impl<'a, T: ?Sized> Deref for UniqueLock<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.guard.as_deref().expect("UniqueLock: not currently locked")
    }
}

impl<'a, T: ?Sized> DerefMut for UniqueLock<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().expect("UniqueLock: not currently locked")
    }
}
