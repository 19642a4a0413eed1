//! The instrumented mutex: an exclusive lock tagged with a capability
//! [`Order`], performing pre-lock order/recursion checking, timed and plain
//! acquisition, statistics accumulation, and coordinated updates to the
//! calling thread's descriptor.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::current::current_thread_info;
use crate::error::{fatal, invalid_unlock_message, order_inversion_message, recursion_message};
use crate::handle::MutexHandle;
use crate::order::Order;
use crate::os_mutex::RawOsMutex;
use crate::stats::{global_stats, CategoryStats};
use crate::thread_info::HeldCheck;

/// An exclusive mutex tagged with a fixed capability order.
///
/// Construction selects the OS priority-inheritance protocol from the
/// process configuration by default; [`InstrumentedMutex::with_order_and_pi`]
/// overrides it per instance for call sites that need to opt in or out
/// regardless of the process default.
pub struct InstrumentedMutex<T: ?Sized> {
    raw: RawOsMutex,
    order: Order,
    stats: &'static CategoryStats,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for InstrumentedMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for InstrumentedMutex<T> {}

impl<T> InstrumentedMutex<T> {
    /// Creates a new mutex tagged with [`Order::other`], using the process
    /// default for priority inheritance.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_order(Order::other(), value)
    }

    /// Creates a new mutex tagged with `order`, using the process default
    /// for priority inheritance.
    #[must_use]
    pub fn with_order(order: Order, value: T) -> Self {
        Self::with_order_and_pi(order, Config::global().priority_inheritance_enabled, value)
    }

    /// Creates a new mutex tagged with `order`, overriding the process
    /// default for priority inheritance.
    #[must_use]
    pub fn with_order_and_pi(order: Order, priority_inheritance: bool, value: T) -> Self {
        Self {
            raw: RawOsMutex::new(priority_inheritance),
            order,
            stats: global_stats().for_order(order),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> InstrumentedMutex<T> {
    /// This mutex's capability order.
    #[must_use]
    pub fn order(&self) -> Order {
        self.order
    }

    /// An opaque, stable handle for this mutex instance.
    #[must_use]
    pub fn handle(&self) -> MutexHandle {
        MutexHandle::from_ptr(self)
    }

    fn tracking_enabled() -> bool {
        Config::global().mutex_tracking_enabled
    }

    /// Runs the pre-lock order/recursion check. Fatal branches log then
    /// panic via [`crate::error::fatal`]; non-fatal branches are silently
    /// tolerated per the process configuration. `checked = false` skips the
    /// check entirely, for [`crate::guards::LockGuardWithoutOrderCheck`].
    /// Does not touch the waiting-handle marker: that is only set once the
    /// caller's non-blocking try-lock has actually failed.
    fn pre_lock(&self, checked: bool) {
        if !checked || !Self::tracking_enabled() {
            return;
        }
        let info = current_thread_info();
        let cfg = Config::global();
        match info.check_held(self.handle(), self.order) {
            HeldCheck::Ok => {}
            HeldCheck::Inversion(held) => {
                if cfg.abort_on_order_check {
                    fatal(format_args!("{}", order_inversion_message(held.order, self.order)));
                } else {
                    tracing::warn!(
                        target: "mutrace",
                        held = held.order.name(),
                        attempted = self.order.name(),
                        "order inversion tolerated (abort_on_order_check disabled)"
                    );
                }
            }
            HeldCheck::Recursion(_) => {
                if cfg.abort_on_recursion_check {
                    fatal(format_args!("{}", recursion_message(self.order)));
                } else {
                    tracing::warn!(
                        target: "mutrace",
                        order = self.order.name(),
                        "recursive acquisition tolerated (abort_on_recursion_check disabled)"
                    );
                }
            }
        }
    }

    /// Runs the post-lock bookkeeping: counts the acquisition and pushes
    /// the held entry.
    fn post_lock(&self) {
        if !Self::tracking_enabled() {
            return;
        }
        self.stats.increment_locks();
        let info = current_thread_info();
        info.reset_waiter(MutexHandle::NONE);
        info.push_held(self.handle(), self.order);
    }

    /// Runs the pre-unlock bookkeeping: counts the unlock and removes the
    /// handle from the held stack.
    fn pre_unlock(&self) {
        if !Self::tracking_enabled() {
            return;
        }
        self.stats.increment_unlocks();
        let info = current_thread_info();
        if !info.remove_held(self.handle()) && Config::global().abort_on_invalid_unlock {
            fatal(format_args!("{}", invalid_unlock_message(self.order)));
        }
    }

    /// Acquires the mutex, blocking until it is available.
    pub fn lock(&self) -> InstrumentedMutexGuard<'_, T> {
        self.lock_checked(true)
    }

    /// Acquires the mutex without running the order/recursion check,
    /// for [`crate::guards::LockGuardWithoutOrderCheck`]. Held-stack and
    /// statistics bookkeeping still run in full.
    pub(crate) fn lock_unchecked(&self) -> InstrumentedMutexGuard<'_, T> {
        self.lock_checked(false)
    }

    fn lock_checked(&self, checked: bool) -> InstrumentedMutexGuard<'_, T> {
        self.pre_lock(checked);

        if !self.raw.try_lock() {
            // The non-blocking try-lock failed: only now mark the
            // descriptor as waiting on this handle, so a concurrent
            // deadlock trace never observes a "waiting" thread that was
            // actually just about to succeed uncontested.
            if Self::tracking_enabled() {
                current_thread_info().reset_waiter(self.handle());
                self.stats.increment_waits();
            }
            let start = Instant::now();
            self.raw.lock();
            if Self::tracking_enabled() {
                let dt_ns = start.elapsed().as_nanos() as f64;
                self.stats.accumulate_wait_ns(dt_ns);
                current_thread_info().reset_waiter(MutexHandle::NONE);
            }
        }

        self.post_lock();
        InstrumentedMutexGuard { lock: self }
    }

    /// Attempts to acquire the mutex without blocking.
    #[must_use]
    pub fn try_lock(&self) -> Option<InstrumentedMutexGuard<'_, T>> {
        self.pre_lock(true);
        if self.raw.try_lock() {
            self.post_lock();
            Some(InstrumentedMutexGuard { lock: self })
        } else {
            None
        }
    }

    /// Attempts to acquire the mutex, blocking at most `timeout_ns`
    /// nanoseconds. A zero or negative timeout performs a single
    /// non-blocking try; wait-time accounting is discarded on timeout.
    #[must_use]
    pub fn try_lock_for_ns(&self, timeout_ns: i64) -> Option<InstrumentedMutexGuard<'_, T>> {
        if timeout_ns <= 0 {
            return self.try_lock();
        }
        self.pre_lock(true);
        if self.raw.try_lock() {
            self.post_lock();
            return Some(InstrumentedMutexGuard { lock: self });
        }
        if Self::tracking_enabled() {
            current_thread_info().reset_waiter(self.handle());
            self.stats.increment_waits();
        }
        let start = Instant::now();
        let acquired = self.raw.try_lock_for(Duration::from_nanos(timeout_ns as u64));
        if acquired {
            if Self::tracking_enabled() {
                let dt_ns = start.elapsed().as_nanos() as f64;
                self.stats.accumulate_wait_ns(dt_ns);
                current_thread_info().reset_waiter(MutexHandle::NONE);
            }
            self.post_lock();
            Some(InstrumentedMutexGuard { lock: self })
        } else {
            if Self::tracking_enabled() {
                current_thread_info().reset_waiter(MutexHandle::NONE);
            }
            None
        }
    }

    /// Acquires the mutex directly, bypassing both the pre-lock check and
    /// all statistics/held-stack bookkeeping. Used internally by
    /// [`crate::condvar::ConditionVariable`] to reacquire after a wait,
    /// where the held-stack entry is restored explicitly instead.
    pub(crate) fn raw_lock_bare(&self) {
        self.raw.lock();
    }

    /// Releases the OS mutex directly, without touching statistics or the
    /// held stack. Paired with [`InstrumentedMutex::raw_lock_bare`].
    pub(crate) fn raw_unlock_bare(&self) {
        self.raw.unlock();
    }

    /// Returns a mutable reference to the underlying data; no locking is
    /// required because `&mut self` statically guarantees no other
    /// reference exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub(crate) fn raw_unlock(&self) {
        self.pre_unlock();
        self.raw.unlock();
    }
}

impl<T: ?Sized + Default> Default for InstrumentedMutex<T> {
    fn default() -> Self {
        InstrumentedMutex::new(Default::default())
    }
}

impl<T> From<T> for InstrumentedMutex<T> {
    fn from(value: T) -> Self {
        InstrumentedMutex::new(value)
    }
}

/// RAII guard for [`InstrumentedMutex::lock`]. Unlocks on drop.
#[must_use]
pub struct InstrumentedMutexGuard<'a, T: ?Sized + 'a> {
    lock: &'a InstrumentedMutex<T>,
}

impl<'a, T: ?Sized> InstrumentedMutexGuard<'a, T> {
    /// The handle of the mutex this guard locks, exposed for the condition
    /// variable wrapper.
    #[must_use]
    pub fn handle(&self) -> MutexHandle {
        self.lock.handle()
    }

    /// The order of the mutex this guard locks.
    #[must_use]
    pub fn order(&self) -> Order {
        self.lock.order
    }

    pub(crate) fn mutex(&self) -> &'a InstrumentedMutex<T> {
        self.lock
    }

    /// Rebuilds a guard directly from a mutex reference, without running
    /// the lock acquisition path. Used by [`crate::condvar::ConditionVariable`]
    /// once it has reacquired the raw OS mutex and restored the held-stack
    /// entry itself.
    pub(crate) fn from_raw(lock: &'a InstrumentedMutex<T>) -> Self {
        Self { lock }
    }
}

impl<'a, T: ?Sized> Deref for InstrumentedMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for InstrumentedMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for InstrumentedMutexGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw_unlock();
    }
}
