//! Deadlock-free acquisition of several mutexes of the same order-tagged
//! type as a single scope.
//!
//! Mutexes sharing an [`Order`](crate::order::Order) are ordinary siblings
//! to each other — [`crate::thread_info::ThreadMutexInfo::check_held`] would
//! flag a second same-order acquisition as recursion, which is correct for
//! an *unrelated* second lock but wrong for a caller that means to hold a
//! known, fixed set of same-order mutexes together. [`ScopedLock`] handles
//! that case explicitly: it establishes the hierarchy check once, against
//! the lowest-ordered member of the set and the thread's pre-existing held
//! stack, then acquires the rest without the sibling-order check, always in
//! a canonical (order, handle) sequence so two threads racing to lock an
//! overlapping set never deadlock against each other.

use std::ops::{Index, IndexMut};

use crate::guards::LockGuardWithoutOrderCheck;
use crate::mutex::InstrumentedMutex;

/// Holds guards for every mutex in a [`ScopedLock::new`] call, indexable in
/// the same order the mutex references were passed in.
pub struct ScopedLock<'a, T> {
    guards: Vec<LockGuardWithoutOrderCheck<'a, T>>,
}

impl<'a, T> ScopedLock<'a, T> {
    /// Locks every mutex in `mutexes`, in ascending `(order, handle)`
    /// sequence, and returns a scope holding all of them. Panics if
    /// `mutexes` is empty.
    #[must_use]
    pub fn new(mutexes: &[&'a InstrumentedMutex<T>]) -> Self {
        assert!(!mutexes.is_empty(), "ScopedLock::new requires at least one mutex");

        let mut acquisition_order: Vec<usize> = (0..mutexes.len()).collect();
        acquisition_order.sort_by_key(|&i| (mutexes[i].order(), mutexes[i].handle().to_bits()));

        let mut guards: Vec<Option<LockGuardWithoutOrderCheck<'a, T>>> = (0..mutexes.len()).map(|_| None).collect();
        for (rank, &i) in acquisition_order.iter().enumerate() {
            let guard = if rank == 0 {
                // Only the lowest-ordered member is checked against the
                // thread's pre-existing held stack; the rest are siblings
                // of a single logical acquisition.
                LockGuardWithoutOrderCheck::new(mutexes[i].lock())
            } else {
                mutexes[i].lock_without_order_check()
            };
            guards[i] = Some(guard);
        }

        Self {
            guards: guards.into_iter().map(|g| g.expect("every index locked exactly once")).collect(),
        }
    }

    /// Number of mutexes held by this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// True when this scope holds no mutexes — never constructible via
    /// [`ScopedLock::new`], present for completeness with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl<'a, T> Index<usize> for ScopedLock<'a, T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.guards[i]
    }
}

impl<'a, T> IndexMut<usize> for ScopedLock<'a, T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.guards[i]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::current::current_thread_info;
    use crate::order::Order;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn locks_every_member_and_preserves_index_order() {
        let a = InstrumentedMutex::with_order(Order::AudioTrackClient, 1);
        let b = InstrumentedMutex::with_order(Order::AudioTrackClient, 2);
        let c = InstrumentedMutex::with_order(Order::AudioTrackClient, 3);

        let mut scope = ScopedLock::new(&[&a, &b, &c]);
        assert_eq!(scope.len(), 3);
        assert_eq!(scope[0], 1);
        assert_eq!(scope[1], 2);
        assert_eq!(scope[2], 3);
        scope[0] = 10;
        assert_eq!(scope[0], 10);
        drop(scope);
        assert_eq!(*a.lock(), 10);
    }

    #[test]
    fn same_order_siblings_do_not_trigger_recursion_panic() {
        let a = InstrumentedMutex::with_order(Order::EffectHandle, ());
        let b = InstrumentedMutex::with_order(Order::EffectHandle, ());
        let _scope = ScopedLock::new(&[&a, &b]); // must not panic
    }

    #[test]
    fn released_on_drop() {
        let a = InstrumentedMutex::with_order(Order::PatchPanel, 0);
        let b = InstrumentedMutex::with_order(Order::PatchPanel, 0);
        {
            let _scope = ScopedLock::new(&[&a, &b]);
        }
        let info = current_thread_info();
        assert_eq!(info.held_stack().physical_size(), 0);
        assert!(a.try_lock().is_some());
    }

    #[test]
    fn concurrent_threads_locking_overlapping_sets_in_different_orders_do_not_deadlock() {
        let a = Arc::new(InstrumentedMutex::with_order(Order::VolumeHandler, 0u32));
        let b = Arc::new(InstrumentedMutex::with_order(Order::VolumeHandler, 0u32));

        let (a1, b1) = (Arc::clone(&a), Arc::clone(&b));
        let t1 = thread::spawn(move || {
            for _ in 0..200 {
                let mut s = ScopedLock::new(&[&a1, &b1]);
                s[0] += 1;
                s[1] += 1;
            }
        });
        let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
        let t2 = thread::spawn(move || {
            for _ in 0..200 {
                let mut s = ScopedLock::new(&[&b2, &a2]);
                s[0] += 1;
                s[1] += 1;
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();
        assert_eq!(*a.lock(), 400);
        assert_eq!(*b.lock(), 400);
    }
}
