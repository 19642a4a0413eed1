//! The lockless, bounded, single-writer/multi-reader held-mutex stack.
//!
//! Because the stack is written only by its owning thread, it is built from
//! plain atomic fields plus [`compiler_barrier`] rather than a general
//! concurrent data structure. Readers on other threads see each half of a
//! `(handle, order)` pair as an individually atomic load — they may observe
//! a torn *pair* (handle from one push, order from a later one) but never a
//! torn individual field.

use crate::atomics::{compiler_barrier, UnorderedAtomic};
use crate::config::DEFAULT_STACK_DEPTH;
use crate::handle::MutexHandle;
use crate::order::Order;

/// A `(handle, order)` pair as stored in a held stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    /// The mutex handle.
    pub handle: MutexHandle,
    /// The mutex's capability order.
    pub order: Order,
}

impl StackEntry {
    /// The sentinel returned for out-of-range reads.
    pub const INVALID: StackEntry = StackEntry {
        handle: MutexHandle::NONE,
        order: Order::Other,
    };

    /// True for [`StackEntry::INVALID`].
    #[must_use]
    pub fn is_invalid(self) -> bool {
        self.handle.is_none()
    }
}

/// One held-stack slot: independently-atomic handle and order fields.
struct Slot {
    handle: UnorderedAtomic<usize>,
    order: UnorderedAtomic<u32>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            handle: UnorderedAtomic::new(0),
            order: UnorderedAtomic::new(Order::Other.ordinal() as u32),
        }
    }

    fn write(&self, entry: StackEntry) {
        // Order field first so a concurrent reader never sees a handle
        // without a plausible order; both are read back independently by
        // `read`, so this only narrows (does not eliminate) the torn-pair
        // window described in the module doc comment.
        self.order.set(entry.order.ordinal() as u32);
        compiler_barrier();
        self.handle.set(handle_to_usize(entry.handle));
    }

    fn read(&self) -> StackEntry {
        let handle = usize_to_handle(self.handle.get());
        compiler_barrier();
        let order = Order::from_ordinal(self.order.get() as usize).unwrap_or(Order::Other);
        StackEntry { handle, order }
    }

    fn clear(&self) {
        self.handle.set(0);
    }
}

fn handle_to_usize(h: MutexHandle) -> usize {
    h.to_bits()
}

fn usize_to_handle(bits: usize) -> MutexHandle {
    MutexHandle::from_bits(bits)
}

/// A thread's bounded stack of held `(handle, order)` pairs.
///
/// The *logical* size (pushes minus removes) may exceed the *physical*
/// capacity `N`; when it does, the physical stack holds only the most
/// recently pushed `N` entries and readers are told the logical size
/// diverged so they can account for possible capacity loss.
pub struct HeldStack {
    slots: Vec<Slot>,
    capacity: usize,
    physical_top: UnorderedAtomic<usize>,
    logical_size: UnorderedAtomic<usize>,
}

impl HeldStack {
    /// Creates a new, empty stack with the given physical capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            capacity,
            physical_top: UnorderedAtomic::new(0),
            logical_size: UnorderedAtomic::new(0),
        }
    }

    /// Creates a stack sized to [`DEFAULT_STACK_DEPTH`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STACK_DEPTH)
    }

    /// Physical number of entries currently stored.
    #[must_use]
    pub fn physical_size(&self) -> usize {
        self.physical_top.get()
    }

    /// Logical number of entries (pushes minus removes); may exceed
    /// [`HeldStack::physical_size`] under capacity exhaustion.
    #[must_use]
    pub fn logical_size(&self) -> usize {
        self.logical_size.get()
    }

    /// True when the physical capacity has been exceeded at some point and
    /// entries may have been silently dropped from the bottom of tracking.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.logical_size() > self.physical_size()
    }

    /// Pushes `entry` at the top. Callers must have already verified (via
    /// [`crate::thread_info::ThreadMutexInfo::check_held`]) that `order` is
    /// strictly greater than the current top's order.
    pub fn push(&self, entry: StackEntry) {
        let top = self.physical_top.get();
        if top < self.capacity {
            self.slots[top].write(entry);
            self.physical_top.set(top + 1);
        } else {
            // Capacity exhaustion: overwrite the last slot, logical top
            // still advances so `overflowed` reports the divergence.
            self.slots[self.capacity - 1].write(entry);
            tracing::warn!(
                target: "mutrace",
                capacity = self.capacity,
                "held-stack capacity exhausted, oldest tracked entry retained"
            );
        }
        self.logical_size.set(self.logical_size.get() + 1);
    }

    /// Removes `handle` if present. Scans from the top downward, shifting
    /// higher entries down one slot to preserve the ascending-order
    /// invariant. If `handle` is not physically present but the logical
    /// size exceeds the physical size, the removal is accepted as the loss
    /// of a capacity-exhausted entry. Returns `false` only when `handle`
    /// is genuinely not tracked anywhere.
    pub fn remove(&self, handle: MutexHandle) -> bool {
        let top = self.physical_top.get();
        let mut found = None;
        for i in (0..top).rev() {
            if self.slots[i].read().handle == handle {
                found = Some(i);
                break;
            }
        }

        match found {
            Some(i) => {
                for j in i..top.saturating_sub(1) {
                    let next = self.slots[j + 1].read();
                    self.slots[j].write(next);
                }
                if top > 0 {
                    self.slots[top - 1].clear();
                    self.physical_top.set(top - 1);
                }
                self.logical_size.set(self.logical_size.get().saturating_sub(1));
                true
            }
            None if self.overflowed() => {
                self.logical_size.set(self.logical_size.get().saturating_sub(1));
                true
            }
            None => false,
        }
    }

    /// Reads the entry `offset` slots from the top (`0` = top), or
    /// [`StackEntry::INVALID`] when out of range.
    #[must_use]
    pub fn top(&self, offset: usize) -> StackEntry {
        let top = self.physical_top.get();
        if offset >= top {
            return StackEntry::INVALID;
        }
        self.slots[top - 1 - offset].read()
    }

    /// Reads the entry `offset` slots from the bottom (`0` = bottom), or
    /// [`StackEntry::INVALID`] when out of range.
    #[must_use]
    pub fn bottom(&self, offset: usize) -> StackEntry {
        let top = self.physical_top.get();
        if offset >= top {
            return StackEntry::INVALID;
        }
        self.slots[offset].read()
    }

    /// Returns every physically-held entry bottom-to-top. Used by the
    /// registry traversal and by formatting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StackEntry> {
        let top = self.physical_top.get();
        (0..top).map(|i| self.slots[i].read()).collect()
    }
}

impl Default for HeldStack {
    fn default() -> Self {
        Self::new()
    }
}
