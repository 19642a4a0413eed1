//! Per-thread descriptor: what a thread is waiting on, and what it holds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::atomics::UnorderedAtomic;
use crate::config::Config;
use crate::handle::MutexHandle;
use crate::order::Order;
use crate::stack::{HeldStack, StackEntry};

/// Why a thread is blocked on something other than a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Not blocked on an auxiliary wait.
    None,
    /// Blocked inside a condition-variable wait.
    Cv,
    /// Blocked joining another thread.
    Join,
    /// Blocked sending to / receiving from a queue.
    Queue,
}

impl WaitReason {
    fn to_u8(self) -> u8 {
        match self {
            WaitReason::None => 0,
            WaitReason::Cv => 1,
            WaitReason::Join => 2,
            WaitReason::Queue => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => WaitReason::Cv,
            2 => WaitReason::Join,
            3 => WaitReason::Queue,
            _ => WaitReason::None,
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitReason::None => "none",
            WaitReason::Cv => "cv",
            WaitReason::Join => "join",
            WaitReason::Queue => "queue",
        };
        write!(f, "{s}")
    }
}

/// The auxiliary, non-mutex wait slot: who this thread is waiting on and why.
#[derive(Debug)]
struct OtherWait {
    tid: AtomicU64,
    reason: UnorderedAtomic<u32>,
    order: UnorderedAtomic<u32>,
}

impl OtherWait {
    fn new() -> Self {
        Self {
            tid: AtomicU64::new(0),
            reason: UnorderedAtomic::new(WaitReason::None.to_u8() as u32),
            order: UnorderedAtomic::new(Order::Other.ordinal() as u32),
        }
    }

    fn set(&self, tid: u64, reason: WaitReason, order: Order) {
        self.tid.store(tid, Ordering::Relaxed);
        self.order.set(order.ordinal() as u32);
        self.reason.set(reason.to_u8() as u32);
    }

    fn clear(&self) {
        self.reason.set(WaitReason::None.to_u8() as u32);
        self.tid.store(0, Ordering::Relaxed);
    }

    fn get(&self) -> (u64, WaitReason, Order) {
        let reason = WaitReason::from_u8(self.reason.get() as u8);
        let tid = self.tid.load(Ordering::Relaxed);
        let order = Order::from_ordinal(self.order.get() as usize).unwrap_or(Order::Other);
        (tid, reason, order)
    }
}

/// The outcome of checking a proposed acquisition against the held stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeldCheck {
    /// The acquisition is safe: the proposed order is strictly greater than
    /// every currently-held order and the handle is not already held.
    Ok,
    /// The thread already holds a mutex of a strictly greater order: this
    /// acquisition would invert the hierarchy.
    Inversion(StackEntry),
    /// The thread already holds a mutex of the *same* order (or the exact
    /// same mutex): recursive acquisition.
    Recursion(StackEntry),
}

/// Per-thread descriptor: identity, current mutex wait, auxiliary wait, and
/// the stack of mutexes currently held.
pub struct ThreadMutexInfo {
    tid: u64,
    waiting_handle: UnorderedAtomic<usize>,
    other_wait: OtherWait,
    held: HeldStack,
}

impl ThreadMutexInfo {
    /// Creates a descriptor for `tid` with a held-stack sized from the
    /// process configuration.
    #[must_use]
    pub fn new(tid: u64) -> Self {
        Self {
            tid,
            waiting_handle: UnorderedAtomic::new(0),
            other_wait: OtherWait::new(),
            held: HeldStack::with_capacity(Config::global().mutex_stack_depth),
        }
    }

    /// This thread's id, as reported by the host accessor.
    #[must_use]
    pub fn tid(&self) -> u64 {
        self.tid
    }

    /// The mutex handle this thread is currently blocked trying to acquire,
    /// or [`MutexHandle::NONE`].
    #[must_use]
    pub fn waiting_handle(&self) -> MutexHandle {
        MutexHandle::from_bits(self.waiting_handle.get())
    }

    /// Sets or clears (`handle = MutexHandle::NONE`) the "currently blocked
    /// on" marker. Writer is always this thread itself.
    pub fn reset_waiter(&self, handle: MutexHandle) {
        self.waiting_handle.set(handle.to_bits());
    }

    /// The auxiliary wait state: `(notifier tid, reason, order)`.
    #[must_use]
    pub fn other_wait(&self) -> (u64, WaitReason, Order) {
        self.other_wait.get()
    }

    /// Read-only access to the held stack, for the registry traversal.
    #[must_use]
    pub fn held_stack(&self) -> &HeldStack {
        &self.held
    }

    /// Scans the held stack from top downward for a conflict with
    /// `(handle, order)`.
    #[must_use]
    pub fn check_held(&self, handle: MutexHandle, order: Order) -> HeldCheck {
        let entries = self.held.snapshot();
        for entry in entries.into_iter().rev() {
            if entry.handle == handle {
                return HeldCheck::Recursion(entry);
            }
            if entry.order == order {
                return HeldCheck::Recursion(entry);
            }
            if entry.order > order {
                return HeldCheck::Inversion(entry);
            }
        }
        HeldCheck::Ok
    }

    /// Pushes `(handle, order)` onto the held stack. Callers must have
    /// already run [`ThreadMutexInfo::check_held`].
    pub fn push_held(&self, handle: MutexHandle, order: Order) {
        self.held.push(StackEntry { handle, order });
    }

    /// Removes `handle` from the held stack.
    #[must_use]
    pub fn remove_held(&self, handle: MutexHandle) -> bool {
        self.held.remove(handle)
    }

    /// During a condition-variable wait, releases the mutex from the held
    /// stack but records the auxiliary wait as `(cv, notifier_tid, order)`
    /// so the deadlock detector can traverse through the wait.
    pub fn push_held_for_cv(&self, handle: MutexHandle, order: Order, notifier_tid: u64) {
        self.held.remove(handle);
        self.other_wait.set(notifier_tid, WaitReason::Cv, order);
    }

    /// Called when the condition-variable wait resumes and the mutex has
    /// been reacquired: clears the auxiliary wait and restores the held
    /// entry.
    pub fn remove_held_for_cv(&self, handle: MutexHandle, order: Order) {
        self.other_wait.clear();
        self.held.push(StackEntry { handle, order });
    }

    /// Marks this thread as waiting to join `tid`.
    pub fn add_wait_join(&self, tid: u64) {
        self.other_wait.set(tid, WaitReason::Join, Order::Other);
    }

    /// Clears a join wait.
    pub fn remove_wait_join(&self) {
        self.other_wait.clear();
    }

    /// Marks this thread as waiting on a queue operation involving `tid`.
    pub fn add_wait_queue(&self, tid: u64) {
        self.other_wait.set(tid, WaitReason::Queue, Order::Other);
    }

    /// Clears a queue wait.
    pub fn remove_wait_queue(&self) {
        self.other_wait.clear();
    }

    /// True when this thread is not blocked and holds nothing.
    #[must_use]
    pub fn empty(&self) -> bool {
        let (_, reason, _) = self.other_wait.get();
        self.waiting_handle().is_none() && reason == WaitReason::None && self.held.physical_size() == 0
    }

    /// Textual form for registry dumps.
    #[must_use]
    pub fn to_string_verbose(&self) -> String {
        let (other_tid, reason, order) = self.other_wait();
        let waiting = self.waiting_handle();
        let held: Vec<String> = self
            .held
            .snapshot()
            .iter()
            .map(|e| e.order.name().to_string())
            .collect();

        let mut parts = vec![format!("tid={}", self.tid)];
        if !waiting.is_none() {
            parts.push("waiting_on_mutex".to_string());
        }
        if reason != WaitReason::None {
            parts.push(format!("other_wait={reason}(tid={other_tid},order={})", order.name()));
        }
        parts.push(format!("held=[{}]", held.join(",")));
        parts.join(" ")
    }
}
