//! Deadlock-cycle detection: walks the wait graph formed by every live
//! thread's held stack plus auxiliary (non-mutex) wait edges.
//!
//! The graph has one node per live thread. An edge `A -> B` exists when `A`
//! is blocked trying to acquire a mutex `B` currently holds, or when `A` is
//! blocked in a condition-variable wait, thread join, or queue operation
//! naming `B`. A deadlock is a cycle in this graph reachable from the
//! thread under inspection.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::handle::MutexHandle;
use crate::order::Order;
use crate::registry::global_registry;
use crate::thread_info::WaitReason;

/// One hop in a wait chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Blocked trying to acquire a mutex of `order` held by `tid`.
    Mutex { tid: u64, order: Order },
    /// Blocked on a non-mutex wait (`reason`) naming `tid`, with `order`
    /// carried over from the mutex the waiter released to enter the wait
    /// (e.g. a condition-variable wait), or [`Order::Other`] when there is
    /// none (join, queue).
    Auxiliary { tid: u64, reason: WaitReason, order: Order },
}

impl ChainLink {
    /// The tid this link points to.
    #[must_use]
    pub fn target_tid(self) -> u64 {
        match self {
            ChainLink::Mutex { tid, .. } => tid,
            ChainLink::Auxiliary { tid, .. } => tid,
        }
    }
}

impl fmt::Display for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainLink::Mutex { tid, order } => write!(f, "waits on {} held by tid={tid}", order.name()),
            ChainLink::Auxiliary { tid, reason, order } if *order == Order::Other => {
                write!(f, "waits ({reason}) on tid={tid}")
            }
            ChainLink::Auxiliary { tid, reason, order } => {
                write!(f, "waits ({reason}) on tid={tid}, released {}", order.name())
            }
        }
    }
}

/// The outcome of tracing a thread's wait chain.
#[derive(Debug, Clone)]
pub struct DeadlockInfo {
    /// The thread the trace started from.
    pub target_tid: u64,
    /// The chain of hops, in traversal order starting from `target_tid`.
    pub chain: Vec<ChainLink>,
    /// True when the chain loops back onto a thread already in it — an
    /// actual deadlock cycle, not just a long (but resolvable) wait chain.
    pub cycle: bool,
}

impl fmt::Display for DeadlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid={}", self.target_tid)?;
        for link in &self.chain {
            write!(f, " -> {link}")?;
        }
        if self.cycle {
            write!(f, " (cycle)")?;
        }
        Ok(())
    }
}

/// Traces `target_tid`'s wait chain against the live thread registry.
///
/// Returns `None` when `target_tid` is not currently blocked on anything.
/// Returns `Some` with `cycle = false` for a chain that terminates (the
/// last thread in it is not blocked, or points at a mutex/thread no longer
/// tracked — a race with the condition resolving is in progress). Returns
/// `Some` with `cycle = true` when the chain loops back on a tid already
/// visited: a genuine deadlock.
#[must_use]
pub fn deadlock_detection(target_tid: u64) -> Option<DeadlockInfo> {
    let threads = global_registry().snapshot_live();

    let mut owners: HashMap<MutexHandle, (u64, Order)> = HashMap::new();
    for thread in &threads {
        for entry in thread.held_stack().snapshot() {
            owners.insert(entry.handle, (thread.tid(), entry.order));
        }
    }
    let by_tid: HashMap<u64, _> = threads.iter().map(|t| (t.tid(), t)).collect();

    let mut visited = HashSet::new();
    let mut chain = Vec::new();
    let mut current = target_tid;

    loop {
        if !visited.insert(current) {
            return Some(DeadlockInfo {
                target_tid,
                chain,
                cycle: true,
            });
        }

        let Some(info) = by_tid.get(&current) else {
            return non_empty(target_tid, chain);
        };

        let waiting = info.waiting_handle();
        if !waiting.is_none() {
            match owners.get(&waiting) {
                Some(&(owner_tid, order)) => {
                    chain.push(ChainLink::Mutex { tid: owner_tid, order });
                    current = owner_tid;
                    continue;
                }
                None => return non_empty(target_tid, chain),
            }
        }

        let (other_tid, reason, order) = info.other_wait();
        if reason != WaitReason::None && other_tid != 0 {
            chain.push(ChainLink::Auxiliary {
                tid: other_tid,
                reason,
                order,
            });
            current = other_tid;
            continue;
        }

        return non_empty(target_tid, chain);
    }
}

fn non_empty(target_tid: u64, chain: Vec<ChainLink>) -> Option<DeadlockInfo> {
    if chain.is_empty() {
        None
    } else {
        Some(DeadlockInfo {
            target_tid,
            chain,
            cycle: false,
        })
    }
}
