//! Per-category contention statistics.
//!
//! One [`CategoryStats`] exists per [`Order`] value, process-lifetime,
//! shared by every mutex of that order. Readers may observe the five
//! counters slightly out of sync with each other — this is an accepted
//! consequence of using independent relaxed atomics instead of a lock.

use std::fmt;
use std::sync::OnceLock;

use crate::atomics::{accumulate_f64, RelaxedAtomicF64, RelaxedAtomicU64};
use crate::order::{Order, ORDER_COUNT};

/// Lock/unlock/wait counters and wait-time moments for a single capability
/// order.
#[derive(Debug, Default)]
pub struct CategoryStats {
    locks: RelaxedAtomicU64,
    unlocks: RelaxedAtomicU64,
    waits: RelaxedAtomicU64,
    wait_sum_ns: RelaxedAtomicF64,
    wait_sumsq_ns: RelaxedAtomicF64,
}

impl CategoryStats {
    fn new() -> Self {
        Self {
            locks: RelaxedAtomicU64::new(0),
            unlocks: RelaxedAtomicU64::new(0),
            waits: RelaxedAtomicU64::new(0),
            wait_sum_ns: RelaxedAtomicF64::new(0.0),
            wait_sumsq_ns: RelaxedAtomicF64::new(0.0),
        }
    }

    /// Records a successful lock acquisition.
    #[inline]
    pub fn increment_locks(&self) {
        self.locks.fetch_add(1);
    }

    /// Records a mutex unlock.
    #[inline]
    pub fn increment_unlocks(&self) {
        self.unlocks.fetch_add(1);
    }

    /// Records that the thread had to wait before acquiring.
    #[inline]
    pub fn increment_waits(&self) {
        self.waits.fetch_add(1);
    }

    /// Adds a sampled wait duration (nanoseconds) to the running moments.
    /// This is the only sanctioned way to update the wait-time sums.
    #[inline]
    pub fn accumulate_wait_ns(&self, dt_ns: f64) {
        accumulate_f64(&self.wait_sum_ns, dt_ns);
        accumulate_f64(&self.wait_sumsq_ns, dt_ns * dt_ns);
    }

    /// Snapshots the counters into a textual record.
    #[must_use]
    pub fn snapshot(&self, order: Order) -> CategorySnapshot {
        let locks = self.locks.load();
        let unlocks = self.unlocks.load();
        let waits = self.waits.load();
        let sum = self.wait_sum_ns.load();
        let sumsq = self.wait_sumsq_ns.load();

        let uncontested = locks.saturating_sub(waits);
        let mean_ns = if waits > 0 { sum / waits as f64 } else { 0.0 };
        let stddev_ns = sample_stddev(waits, sum, sumsq);

        CategorySnapshot {
            order,
            locks,
            uncontested,
            waits,
            unlocks,
            mean_wait_ms: mean_ns / 1_000_000.0,
            stddev_wait_ms: stddev_ns / 1_000_000.0,
        }
    }
}

/// Sample standard deviation of wait times; zero for fewer than two samples
/// (mathematically undefined there, reported as zero rather than `NaN`).
fn sample_stddev(n: u64, sum: f64, sumsq: f64) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean = sum / nf;
    let variance = (sumsq - nf * mean * mean) / (nf - 1.0);
    if variance <= 0.0 {
        0.0
    } else {
        variance.sqrt()
    }
}

/// A point-in-time, best-effort-consistent snapshot of one order's counters.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CategorySnapshot {
    #[serde(skip)]
    order: Order,
    /// Total lock acquisitions.
    pub locks: u64,
    /// `locks - waits`: acquisitions that did not block.
    pub uncontested: u64,
    /// Total times the thread had to block before acquiring.
    pub waits: u64,
    /// Total unlocks.
    pub unlocks: u64,
    /// Mean wait time, milliseconds.
    pub mean_wait_ms: f64,
    /// Sample standard deviation of wait time, milliseconds.
    pub stddev_wait_ms: f64,
}

impl fmt::Display for CategorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} locks={:<8} uncontested={:<8} waits={:<8} unlocks={:<8} mean_wait_ms={:<10.4} stddev_wait_ms={:.4}",
            self.order.name(),
            self.locks,
            self.uncontested,
            self.waits,
            self.unlocks,
            self.mean_wait_ms,
            self.stddev_wait_ms,
        )
    }
}

/// The process-wide table of per-order statistics, one entry per [`Order`].
pub struct CategoryStatsTable {
    entries: [CategoryStats; ORDER_COUNT],
}

impl CategoryStatsTable {
    fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| CategoryStats::new()),
        }
    }

    /// Returns the statistics record for `order`.
    #[must_use]
    pub fn for_order(&self, order: Order) -> &CategoryStats {
        &self.entries[order.ordinal()]
    }

    /// Snapshots every order with at least one recorded lock.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<CategorySnapshot> {
        (0..ORDER_COUNT)
            .filter_map(|ord| {
                let order = Order::from_ordinal(ord)?;
                let snap = self.entries[ord].snapshot(order);
                (snap.locks > 0).then_some(snap)
            })
            .collect()
    }
}

/// Returns the single process-wide statistics table.
#[must_use]
pub fn global_stats() -> &'static CategoryStatsTable {
    static TABLE: OnceLock<CategoryStatsTable> = OnceLock::new();
    TABLE.get_or_init(CategoryStatsTable::new)
}

/// Renders every non-empty category's statistics as newline-separated text.
#[must_use]
pub fn all_stats_to_string() -> String {
    global_stats()
        .snapshot_all()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
