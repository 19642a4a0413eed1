//! An instrumented mutex runtime for latency-sensitive, multi-threaded
//! audio processes.
//!
//! Every mutex is tagged at construction with a fixed, process-wide
//! [`Order`]: a thread that holds a mutex of one order may only go on to
//! acquire a mutex of a strictly greater order, or acquisition is treated as
//! a programming error (a hierarchy inversion or a recursive/self
//! acquisition) and, depending on [`Config`], reported fatally. Each
//! thread's currently-held mutexes and any non-mutex wait (condition
//! variable, join, queue) are tracked in a per-thread descriptor registered
//! process-wide, which [`deadlock_detection`] walks to find wait cycles, and
//! [`all_stats_to_string`]/[`all_threads_to_string`] dump for diagnostics.
//!
//! ```
//! use mutrace::{InstrumentedMutex, Order};
//!
//! let low = InstrumentedMutex::with_order(Order::AudioFlinger, 0u32);
//! let high = InstrumentedMutex::with_order(Order::ThreadBase, 0u32);
//!
//! {
//!     let mut l = low.lock();
//!     *l += 1;
//!     let mut h = high.lock(); // fine: ThreadBase > AudioFlinger
//!     *h += 1;
//! }
//! ```

mod atomics;
mod condvar;
mod config;
mod current;
mod deadlock;
mod error;
mod guards;
mod handle;
mod mutex;
mod order;
mod os_mutex;
mod registry;
mod scoped_lock;
mod stack;
mod stats;
mod thread_info;
mod wait_scopes;

pub use condvar::{ConditionVariable, WaitTimeoutResult};
pub use config::Config;
pub use current::current_tid;
pub use deadlock::{deadlock_detection, ChainLink, DeadlockInfo};
pub use error::MutexError;
pub use guards::{LockGuard, LockGuardWithoutOrderCheck, UniqueLock};
pub use handle::MutexHandle;
pub use mutex::{InstrumentedMutex, InstrumentedMutexGuard};
pub use order::{Order, ORDER_COUNT};
pub use registry::all_threads_to_string;
pub use scoped_lock::ScopedLock;
pub use stats::{all_stats_to_string, global_stats, CategorySnapshot};
pub use wait_scopes::{ScopedJoinWaitCheck, ScopedQueueWaitCheck};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_surface_constructs_and_dumps() {
        let m = InstrumentedMutex::with_order(Order::ConfigCache, 0);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert!(all_stats_to_string().contains("ConfigCache"));
        assert_eq!(current_tid(), current_tid());
        let _ = all_threads_to_string();
    }
}
