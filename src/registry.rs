//! Process-wide thread registry: tid → weak reference to the thread's
//! descriptor, guarded by a dedicated internal mutex taken only around
//! insert/remove/snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::thread_info::ThreadMutexInfo;

/// Process-wide registry of live thread descriptors.
pub struct ThreadRegistry {
    inner: Mutex<BTreeMap<u64, Weak<ThreadMutexInfo>>>,
}

impl ThreadRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Inserts `descriptor` keyed by its tid. A pre-existing entry for the
    /// same tid is replaced and logged as a warning rather than treated as
    /// an error — registry inconsistency is never fatal.
    pub fn add(&self, descriptor: &Arc<ThreadMutexInfo>) {
        let tid = descriptor.tid();
        let mut map = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if map.insert(tid, Arc::downgrade(descriptor)).is_some() {
            tracing::warn!(target: "mutrace", tid, "thread registry: duplicate insertion");
        }
    }

    /// Removes the entry for `tid`. A missing entry is logged, not an error.
    pub fn remove(&self, tid: u64) {
        let mut map = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if map.remove(&tid).is_none() {
            tracing::warn!(target: "mutrace", tid, "thread registry: remove of unknown tid");
        }
    }

    /// Returns a snapshot mapping tid → weak descriptor reference.
    #[must_use]
    pub fn copy_map(&self) -> BTreeMap<u64, Weak<ThreadMutexInfo>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Returns strong references to every descriptor still alive at
    /// snapshot time, sorted by tid.
    #[must_use]
    pub fn snapshot_live(&self) -> Vec<Arc<ThreadMutexInfo>> {
        self.copy_map().into_values().filter_map(|w| w.upgrade()).collect()
    }

    /// Walks a sorted snapshot, formatting each non-empty descriptor, then
    /// a compact list of idle tids.
    #[must_use]
    pub fn dump(&self) -> String {
        let map = self.copy_map();
        let mut busy = Vec::new();
        let mut idle = Vec::new();
        for (tid, weak) in map {
            match weak.upgrade() {
                Some(info) if !info.empty() => busy.push(info.to_string_verbose()),
                Some(_) => idle.push(tid.to_string()),
                None => {}
            }
        }
        let mut out = busy.join("\n");
        if !idle.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("idle: [{}]", idle.join(",")));
        }
        out
    }
}

/// Returns the single process-wide thread registry.
#[must_use]
pub fn global_registry() -> &'static ThreadRegistry {
    static REGISTRY: OnceLock<ThreadRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ThreadRegistry::new)
}

/// Renders every registered thread's descriptor as newline-separated text.
#[must_use]
pub fn all_threads_to_string() -> String {
    global_registry().dump()
}
