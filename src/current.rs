//! Thread-local, once-initialized access to the calling thread's descriptor.
//!
//! The descriptor is jointly owned by the thread (a thread-local `Arc`) and
//! by transient snapshot copies the registry takes; the registry itself
//! stores only a [`std::sync::Weak`] reference so that thread exit promptly
//! releases the descriptor once the thread-local drops.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::registry::global_registry;
use crate::thread_info::ThreadMutexInfo;

/// A registration guard living in thread-local storage. On drop (thread
/// exit), deregisters the descriptor from the global registry.
struct Registration {
    info: Arc<ThreadMutexInfo>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        global_registry().remove(self.info.tid());
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<Registration>>> = const { RefCell::new(None) };
}

/// Returns a stable numeric id for the calling thread, suitable for use as
/// a registry key and for deadlock-chain labelling.
#[must_use]
pub fn current_tid() -> u64 {
    // `std::thread::ThreadId` has no stable numeric accessor; hash it to a
    // u64 that is stable for the lifetime of the thread, which is all the
    // deadlock detector and registry need.
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

/// Returns the calling thread's descriptor, creating and registering it on
/// first use.
#[must_use]
pub fn current_thread_info() -> Arc<ThreadMutexInfo> {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(reg) = slot.as_ref() {
            return Arc::clone(&reg.info);
        }
        let info = Arc::new(ThreadMutexInfo::new(current_tid()));
        global_registry().add(&info);
        let reg = Rc::new(Registration {
            info: Arc::clone(&info),
        });
        *slot = Some(reg);
        info
    })
}
