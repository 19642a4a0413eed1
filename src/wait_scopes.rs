//! RAII scopes marking a thread as blocked on something other than a mutex:
//! joining another thread, or waiting on a queue operation. These exist so
//! the deadlock detector can traverse a wait chain that crosses thread
//! boundaries without a mutex in between.

use crate::current::current_thread_info;

/// Marks the calling thread as waiting to join `tid` for the scope's
/// lifetime.
#[must_use]
pub struct ScopedJoinWaitCheck {
    _private: (),
}

impl ScopedJoinWaitCheck {
    /// Begins tracking a join-wait on `tid`.
    pub fn new(tid: u64) -> Self {
        current_thread_info().add_wait_join(tid);
        Self { _private: () }
    }
}

impl Drop for ScopedJoinWaitCheck {
    fn drop(&mut self) {
        current_thread_info().remove_wait_join();
    }
}

/// Marks the calling thread as waiting on a queue operation (send/receive)
/// involving `tid` for the scope's lifetime.
#[must_use]
pub struct ScopedQueueWaitCheck {
    _private: (),
}

impl ScopedQueueWaitCheck {
    /// Begins tracking a queue-wait on `tid`.
    pub fn new(tid: u64) -> Self {
        current_thread_info().add_wait_queue(tid);
        Self { _private: () }
    }
}

impl Drop for ScopedQueueWaitCheck {
    fn drop(&mut self) {
        current_thread_info().remove_wait_queue();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::thread_info::WaitReason;

    #[test]
    fn join_scope_sets_and_clears_wait_reason() {
        {
            let _scope = ScopedJoinWaitCheck::new(42);
            let (tid, reason, _) = current_thread_info().other_wait();
            assert_eq!(tid, 42);
            assert_eq!(reason, WaitReason::Join);
        }
        assert_eq!(current_thread_info().other_wait().1, WaitReason::None);
    }

    #[test]
    fn queue_scope_sets_and_clears_wait_reason() {
        {
            let _scope = ScopedQueueWaitCheck::new(7);
            let (tid, reason, _) = current_thread_info().other_wait();
            assert_eq!(tid, 7);
            assert_eq!(reason, WaitReason::Queue);
        }
        assert_eq!(current_thread_info().other_wait().1, WaitReason::None);
    }

    #[test]
    fn nested_scopes_restore_outer_on_drop() {
        let _outer = ScopedJoinWaitCheck::new(1);
        {
            let _inner = ScopedQueueWaitCheck::new(2);
            assert_eq!(current_thread_info().other_wait().1, WaitReason::Queue);
        }
        // The inner scope's drop clears unconditionally; nesting these two
        // scope types is not meant to be composed, only sequenced.
        assert_eq!(current_thread_info().other_wait().1, WaitReason::None);
    }
}
