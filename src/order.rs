//! Capability-order enumeration and the parallel name table.
//!
//! Every mutex is tagged with exactly one [`Order`] at construction. The
//! variants are declared in acquisition order: a thread holding a mutex of
//! order *o* may only go on to acquire a mutex of order *o′* with *o′ > o*.
//! The set is dense, fixed, and closed — there is no runtime registration.

use std::fmt;

/// A capability category in the fixed acquisition hierarchy.
///
/// In the original project this enum (and [`NAME_TABLE`]) were produced by
/// an offline generator reading a capability specification; here the dense
/// set it would have produced is simply hand-declared.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Order {
    AudioFlinger = 0,
    AudioFlingerClient,
    AudioPolicyService,
    AudioPolicyEffects,
    OutputStream,
    InputStream,
    ThreadBase,
    PlaybackThread,
    RecordThread,
    MmapThread,
    EffectChain,
    EffectBase,
    EffectHandle,
    DeviceEffectManager,
    PatchPanel,
    DeviceIoHandleMap,
    ClientMutex,
    AudioSessionRef,
    AudioTrackClient,
    AudioRecordClient,
    SpatializerHandle,
    PlaybackThreadStreamOps,
    RecordThreadStreamOps,
    VolumeHandler,
    MelReporter,
    CaptureStateNotifier,
    AudioWatchdog,
    RingBuffer,
    ConfigCache,
    PowerLog,
    ThreadMetadata,
    /// Reserved sentinel for mutexes outside the named hierarchy.
    Other,
}

/// Total number of [`Order`] variants, including [`Order::Other`].
pub const ORDER_COUNT: usize = 32;

/// Name table, indexed identically to [`Order as usize`](Order).
pub const NAME_TABLE: [&str; ORDER_COUNT] = [
    "AudioFlinger",
    "AudioFlingerClient",
    "AudioPolicyService",
    "AudioPolicyEffects",
    "OutputStream",
    "InputStream",
    "ThreadBase",
    "PlaybackThread",
    "RecordThread",
    "MmapThread",
    "EffectChain",
    "EffectBase",
    "EffectHandle",
    "DeviceEffectManager",
    "PatchPanel",
    "DeviceIoHandleMap",
    "ClientMutex",
    "AudioSessionRef",
    "AudioTrackClient",
    "AudioRecordClient",
    "SpatializerHandle",
    "PlaybackThreadStreamOps",
    "RecordThreadStreamOps",
    "VolumeHandler",
    "MelReporter",
    "CaptureStateNotifier",
    "AudioWatchdog",
    "RingBuffer",
    "ConfigCache",
    "PowerLog",
    "ThreadMetadata",
    "Other",
];

impl Order {
    /// Returns the dense ordinal used for array indexing and comparisons.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Looks up an `Order` from its ordinal, if in range.
    #[must_use]
    pub fn from_ordinal(ord: usize) -> Option<Self> {
        // SAFETY-free: a match table avoids any transmute of an out-of-range
        // discriminant.
        const TABLE: [Order; ORDER_COUNT] = [
            Order::AudioFlinger,
            Order::AudioFlingerClient,
            Order::AudioPolicyService,
            Order::AudioPolicyEffects,
            Order::OutputStream,
            Order::InputStream,
            Order::ThreadBase,
            Order::PlaybackThread,
            Order::RecordThread,
            Order::MmapThread,
            Order::EffectChain,
            Order::EffectBase,
            Order::EffectHandle,
            Order::DeviceEffectManager,
            Order::PatchPanel,
            Order::DeviceIoHandleMap,
            Order::ClientMutex,
            Order::AudioSessionRef,
            Order::AudioTrackClient,
            Order::AudioRecordClient,
            Order::SpatializerHandle,
            Order::PlaybackThreadStreamOps,
            Order::RecordThreadStreamOps,
            Order::VolumeHandler,
            Order::MelReporter,
            Order::CaptureStateNotifier,
            Order::AudioWatchdog,
            Order::RingBuffer,
            Order::ConfigCache,
            Order::PowerLog,
            Order::ThreadMetadata,
            Order::Other,
        ];
        TABLE.get(ord).copied()
    }

    /// Returns the human-readable capability name for this order.
    #[must_use]
    pub const fn name(self) -> &'static str {
        NAME_TABLE[self.ordinal()]
    }

    /// The catch-all order used when a mutex is constructed without an
    /// explicit category.
    #[must_use]
    pub const fn other() -> Self {
        Order::Other
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for Order {
    fn default() -> Self {
        Order::other()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordinal_roundtrip() {
        for ord in 0..ORDER_COUNT {
            let order = Order::from_ordinal(ord).expect("in range");
            assert_eq!(order.ordinal(), ord);
        }
        assert_eq!(Order::from_ordinal(ORDER_COUNT), None);
    }

    #[test]
    fn names_are_unique_and_aligned() {
        let mut seen = std::collections::HashSet::new();
        for ord in 0..ORDER_COUNT {
            let order = Order::from_ordinal(ord).unwrap();
            assert_eq!(order.name(), NAME_TABLE[ord]);
            assert!(seen.insert(order.name()), "duplicate name {}", order.name());
        }
    }

    #[test]
    fn total_order_is_respected() {
        assert!(Order::AudioFlinger < Order::ThreadBase);
        assert!(Order::ThreadBase < Order::Other);
    }

    #[test]
    fn default_is_other() {
        assert_eq!(Order::default(), Order::Other);
    }
}
