//! Error taxonomy and the fatal-path helper.
//!
//! Most named error classes here are not `Result`-shaped: order inversion,
//! recursion and invalid unlock are programming errors that terminate the
//! process when their `abort_on_*` flag is enabled, and are silently
//! tolerated otherwise. [`MutexError`] exists only for the one operation
//! whose failure mode is genuinely a value a caller might want to match on.

use crate::order::Order;
use thiserror::Error;

/// Fallible operations in this crate funnel their non-boolean failures
/// through this type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutexError {
    /// An `Order` ordinal could not be resolved to a known category.
    #[error("unknown capability order ordinal {0}")]
    InvalidOrder(usize),
}

/// Logs a fatal condition and aborts the process via `panic!`.
///
/// Mirrors `lock_order.rs`'s `assert!`-based violation reporting: the
/// message names both orders involved so the dump is actionable without a
/// debugger attached.
#[track_caller]
pub fn fatal(message: std::fmt::Arguments<'_>) -> ! {
    tracing::error!(target: "mutrace", "{}", message);
    panic!("{}", message);
}

/// Builds the standard order-inversion message naming both orders by number
/// and name.
#[must_use]
pub fn order_inversion_message(held: Order, attempted: Order) -> String {
    format!(
        "order inversion: attempting to acquire order {} ({}) while holding order {} ({})",
        attempted.ordinal(),
        attempted.name(),
        held.ordinal(),
        held.name(),
    )
}

/// Builds the standard recursion message naming the repeated order.
#[must_use]
pub fn recursion_message(order: Order) -> String {
    format!(
        "recursive acquisition: order {} ({}) already held by this thread",
        order.ordinal(),
        order.name(),
    )
}

/// Builds the standard invalid-unlock message.
#[must_use]
pub fn invalid_unlock_message(order: Order) -> String {
    format!(
        "invalid unlock: mutex of order {} ({}) is not held by this thread",
        order.ordinal(),
        order.name(),
    )
}
