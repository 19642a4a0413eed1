//! Process-wide configuration, fixed at process start.
//!
//! Values are read once from the environment and cached behind a
//! [`OnceLock`], in the style of `mcp-agent-mail-core`'s `env_value`
//! helpers. Nothing here is reconfigurable at runtime: [`Config::global`]
//! always returns the same snapshot for the life of the process.

use std::env;
use std::sync::OnceLock;

/// Runtime-wide configuration for the instrumented mutex subsystem.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// When `false`, pre/post hooks and scope objects become no-ops and the
    /// mutex degrades to a plain exclusive lock.
    pub mutex_tracking_enabled: bool,
    /// Fatal vs. silent for order-inversion violations.
    pub abort_on_order_check: bool,
    /// Fatal vs. silent for same-order/same-mutex recursive acquisition.
    pub abort_on_recursion_check: bool,
    /// Fatal vs. silent for unlocking a mutex the thread does not hold.
    pub abort_on_invalid_unlock: bool,
    /// Physical capacity of every thread's held stack.
    pub mutex_stack_depth: usize,
    /// Whether newly constructed mutexes request the OS priority-
    /// inheritance protocol.
    pub priority_inheritance_enabled: bool,
}

/// Default physical held-stack depth: at most this many mutexes held
/// simultaneously by one thread are tracked, configurable via
/// `MUTRACE_STACK_DEPTH`.
pub const DEFAULT_STACK_DEPTH: usize = 16;

impl Default for Config {
    fn default() -> Self {
        Self {
            mutex_tracking_enabled: true,
            abort_on_order_check: true,
            abort_on_recursion_check: true,
            abort_on_invalid_unlock: true,
            mutex_stack_depth: DEFAULT_STACK_DEPTH,
            priority_inheritance_enabled: false,
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to
    /// [`Config::default`] for unset variables.
    ///
    /// Recognized variables: `MUTRACE_TRACKING_ENABLED`,
    /// `MUTRACE_ABORT_ON_ORDER_CHECK`, `MUTRACE_ABORT_ON_RECURSION_CHECK`,
    /// `MUTRACE_ABORT_ON_INVALID_UNLOCK`, `MUTRACE_STACK_DEPTH`,
    /// `MUTRACE_PRIORITY_INHERITANCE`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            mutex_tracking_enabled: env_bool(
                "MUTRACE_TRACKING_ENABLED",
                defaults.mutex_tracking_enabled,
            ),
            abort_on_order_check: env_bool(
                "MUTRACE_ABORT_ON_ORDER_CHECK",
                defaults.abort_on_order_check,
            ),
            abort_on_recursion_check: env_bool(
                "MUTRACE_ABORT_ON_RECURSION_CHECK",
                defaults.abort_on_recursion_check,
            ),
            abort_on_invalid_unlock: env_bool(
                "MUTRACE_ABORT_ON_INVALID_UNLOCK",
                defaults.abort_on_invalid_unlock,
            ),
            mutex_stack_depth: env_usize("MUTRACE_STACK_DEPTH", defaults.mutex_stack_depth),
            priority_inheritance_enabled: env_bool(
                "MUTRACE_PRIORITY_INHERITANCE",
                defaults.priority_inheritance_enabled,
            ),
        }
    }

    /// Returns the process-wide configuration, computing it from the
    /// environment on first use.
    #[must_use]
    pub fn global() -> &'static Config {
        static CONFIG: OnceLock<Config> = OnceLock::new();
        CONFIG.get_or_init(Config::from_env)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_value(key) {
        Some(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "on"),
        None => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
