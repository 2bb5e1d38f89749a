use thiserror::Error;

/// Rejected throttler configuration. Raised at construction, never at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("limit must allow at least one call per window")]
    ZeroLimit,
    #[error("window duration must be greater than zero")]
    ZeroWindow,
}

/// A call whose completion handle could not be filled with the operation's own output.
///
/// Errors returned *by* the operation are not represented here: they travel back untouched
/// inside the operation's output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The operation panicked while running. Only its own handle sees this.
    #[error("operation panicked: {0}")]
    Panicked(String),
    /// The dispatch loop went away before resolving this call, e.g. the runtime shut down.
    #[error("dispatch loop stopped before the call completed")]
    Abandoned,
}
