//! Error types for the focus timer core.
//!
//! None of these errors is fatal. Storage errors are logged and the in-memory
//! state stays authoritative; validation errors cause a persisted record to be
//! discarded in favour of its documented default.

use thiserror::Error;

// ============================================================================
// StoreError
// ============================================================================

/// Errors reported by a [`DurableStore`](crate::store::DurableStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be used at all (e.g. disabled in a private context).
    #[error("durable store is unavailable")]
    Unavailable,

    /// A record could not be encoded or decoded.
    #[error("failed to (de)serialize record in '{table}': {message}")]
    Serialization { table: String, message: String },

    /// The requested secondary index does not exist on the table.
    #[error("table '{table}' has no index named '{index}'")]
    UnknownIndex { table: String, index: String },

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if the store could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Returns true if a record failed to (de)serialize.
    #[must_use]
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }
}

// ============================================================================
// SettingsError
// ============================================================================

/// Validation failures for [`TimerSettings`](crate::types::TimerSettings).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("focus duration must be between 1 and 120 minutes (got {0})")]
    FocusOutOfRange(u32),

    #[error("short break duration must be between 1 and 60 minutes (got {0})")]
    ShortBreakOutOfRange(u32),

    #[error("long break duration must be between 1 and 60 minutes (got {0})")]
    LongBreakOutOfRange(u32),
}

// ============================================================================
// StateError
// ============================================================================

/// Invariant violations found when validating a persisted
/// [`TimerState`](crate::types::TimerState) or
/// [`StreakState`](crate::streak::StreakState).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("duration {0}s is outside the allowed range")]
    DurationOutOfRange(u32),

    #[error("time remaining {remaining}s exceeds duration {duration}s")]
    RemainingExceedsDuration { remaining: u32, duration: u32 },

    #[error("session count {0} is outside the allowed range")]
    SessionCountOutOfRange(u32),

    #[error("running flag and start time disagree")]
    RunningWithoutStartTime,

    #[error("paused time remaining is invalid for this state")]
    InvalidPausedRemaining,

    #[error("run budget is inconsistent with the running flag or duration")]
    InvalidBudget,

    #[error("current streak {current} exceeds best streak {best}")]
    StreakExceedsBest { current: u32, best: u32 },

    #[error("active streak has no last active date")]
    StreakWithoutActiveDate,

    #[error("protection day recorded without protection being used")]
    InconsistentProtection,
}
