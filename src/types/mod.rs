//! Core data types for the focus timer.
//!
//! This module defines the data structures used for:
//! - Timer mode and the live timer state
//! - Timer settings with validation
//! - Validation of persisted timer state before it is trusted

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, StateError};

/// Number of focus phases before a long break replaces the short one.
pub const SESSIONS_BEFORE_LONG_BREAK: u32 = 4;

/// Upper bound for any single phase, in seconds.
pub const MAX_PHASE_SECONDS: u32 = 120 * 60;

// ============================================================================
// TimerMode
// ============================================================================

/// The kind of phase the timer is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    /// Focused work
    #[default]
    Focus,
    /// Short break between focus phases
    ShortBreak,
    /// Long break after every few focus phases
    LongBreak,
}

impl TimerMode {
    /// Returns the string representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::ShortBreak => "shortBreak",
            TimerMode::LongBreak => "longBreak",
        }
    }

    /// Returns true for either break mode.
    pub fn is_break(&self) -> bool {
        matches!(self, TimerMode::ShortBreak | TimerMode::LongBreak)
    }
}

// ============================================================================
// TimerSettings
// ============================================================================

fn default_focus_minutes() -> u32 {
    25
}

fn default_short_break_minutes() -> u32 {
    5
}

fn default_long_break_minutes() -> u32 {
    15
}

/// User-adjustable timer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    /// Focus duration in minutes (1-120)
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    /// Short break duration in minutes (1-60)
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    /// Long break duration in minutes (1-60)
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    /// Whether the next phase starts by itself after a completion
    #[serde(default)]
    pub auto_start_next: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            auto_start_next: false,
        }
    }
}

impl TimerSettings {
    /// Sets the focus duration.
    pub fn with_focus_minutes(mut self, minutes: u32) -> Self {
        self.focus_minutes = minutes;
        self
    }

    /// Sets the short break duration.
    pub fn with_short_break_minutes(mut self, minutes: u32) -> Self {
        self.short_break_minutes = minutes;
        self
    }

    /// Sets the long break duration.
    pub fn with_long_break_minutes(mut self, minutes: u32) -> Self {
        self.long_break_minutes = minutes;
        self
    }

    /// Sets the auto-start preference.
    pub fn with_auto_start_next(mut self, enabled: bool) -> Self {
        self.auto_start_next = enabled;
        self
    }

    /// Configured length of a phase, in seconds.
    pub fn duration_seconds(&self, mode: TimerMode) -> u32 {
        let minutes = match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        };
        minutes.saturating_mul(60)
    }

    /// Validates the configured durations.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=120).contains(&self.focus_minutes) {
            return Err(SettingsError::FocusOutOfRange(self.focus_minutes));
        }
        if !(1..=60).contains(&self.short_break_minutes) {
            return Err(SettingsError::ShortBreakOutOfRange(
                self.short_break_minutes,
            ));
        }
        if !(1..=60).contains(&self.long_break_minutes) {
            return Err(SettingsError::LongBreakOutOfRange(self.long_break_minutes));
        }
        Ok(())
    }
}

// ============================================================================
// TimerState
// ============================================================================

/// Snapshot of the live timer.
///
/// While running, `time_remaining` is a cache of the value derived from
/// `start_time` and the run budget; it is never decremented per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Current phase kind
    pub mode: TimerMode,
    /// Planned length of the current phase in seconds
    pub duration: u32,
    /// Remaining seconds in the current phase
    pub time_remaining: u32,
    /// Whether the countdown is live
    pub is_running: bool,
    /// Focus phases completed since the last long break, starting at 1
    pub session_count: u32,
    /// Epoch milliseconds of the current run's start; set iff running
    pub start_time: Option<i64>,
    /// Remaining seconds captured by pause; set only while paused
    pub paused_time_remaining: Option<u32>,
    /// Seconds left when the current run started (the full duration after a
    /// fresh start, the paused remainder after a resume); set iff running
    #[serde(default)]
    pub budget_seconds: Option<u32>,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(&TimerSettings::default())
    }
}

impl TimerState {
    /// Creates an idle focus phase at full length.
    pub fn new(settings: &TimerSettings) -> Self {
        let duration = settings.duration_seconds(TimerMode::Focus);
        Self {
            mode: TimerMode::Focus,
            duration,
            time_remaining: duration,
            is_running: false,
            session_count: 1,
            start_time: None,
            paused_time_remaining: None,
            budget_seconds: None,
        }
    }

    /// Returns true if the phase was started and then paused.
    pub fn is_paused(&self) -> bool {
        !self.is_running && self.paused_time_remaining.is_some()
    }

    /// Returns true if the phase has not been started yet.
    pub fn is_fresh(&self) -> bool {
        !self.is_running
            && self.paused_time_remaining.is_none()
            && self.time_remaining == self.duration
    }

    /// Returns true if the phase ran down to zero.
    pub fn is_completed(&self) -> bool {
        !self.is_running && self.time_remaining == 0
    }

    /// Seconds of the phase already used up.
    pub fn elapsed_seconds(&self) -> u32 {
        self.duration.saturating_sub(self.time_remaining)
    }

    /// Remaining seconds as a function of wall-clock time.
    pub fn remaining_at(&self, now_ms: i64) -> u32 {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => {
                let budget = self.budget_seconds.unwrap_or(self.duration);
                let elapsed_secs = (now_ms - start).max(0) / 1000;
                let elapsed_secs = u32::try_from(elapsed_secs).unwrap_or(u32::MAX);
                budget.saturating_sub(elapsed_secs)
            }
            _ => self.time_remaining,
        }
    }

    /// Epoch milliseconds at which the current run reaches zero, if running.
    pub fn finishes_at_ms(&self) -> Option<i64> {
        let start = self.start_time.filter(|_| self.is_running)?;
        let budget = self.budget_seconds.unwrap_or(self.duration);
        Some(start + i64::from(budget) * 1000)
    }

    /// Checks every invariant a persisted state must satisfy before it is
    /// loaded.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.duration == 0 || self.duration > MAX_PHASE_SECONDS {
            return Err(StateError::DurationOutOfRange(self.duration));
        }
        if self.time_remaining > self.duration {
            return Err(StateError::RemainingExceedsDuration {
                remaining: self.time_remaining,
                duration: self.duration,
            });
        }
        if !(1..=SESSIONS_BEFORE_LONG_BREAK).contains(&self.session_count) {
            return Err(StateError::SessionCountOutOfRange(self.session_count));
        }
        if self.is_running != self.start_time.is_some() {
            return Err(StateError::RunningWithoutStartTime);
        }
        if let Some(paused) = self.paused_time_remaining {
            if self.is_running || paused == 0 || paused > self.duration {
                return Err(StateError::InvalidPausedRemaining);
            }
        }
        match self.budget_seconds {
            Some(budget) if !self.is_running || budget > self.duration => {
                return Err(StateError::InvalidBudget);
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
