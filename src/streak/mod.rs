//! Day-level activity streaks.
//!
//! Streaks are derived, never edited: the state is recomputed from the full
//! session history on load and after every completion. Only *qualifying*
//! sessions count toward a day: completed focus phases of at least five
//! minutes.
//!
//! A streak of five or more days may survive one missed day. The first time
//! a single missed day would break it, the gap is forgiven: `protection_used`
//! is set and the day it was granted is kept in `protected_on`, so activity
//! later that day continues the streak and a second recomputation on the
//! same day does not treat the gap again. Longer gaps are never forgiven.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateError;
use crate::session::SessionRecord;

/// Minimum actual length of a qualifying session, in seconds.
pub const QUALIFYING_SECONDS: u32 = 300;

/// Minimum streak length that earns a one-time gap protection.
pub const PROTECTION_MIN_STREAK: u32 = 5;

// ============================================================================
// StreakState
// ============================================================================

/// Current and best streak.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    /// Consecutive qualifying days ending today or yesterday
    pub current_streak: u32,
    /// Highest `current_streak` ever reached
    pub best_streak: u32,
    /// Last local day counted toward the streak
    pub last_active_date: Option<NaiveDate>,
    /// Whether the current streak already spent its gap protection
    pub protection_used: bool,
    /// Day on which the gap protection was granted
    #[serde(default)]
    pub protected_on: Option<NaiveDate>,
}

impl StreakState {
    /// Checks the invariants of a persisted streak.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.current_streak > self.best_streak {
            return Err(StateError::StreakExceedsBest {
                current: self.current_streak,
                best: self.best_streak,
            });
        }
        if self.current_streak > 0 && self.last_active_date.is_none() {
            return Err(StateError::StreakWithoutActiveDate);
        }
        if self.protected_on.is_some() && !self.protection_used {
            return Err(StateError::InconsistentProtection);
        }
        Ok(())
    }
}

// ============================================================================
// DailyActivity
// ============================================================================

/// Qualifying activity on one local calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    /// Number of qualifying sessions
    pub session_count: u32,
    /// Total qualifying focus time in seconds
    pub total_seconds: u64,
}

/// Returns true if a session counts toward a day's streak activity.
pub fn is_qualifying(record: &SessionRecord) -> bool {
    record.completed && record.actual_duration_seconds >= QUALIFYING_SECONDS
}

/// Buckets qualifying sessions by the local day of their start time.
pub fn group_daily_activity<'a, I, Tz>(sessions: I, tz: &Tz) -> BTreeMap<NaiveDate, DailyActivity>
where
    I: IntoIterator<Item = &'a SessionRecord>,
    Tz: TimeZone,
{
    let mut days: BTreeMap<NaiveDate, DailyActivity> = BTreeMap::new();
    for record in sessions.into_iter().filter(|r| is_qualifying(r)) {
        let day = record.start_timestamp.with_timezone(tz).date_naive();
        let bucket = days.entry(day).or_default();
        bucket.session_count += 1;
        bucket.total_seconds += u64::from(record.actual_duration_seconds);
    }
    days
}

fn has_activity(days: &BTreeMap<NaiveDate, DailyActivity>, day: NaiveDate) -> bool {
    days.get(&day).is_some_and(|d| d.session_count > 0)
}

// ============================================================================
// Calculation
// ============================================================================

/// Advances `previous` to reflect `activity` as of `today`.
pub fn calculate_streaks(
    activity: &BTreeMap<NaiveDate, DailyActivity>,
    previous: &StreakState,
    today: NaiveDate,
) -> StreakState {
    let yesterday = today.pred_opt().unwrap_or(today);
    step(
        previous,
        today,
        has_activity(activity, today),
        has_activity(activity, yesterday),
    )
}

/// Returns true if the only day missing before `today` is yesterday and the
/// streak is allowed to bridge it.
fn bridges_single_gap(previous: &StreakState, today: NaiveDate) -> bool {
    let Some(last) = previous.last_active_date else {
        return false;
    };
    if (today - last).num_days() != 2 {
        return false;
    }
    previous.protected_on == Some(today)
        || (previous.current_streak >= PROTECTION_MIN_STREAK && !previous.protection_used)
}

fn step(
    previous: &StreakState,
    today: NaiveDate,
    active_today: bool,
    active_yesterday: bool,
) -> StreakState {
    let yesterday = today.pred_opt().unwrap_or(today);

    if !active_today && !active_yesterday {
        let Some(last) = previous.last_active_date else {
            return previous.clone();
        };
        if (today - last).num_days() <= 1 || previous.protected_on == Some(today) {
            return previous.clone();
        }

        if bridges_single_gap(previous, today) {
            debug!(
                "Streak of {} protected across missed day after {}",
                previous.current_streak, last
            );
            return StreakState {
                protection_used: true,
                protected_on: Some(today),
                ..previous.clone()
            };
        }

        if previous.current_streak > 0 {
            debug!("Streak of {} broken (last active {})", previous.current_streak, last);
        }
        return StreakState {
            current_streak: 0,
            protection_used: false,
            protected_on: None,
            ..previous.clone()
        };
    }

    if active_today && previous.last_active_date != Some(today) {
        let bridged = previous.last_active_date != Some(yesterday)
            && bridges_single_gap(previous, today);
        let current_streak = if previous.last_active_date == Some(yesterday) || bridged {
            previous.current_streak + 1
        } else {
            1
        };
        let fresh = current_streak == 1;
        return StreakState {
            current_streak,
            best_streak: current_streak.max(previous.best_streak),
            last_active_date: Some(today),
            protection_used: !fresh && (previous.protection_used || bridged),
            protected_on: if fresh {
                None
            } else if bridged {
                Some(today)
            } else {
                previous.protected_on
            },
        };
    }

    previous.clone()
}

/// Rebuilds the streak from scratch by walking every day from the first
/// active one up to `today`.
///
/// Each day is evaluated once before and once after its own activity, the
/// way a recomputation at the start of the day followed by one after a
/// completion would see it. Used when history shrinks and the incremental
/// baseline can no longer be trusted.
pub fn replay_streaks(activity: &BTreeMap<NaiveDate, DailyActivity>, today: NaiveDate) -> StreakState {
    let mut state = StreakState::default();
    let Some(mut day) = activity.keys().next().copied() else {
        return state;
    };

    while day <= today {
        let active_yesterday = day
            .pred_opt()
            .is_some_and(|yesterday| has_activity(activity, yesterday));
        state = step(&state, day, false, active_yesterday);
        if has_activity(activity, day) {
            state = step(&state, day, true, active_yesterday);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    state
}

/// Groups `sessions` in `tz` and recomputes the streak as of `today`.
pub fn recompute_streak<Tz: TimeZone>(
    sessions: &[SessionRecord],
    previous: &StreakState,
    today: NaiveDate,
    tz: &Tz,
) -> StreakState {
    let activity = group_daily_activity(sessions, tz);
    calculate_streaks(&activity, previous, today)
}

// ============================================================================
// Tests
// ============================================================================
