//! Timer engine for the focus timer.
//!
//! This module provides the core timer state machine:
//! - A closed set of transition requests ([`TimerAction`])
//! - A single pure reducer ([`transition`]) over [`TimerState`]
//! - Phase cycling (focus → short break, long break after 4 focus phases)
//! - Wall-clock based countdown that never accumulates tick drift
//! - Reconciliation of a persisted state against the current time
//!
//! The engine is synchronous and owns no timers. Callers invoke
//! [`TimerEngine::tick`] on whatever cadence they like; the remaining time is
//! always recomputed from the stored start timestamp.

use tracing::{debug, warn};

use crate::types::{TimerMode, TimerSettings, TimerState, SESSIONS_BEFORE_LONG_BREAK};

// ============================================================================
// TimerAction
// ============================================================================

/// Transition requests accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    /// Start a fresh phase
    Start,
    /// Pause a running phase
    Pause,
    /// Resume a paused phase
    Resume,
    /// Return the current phase to its full length
    Reset,
    /// End the current phase and move to the next one
    Skip,
    /// Recompute the remaining time from the wall clock
    Tick,
    /// Change all three phase lengths (minutes) and restart the current phase
    SetDurations {
        focus_minutes: u32,
        short_break_minutes: u32,
        long_break_minutes: u32,
    },
    /// Replace the whole state (already reconciled)
    Load(TimerState),
}

// ============================================================================
// TimerEvent
// ============================================================================

/// Observable outcome of an accepted transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A fresh phase started running
    Started {
        /// Mode of the phase
        mode: TimerMode,
        /// Planned length in seconds
        duration: u32,
    },
    /// The running phase was paused
    Paused {
        /// Remaining seconds at pause time
        remaining_seconds: u32,
    },
    /// The paused phase was resumed
    Resumed {
        /// Remaining seconds at resume time
        remaining_seconds: u32,
    },
    /// The current phase was returned to full length
    Reset {
        /// Mode of the phase
        mode: TimerMode,
    },
    /// The phase ended and the next one was prepared
    Skipped {
        /// Mode that ended
        from: TimerMode,
        /// Mode that is now current
        to: TimerMode,
        /// Session counter after the transition
        session_count: u32,
    },
    /// Remaining time was recomputed
    Tick {
        /// Remaining seconds
        remaining_seconds: u32,
    },
    /// The running phase reached zero
    Completed {
        /// Mode that completed
        mode: TimerMode,
        /// Session counter of the completed phase
        session_count: u32,
    },
    /// Phase lengths changed; the current phase restarted at its new length
    DurationsChanged {
        /// Current mode
        mode: TimerMode,
        /// New length of the current phase in seconds
        duration: u32,
    },
    /// A persisted state was loaded
    Loaded {
        /// Mode of the loaded phase
        mode: TimerMode,
        /// Whether the loaded phase is running
        is_running: bool,
    },
}

// ============================================================================
// Pure transitions
// ============================================================================

/// Phase that follows `mode`, with the updated session counter.
pub fn next_phase(mode: TimerMode, session_count: u32) -> (TimerMode, u32) {
    match mode {
        TimerMode::Focus if session_count >= SESSIONS_BEFORE_LONG_BREAK => (TimerMode::LongBreak, 1),
        TimerMode::Focus => (TimerMode::ShortBreak, session_count),
        TimerMode::ShortBreak => (TimerMode::Focus, session_count + 1),
        TimerMode::LongBreak => (TimerMode::Focus, session_count),
    }
}

fn idle_phase(mode: TimerMode, duration: u32, session_count: u32) -> TimerState {
    TimerState {
        mode,
        duration,
        time_remaining: duration,
        is_running: false,
        session_count,
        start_time: None,
        paused_time_remaining: None,
        budget_seconds: None,
    }
}

fn completed(state: &TimerState) -> TimerState {
    TimerState {
        time_remaining: 0,
        is_running: false,
        start_time: None,
        paused_time_remaining: None,
        budget_seconds: None,
        ..state.clone()
    }
}

/// Applies `action` to `state` at wall-clock time `now_ms`.
///
/// Out-of-order requests (pausing an idle phase, resuming a running one, ...)
/// return the state unchanged.
pub fn transition(
    state: &TimerState,
    settings: &TimerSettings,
    action: &TimerAction,
    now_ms: i64,
) -> TimerState {
    match action {
        TimerAction::Start => {
            if !state.is_fresh() {
                return state.clone();
            }
            TimerState {
                is_running: true,
                start_time: Some(now_ms),
                paused_time_remaining: None,
                budget_seconds: Some(state.duration),
                ..state.clone()
            }
        }
        TimerAction::Pause => {
            if !state.is_running {
                return state.clone();
            }
            let remaining = state.remaining_at(now_ms);
            if remaining == 0 {
                return completed(state);
            }
            TimerState {
                time_remaining: remaining,
                is_running: false,
                start_time: None,
                paused_time_remaining: Some(remaining),
                budget_seconds: None,
                ..state.clone()
            }
        }
        TimerAction::Resume => match state.paused_time_remaining {
            Some(paused) if !state.is_running && state.start_time.is_none() && paused > 0 => {
                TimerState {
                    time_remaining: paused,
                    is_running: true,
                    start_time: Some(now_ms),
                    paused_time_remaining: None,
                    budget_seconds: Some(paused),
                    ..state.clone()
                }
            }
            _ => state.clone(),
        },
        TimerAction::Reset => idle_phase(state.mode, state.duration, state.session_count),
        TimerAction::Skip => {
            let (mode, session_count) = next_phase(state.mode, state.session_count);
            idle_phase(mode, settings.duration_seconds(mode), session_count)
        }
        TimerAction::Tick => {
            if !state.is_running || state.start_time.is_none() {
                return state.clone();
            }
            let remaining = state.remaining_at(now_ms);
            if remaining == 0 {
                completed(state)
            } else {
                TimerState {
                    time_remaining: remaining,
                    ..state.clone()
                }
            }
        }
        TimerAction::SetDurations {
            focus_minutes,
            short_break_minutes,
            long_break_minutes,
        } => {
            let updated = TimerSettings {
                focus_minutes: *focus_minutes,
                short_break_minutes: *short_break_minutes,
                long_break_minutes: *long_break_minutes,
                ..settings.clone()
            };
            idle_phase(
                state.mode,
                updated.duration_seconds(state.mode),
                state.session_count,
            )
        }
        TimerAction::Load(loaded) => loaded.clone(),
    }
}

/// Brings a persisted state up to date with the wall clock.
///
/// A running phase whose budget has fully elapsed is fast-forwarded to the
/// completed state instead of resuming a stale countdown. Returns the
/// reconciled state and whether it was fast-forwarded.
pub fn reconcile_loaded(state: TimerState, now_ms: i64) -> (TimerState, bool) {
    if !state.is_running {
        return (state, false);
    }
    let remaining = state.remaining_at(now_ms);
    if remaining == 0 {
        (completed(&state), true)
    } else {
        (
            TimerState {
                time_remaining: remaining,
                ..state
            },
            false,
        )
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Owns one [`TimerState`] and the settings its phases are sized from.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    /// Current timer state
    state: TimerState,
    /// Phase lengths and auto-start preference
    settings: TimerSettings,
}

impl TimerEngine {
    /// Creates an engine with an idle focus phase.
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            state: TimerState::new(&settings),
            settings,
        }
    }

    /// Creates an engine around an existing state.
    pub fn with_state(settings: TimerSettings, state: TimerState) -> Self {
        Self { state, settings }
    }

    /// Returns a reference to the current timer state.
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// Returns the current settings.
    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Updates the auto-start preference without touching the phase.
    pub fn set_auto_start_next(&mut self, enabled: bool) {
        self.settings.auto_start_next = enabled;
    }

    /// Applies one action and reports what happened.
    ///
    /// Returns `None` when the action was an out-of-order no-op.
    pub fn dispatch(&mut self, action: TimerAction, now_ms: i64) -> Option<TimerEvent> {
        if let TimerAction::SetDurations {
            focus_minutes,
            short_break_minutes,
            long_break_minutes,
        } = &action
        {
            let candidate = TimerSettings {
                focus_minutes: *focus_minutes,
                short_break_minutes: *short_break_minutes,
                long_break_minutes: *long_break_minutes,
                ..self.settings.clone()
            };
            if let Err(e) = candidate.validate() {
                warn!("Ignoring invalid durations: {}", e);
                return None;
            }
            self.settings = candidate;
        }

        let prev = self.state.clone();
        let next = transition(&prev, &self.settings, &action, now_ms);
        self.state = next;
        let next = &self.state;

        let reached_zero = prev.is_running && prev.time_remaining > 0 && next.time_remaining == 0;

        let event = match action {
            TimerAction::Start => (next != &prev).then(|| TimerEvent::Started {
                mode: next.mode,
                duration: next.duration,
            }),
            TimerAction::Pause | TimerAction::Tick if reached_zero => Some(TimerEvent::Completed {
                mode: next.mode,
                session_count: next.session_count,
            }),
            TimerAction::Pause => (next != &prev).then(|| TimerEvent::Paused {
                remaining_seconds: next.time_remaining,
            }),
            TimerAction::Resume => (next != &prev).then(|| TimerEvent::Resumed {
                remaining_seconds: next.time_remaining,
            }),
            TimerAction::Reset => Some(TimerEvent::Reset { mode: next.mode }),
            TimerAction::Skip => Some(TimerEvent::Skipped {
                from: prev.mode,
                to: next.mode,
                session_count: next.session_count,
            }),
            TimerAction::Tick => next.is_running.then(|| TimerEvent::Tick {
                remaining_seconds: next.time_remaining,
            }),
            TimerAction::SetDurations { .. } => Some(TimerEvent::DurationsChanged {
                mode: next.mode,
                duration: next.duration,
            }),
            TimerAction::Load(_) => Some(TimerEvent::Loaded {
                mode: next.mode,
                is_running: next.is_running,
            }),
        };

        match &event {
            Some(TimerEvent::Tick { .. }) => {}
            Some(e) => debug!("Timer transition: {:?}", e),
            None => debug!("Ignored out-of-order timer action"),
        }

        event
    }

    /// Starts a fresh phase.
    pub fn start(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Start, now_ms)
    }

    /// Pauses a running phase.
    pub fn pause(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Pause, now_ms)
    }

    /// Resumes a paused phase.
    pub fn resume(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Resume, now_ms)
    }

    /// Returns the current phase to its full length.
    pub fn reset(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Reset, now_ms)
    }

    /// Moves to the next phase.
    pub fn skip(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Skip, now_ms)
    }

    /// Recomputes the remaining time.
    pub fn tick(&mut self, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Tick, now_ms)
    }

    /// Changes all phase lengths and restarts the current phase.
    pub fn set_custom_durations(
        &mut self,
        focus_minutes: u32,
        short_break_minutes: u32,
        long_break_minutes: u32,
        now_ms: i64,
    ) -> Option<TimerEvent> {
        self.dispatch(
            TimerAction::SetDurations {
                focus_minutes,
                short_break_minutes,
                long_break_minutes,
            },
            now_ms,
        )
    }

    /// Replaces the whole state.
    pub fn load_state(&mut self, state: TimerState, now_ms: i64) -> Option<TimerEvent> {
        self.dispatch(TimerAction::Load(state), now_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1000;

    fn create_engine() -> TimerEngine {
        TimerEngine::new(TimerSettings::default())
    }

    // ------------------------------------------------------------------------
    // Phase policy Tests
    // ------------------------------------------------------------------------

    mod next_phase_tests {
        use super::*;

        #[test]
        fn test_focus_to_short_break() {
            assert_eq!(next_phase(TimerMode::Focus, 1), (TimerMode::ShortBreak, 1));
            assert_eq!(next_phase(TimerMode::Focus, 3), (TimerMode::ShortBreak, 3));
        }

        #[test]
        fn test_focus_to_long_break_resets_count() {
            assert_eq!(next_phase(TimerMode::Focus, 4), (TimerMode::LongBreak, 1));
        }

        #[test]
        fn test_short_break_increments_count() {
            assert_eq!(next_phase(TimerMode::ShortBreak, 2), (TimerMode::Focus, 3));
        }

        #[test]
        fn test_long_break_keeps_count() {
            assert_eq!(next_phase(TimerMode::LongBreak, 1), (TimerMode::Focus, 1));
        }
    }

    // ------------------------------------------------------------------------
    // TimerEngine Tests
    // ------------------------------------------------------------------------

    mod timer_engine_tests {
        use super::*;

        #[test]
        fn test_new_engine() {
            let engine = create_engine();
            let state = engine.state();

            assert_eq!(state.mode, TimerMode::Focus);
            assert_eq!(state.time_remaining, 25 * 60);
            assert_eq!(state.session_count, 1);
            assert!(!state.is_running);
        }

        #[test]
        fn test_start() {
            let mut engine = create_engine();

            let event = engine.start(10 * SEC);

            assert_eq!(
                event,
                Some(TimerEvent::Started {
                    mode: TimerMode::Focus,
                    duration: 1500
                })
            );
            let state = engine.state();
            assert!(state.is_running);
            assert_eq!(state.start_time, Some(10 * SEC));
            assert_eq!(state.paused_time_remaining, None);
        }

        #[test]
        fn test_start_while_running_is_noop() {
            let mut engine = create_engine();
            engine.start(0);

            assert_eq!(engine.start(5 * SEC), None);
            assert_eq!(engine.state().start_time, Some(0));
        }

        #[test]
        fn test_start_while_paused_is_noop() {
            let mut engine = create_engine();
            engine.start(0);
            engine.pause(60 * SEC);

            assert_eq!(engine.start(70 * SEC), None);
            assert!(engine.state().is_paused());
        }

        #[test]
        fn test_pause_captures_remaining() {
            let mut engine = create_engine();
            engine.start(0);

            let event = engine.pause(100 * SEC + 400);

            assert_eq!(
                event,
                Some(TimerEvent::Paused {
                    remaining_seconds: 1400
                })
            );
            let state = engine.state();
            assert!(!state.is_running);
            assert_eq!(state.start_time, None);
            assert_eq!(state.paused_time_remaining, Some(1400));
            assert_eq!(state.time_remaining, 1400);
        }

        #[test]
        fn test_double_pause_is_noop() {
            let mut engine = create_engine();
            engine.start(0);
            engine.pause(10 * SEC);

            assert_eq!(engine.pause(20 * SEC), None);
            assert_eq!(engine.state().paused_time_remaining, Some(1490));
        }

        #[test]
        fn test_pause_when_idle_is_noop() {
            let mut engine = create_engine();
            assert_eq!(engine.pause(0), None);
            assert!(engine.state().is_fresh());
        }

        #[test]
        fn test_resume_uses_paused_remaining_as_budget() {
            let mut engine = create_engine();
            engine.start(0);
            engine.pause(300 * SEC);

            // A long pause must not eat into the remaining time.
            let event = engine.resume(10_000 * SEC);
            assert_eq!(
                event,
                Some(TimerEvent::Resumed {
                    remaining_seconds: 1200
                })
            );
            assert_eq!(engine.state().budget_seconds, Some(1200));
            assert_eq!(engine.state().duration, 1500);

            engine.tick(10_060 * SEC);
            assert_eq!(engine.state().time_remaining, 1140);
        }

        #[test]
        fn test_resume_while_running_is_noop() {
            let mut engine = create_engine();
            engine.start(0);
            assert_eq!(engine.resume(5 * SEC), None);
            assert_eq!(engine.state().start_time, Some(0));
        }

        #[test]
        fn test_reset_keeps_mode_and_count() {
            let mut engine = create_engine();
            engine.skip(0); // short break
            engine.skip(0); // focus, count 2
            engine.start(0);
            engine.tick(90 * SEC);

            let event = engine.reset(100 * SEC);

            assert_eq!(
                event,
                Some(TimerEvent::Reset {
                    mode: TimerMode::Focus
                })
            );
            let state = engine.state();
            assert_eq!(state.session_count, 2);
            assert_eq!(state.time_remaining, state.duration);
            assert!(!state.is_running);
            assert_eq!(state.start_time, None);
            assert_eq!(state.paused_time_remaining, None);
        }

        #[test]
        fn test_skip_from_running_focus() {
            let mut engine = create_engine();
            engine.start(0);

            let event = engine.skip(30 * SEC);

            assert_eq!(
                event,
                Some(TimerEvent::Skipped {
                    from: TimerMode::Focus,
                    to: TimerMode::ShortBreak,
                    session_count: 1
                })
            );
            let state = engine.state();
            assert_eq!(state.duration, 5 * 60);
            assert_eq!(state.time_remaining, 5 * 60);
            assert!(!state.is_running);
            assert_eq!(state.start_time, None);
        }

        #[test]
        fn test_full_cycle_to_long_break() {
            let mut engine = create_engine();
            let mut modes = vec![engine.state().mode];
            let mut counts_before_long_break = None;

            for _ in 0..8 {
                let before = engine.state().clone();
                engine.skip(0);
                if engine.state().mode == TimerMode::LongBreak {
                    counts_before_long_break = Some(before.session_count);
                }
                modes.push(engine.state().mode);
            }

            use TimerMode::*;
            assert_eq!(
                modes,
                vec![
                    Focus, ShortBreak, Focus, ShortBreak, Focus, ShortBreak, Focus, LongBreak,
                    Focus
                ]
            );
            assert_eq!(counts_before_long_break, Some(4));
            assert_eq!(engine.state().session_count, 1);
        }

        #[test]
        fn test_tick_is_noop_when_idle() {
            let mut engine = create_engine();
            assert_eq!(engine.tick(50 * SEC), None);
            assert_eq!(engine.state().time_remaining, 1500);
        }

        #[test]
        fn test_tick_is_drift_free_for_irregular_cadence() {
            let mut engine = create_engine();
            engine.start(1_234);

            let offsets_ms = [1, 999, 1_000, 1_001, 2_500, 61_999, 62_000, 700_321, 1_499_999];
            for offset in offsets_ms {
                let now = 1_234 + offset;
                engine.tick(now);
                let expected = (1500 - offset / 1000).max(0) as u32;
                assert_eq!(
                    engine.state().time_remaining,
                    expected,
                    "mismatch at offset {}",
                    offset
                );
            }
        }

        #[test]
        fn test_tick_count_does_not_matter() {
            let mut many = create_engine();
            let mut once = create_engine();
            many.start(0);
            once.start(0);

            for ms in (0..=120_000).step_by(250) {
                many.tick(ms);
            }
            once.tick(120_000);

            assert_eq!(many.state(), once.state());
        }

        #[test]
        fn test_tick_completion_edge() {
            let mut engine = create_engine();
            engine.start(0);
            engine.tick(1_499 * SEC);

            let event = engine.tick(1_500 * SEC);

            assert_eq!(
                event,
                Some(TimerEvent::Completed {
                    mode: TimerMode::Focus,
                    session_count: 1
                })
            );
            let state = engine.state();
            assert_eq!(state.time_remaining, 0);
            assert!(!state.is_running);
            assert!(state.is_completed());

            // The edge fires only once.
            assert_eq!(engine.tick(1_600 * SEC), None);
        }

        #[test]
        fn test_completion_after_long_gap() {
            let mut engine = create_engine();
            engine.start(0);

            let event = engine.tick(10_000 * SEC);

            assert!(matches!(event, Some(TimerEvent::Completed { .. })));
            assert_eq!(engine.state().time_remaining, 0);
        }

        #[test]
        fn test_start_after_completion_is_noop() {
            let mut engine = create_engine();
            engine.start(0);
            engine.tick(1_500 * SEC);

            assert_eq!(engine.start(1_501 * SEC), None);
        }

        #[test]
        fn test_set_custom_durations_interrupts_running_phase() {
            let mut engine = create_engine();
            engine.start(0);
            engine.tick(100 * SEC);

            let event = engine.set_custom_durations(50, 10, 20, 120 * SEC);

            assert_eq!(
                event,
                Some(TimerEvent::DurationsChanged {
                    mode: TimerMode::Focus,
                    duration: 3000
                })
            );
            let state = engine.state();
            assert!(!state.is_running);
            assert_eq!(state.duration, 3000);
            assert_eq!(state.time_remaining, 3000);
            assert_eq!(engine.settings().short_break_minutes, 10);

            engine.skip(0);
            assert_eq!(engine.state().duration, 600);
        }

        #[test]
        fn test_set_custom_durations_rejects_invalid() {
            let mut engine = create_engine();
            engine.start(0);

            assert_eq!(engine.set_custom_durations(0, 5, 15, SEC), None);
            assert!(engine.state().is_running);
            assert_eq!(engine.settings().focus_minutes, 25);
        }

        #[test]
        fn test_set_auto_start_keeps_phase() {
            let mut engine = create_engine();
            engine.start(0);
            engine.set_auto_start_next(true);

            assert!(engine.settings().auto_start_next);
            assert!(engine.state().is_running);
        }

        #[test]
        fn test_load_state_replaces_everything() {
            let mut engine = create_engine();
            let loaded = TimerState {
                mode: TimerMode::LongBreak,
                duration: 900,
                time_remaining: 450,
                paused_time_remaining: Some(450),
                session_count: 1,
                ..TimerState::default()
            };

            let event = engine.load_state(loaded.clone(), 0);

            assert_eq!(
                event,
                Some(TimerEvent::Loaded {
                    mode: TimerMode::LongBreak,
                    is_running: false
                })
            );
            assert_eq!(engine.state(), &loaded);
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation Tests
    // ------------------------------------------------------------------------

    mod reconcile_tests {
        use super::*;

        #[test]
        fn test_expired_running_state_is_fast_forwarded() {
            let now = 1_700_000_000_000;
            let persisted = TimerState {
                duration: 1500,
                time_remaining: 1500,
                is_running: true,
                start_time: Some(now - 2000 * SEC),
                ..TimerState::default()
            };

            let (state, fast_forwarded) = reconcile_loaded(persisted, now);

            assert!(fast_forwarded);
            assert_eq!(state.time_remaining, 0);
            assert!(!state.is_running);
            assert_eq!(state.start_time, None);
        }

        #[test]
        fn test_live_running_state_keeps_counting() {
            let now = 1_700_000_000_000;
            let persisted = TimerState {
                duration: 1500,
                time_remaining: 1500,
                is_running: true,
                start_time: Some(now - 600 * SEC),
                budget_seconds: Some(1500),
                ..TimerState::default()
            };

            let (state, fast_forwarded) = reconcile_loaded(persisted, now);

            assert!(!fast_forwarded);
            assert!(state.is_running);
            assert_eq!(state.time_remaining, 900);
        }

        #[test]
        fn test_idle_state_untouched() {
            let persisted = TimerState::default();
            let (state, fast_forwarded) = reconcile_loaded(persisted.clone(), 123);
            assert!(!fast_forwarded);
            assert_eq!(state, persisted);
        }
    }

    // ------------------------------------------------------------------------
    // transition() Tests
    // ------------------------------------------------------------------------

    mod transition_tests {
        use super::*;

        #[test]
        fn test_transition_does_not_mutate_input() {
            let settings = TimerSettings::default();
            let state = TimerState::default();

            let next = transition(&state, &settings, &TimerAction::Start, 5);

            assert!(!state.is_running);
            assert!(next.is_running);
        }

        #[test]
        fn test_pause_at_zero_completes() {
            let settings = TimerSettings::default();
            let running = transition(&TimerState::default(), &settings, &TimerAction::Start, 0);

            let next = transition(&running, &settings, &TimerAction::Pause, 1_500 * SEC);

            assert!(next.is_completed());
            assert_eq!(next.paused_time_remaining, None);
        }
    }
}
