//! Focus Timer Core Library
//!
//! This library provides the time-based core of a focus (Pomodoro) timer.
//! It includes:
//! - Timer engine: a pure, drift-free state machine over focus and break phases
//! - Session lifecycle: checkpoints, completion, skip and discard of focus attempts
//! - Streak calculator: day-level activity streaks with one-time gap protection
//! - Durable store contract with an in-memory implementation
//! - A shared controller handle with debounced saves and delayed auto-advance

pub mod clock;
pub mod controller;
pub mod error;
pub mod logging;
pub mod notify;
pub mod session;
pub mod store;
pub mod streak;
pub mod timer;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{TimerMode, TimerSettings, TimerState, SESSIONS_BEFORE_LONG_BREAK};

pub use error::{SettingsError, StateError, StoreError};

pub use timer::{next_phase, reconcile_loaded, transition, TimerAction, TimerEngine, TimerEvent};

pub use session::{
    format_duration, normalize_tags, OpenAttempt, SessionDraft, SessionLifecycle, SessionRecord,
    TagData, CHECKPOINT_INTERVAL_SECS,
};

pub use streak::{
    calculate_streaks, group_daily_activity, is_qualifying, replay_streaks, DailyActivity,
    StreakState, PROTECTION_MIN_STREAK, QUALIFYING_SECONDS,
};

pub use store::{DurableStore, MemoryStore, Persistence, Table};

pub use clock::{Clock, ManualClock, SystemClock};

pub use notify::{CompletionNotifier, MockNotifier, NoopNotifier};

pub use controller::{FocusEvent, FocusTimer};

pub use logging::init_tracing;
