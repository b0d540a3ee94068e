//! The focus timer controller.
//!
//! [`FocusTimer`] is the handle hosts hold. It owns one timer engine, one
//! session lifecycle and the streak, and wires them together:
//! - every user operation first brings the countdown up to date, so a
//!   completion that happened while nobody was ticking is handled first
//! - a natural completion notifies once, finalizes the focus record,
//!   recomputes the streak and schedules the delayed auto-advance
//! - timer state is saved immediately when idle and debounced while running;
//!   draft and streak saves are debounced as well
//!
//! Clones share the same state. Observable changes are published as
//! [`FocusEvent`]s on the channel returned by [`FocusTimer::load`].

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::SettingsError;
use crate::notify::CompletionNotifier;
use crate::session::{normalize_tags, SessionDraft, SessionLifecycle, SessionRecord, TagData};
use crate::store::{DurableStore, Persistence};
use crate::streak::{group_daily_activity, recompute_streak, replay_streaks, DailyActivity, StreakState};
use crate::timer::engine::reconcile_loaded;
use crate::timer::schedule::{
    AUTO_ADVANCE_DELAY, AUTO_START_DELAY, DRAFT_SAVE_DEBOUNCE, STREAK_SAVE_DEBOUNCE,
    TIMER_SAVE_DEBOUNCE,
};
use crate::timer::{TaskSlot, TimerAction, TimerEngine, TimerEvent};
use crate::types::{TimerSettings, TimerState};

/// Cadence of the background ticker.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// FocusEvent
// ============================================================================

/// Changes published to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusEvent {
    /// The timer accepted a transition
    Timer(TimerEvent),
    /// A focus attempt was completed or skipped
    SessionFinalized(SessionRecord),
    /// The streak changed after a recomputation
    StreakUpdated(StreakState),
    /// The note/tag input should be cleared
    DraftCleared,
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    /// Back-reference handed to scheduled tasks
    this: Weak<Mutex<Inner>>,
    engine: TimerEngine,
    session: SessionLifecycle,
    streak: StreakState,
    persistence: Persistence,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn CompletionNotifier>,
    events: UnboundedSender<FocusEvent>,
    timer_save: TaskSlot,
    draft_save: TaskSlot,
    streak_save: TaskSlot,
    advance: TaskSlot,
    auto_start: TaskSlot,
}

impl Inner {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }

    fn publish(&self, event: FocusEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }

    /// Dispatches one action and runs everything that hangs off it.
    fn apply(&mut self, action: TimerAction) -> Option<TimerEvent> {
        let now = self.now();
        let event = self.engine.dispatch(action, now.timestamp_millis());

        if let Some(event) = &event {
            self.publish(FocusEvent::Timer(event.clone()));
            if let TimerEvent::Completed { mode, .. } = event {
                info!("{} phase completed", mode.as_str());
                self.notifier.notify_completion(*mode);
                if let Some(record) = self.session.complete(self.engine.state(), now) {
                    self.draft_save.cancel();
                    self.publish(FocusEvent::SessionFinalized(record));
                    self.publish(FocusEvent::DraftCleared);
                    self.refresh_streak();
                }
                self.schedule_advance();
            }
            if !matches!(event, TimerEvent::Tick { .. }) {
                self.persist_timer_state();
            }
        }

        self.session.observe(self.engine.state(), now);
        event
    }

    /// Recomputes the countdown if it is live.
    fn catch_up(&mut self) {
        if self.engine.state().is_running {
            self.apply(TimerAction::Tick);
        }
    }

    fn cancel_auto_advance(&mut self) {
        let advance = self.advance.cancel();
        let auto_start = self.auto_start.cancel();
        if advance || auto_start {
            debug!("Pending auto-advance cancelled by user action");
        }
    }

    /// Records a focus phase that ran out while the process was gone.
    fn complete_while_closed(&mut self, finished_at: DateTime<Utc>) {
        if let Some(record) = self.session.complete(self.engine.state(), finished_at) {
            info!("Recorded focus session that finished at {}", finished_at);
            self.publish(FocusEvent::SessionFinalized(record));
            self.publish(FocusEvent::DraftCleared);
        }
    }

    fn discard_attempt(&mut self) {
        self.draft_save.cancel();
        self.session.discard();
        self.publish(FocusEvent::DraftCleared);
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn persist_timer_state(&mut self) {
        let state = self.engine.state().clone();
        if state.is_running {
            let persistence = self.persistence.clone();
            self.timer_save.schedule(async move {
                persistence.save_timer_state(&state);
            });
        } else {
            self.timer_save.cancel();
            self.persistence.save_timer_state(&state);
        }
    }

    fn persist_draft(&mut self) {
        let draft = self.session.draft().clone();
        let persistence = self.persistence.clone();
        self.draft_save.schedule(async move {
            persistence.save_draft(&draft);
        });
    }

    fn set_streak(&mut self, next: StreakState) {
        if next != self.streak {
            info!(
                "Streak is now {} (best {})",
                next.current_streak, next.best_streak
            );
            self.streak = next.clone();
            self.publish(FocusEvent::StreakUpdated(next));
        }
        let streak = self.streak.clone();
        let persistence = self.persistence.clone();
        self.streak_save.schedule(async move {
            persistence.save_streak(&streak);
        });
    }

    fn refresh_streak(&mut self) {
        let next = recompute_streak(self.session.history(), &self.streak, self.today(), &Local);
        self.set_streak(next);
    }

    // ------------------------------------------------------------------------
    // Auto-advance
    // ------------------------------------------------------------------------

    fn schedule_advance(&mut self) {
        let this = self.this.clone();
        self.advance.schedule(async move {
            if let Some(inner) = this.upgrade() {
                inner.lock().await.auto_advance();
            }
        });
    }

    fn auto_advance(&mut self) {
        if !self.engine.state().is_completed() {
            return;
        }
        debug!("Advancing past completed phase");
        self.apply(TimerAction::Skip);

        if self.engine.settings().auto_start_next {
            let this = self.this.clone();
            self.auto_start.schedule(async move {
                if let Some(inner) = this.upgrade() {
                    inner.lock().await.auto_start_phase();
                }
            });
        }
    }

    fn auto_start_phase(&mut self) {
        if self.engine.state().is_fresh() {
            debug!("Auto-starting {} phase", self.engine.state().mode.as_str());
            self.apply(TimerAction::Start);
        }
    }
}

// ============================================================================
// FocusTimer
// ============================================================================

/// Shared handle to one focus timer.
#[derive(Clone)]
pub struct FocusTimer {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for FocusTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusTimer").finish_non_exhaustive()
    }
}

impl FocusTimer {
    /// Loads persisted state and returns the handle plus its event stream.
    ///
    /// Invalid or unreadable records are replaced by defaults. A focus
    /// attempt that was under way keeps its record id. A phase that ran out
    /// while the process was gone is fast-forwarded to completion and
    /// advanced after the usual delay without a notification; a focus phase
    /// is recorded as completed at the moment it reached zero.
    ///
    /// Must be called from within a tokio runtime.
    pub fn load(
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> (Self, UnboundedReceiver<FocusEvent>) {
        let persistence = Persistence::new(store);
        let settings = persistence.load_settings();
        let now = clock.now();

        let persisted = persistence
            .load_timer_state()
            .unwrap_or_else(|| TimerState::new(&settings));
        let finished_at = persisted
            .finishes_at_ms()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(now);
        let (state, fast_forwarded) = reconcile_loaded(persisted, now.timestamp_millis());
        if fast_forwarded {
            info!("Phase finished while closed; fast-forwarded to completion");
        }

        let mut session = SessionLifecycle::new(persistence.clone());
        session.restore(
            persistence.load_draft(),
            persistence.load_sessions().unwrap_or_default(),
        );
        session.resume_attempt(&state, now);
        let streak = persistence.load_streak();

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new_cyclic(|this| {
            let mut inner = Inner {
                this: this.clone(),
                engine: TimerEngine::new(settings),
                session,
                streak,
                persistence,
                clock,
                notifier,
                events: tx,
                timer_save: TaskSlot::new("timer-save", TIMER_SAVE_DEBOUNCE),
                draft_save: TaskSlot::new("draft-save", DRAFT_SAVE_DEBOUNCE),
                streak_save: TaskSlot::new("streak-save", STREAK_SAVE_DEBOUNCE),
                advance: TaskSlot::new("auto-advance", AUTO_ADVANCE_DELAY),
                auto_start: TaskSlot::new("auto-start", AUTO_START_DELAY),
            };
            inner.apply(TimerAction::Load(state));
            if fast_forwarded {
                inner.complete_while_closed(finished_at);
            }
            if inner.engine.state().is_completed() {
                inner.schedule_advance();
            }
            inner.refresh_streak();
            Mutex::new(inner)
        });

        (Self { inner }, rx)
    }

    /// Spawns the 1 Hz ticker. It stops when every handle is dropped.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.lock().await.catch_up();
            }
        })
    }

    // ------------------------------------------------------------------------
    // Timer operations
    // ------------------------------------------------------------------------

    /// Starts a fresh phase.
    pub async fn start(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.lock().await;
        inner.catch_up();
        inner.apply(TimerAction::Start)
    }

    /// Pauses the running phase.
    pub async fn pause(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.lock().await;
        inner.catch_up();
        inner.apply(TimerAction::Pause)
    }

    /// Resumes a paused phase.
    pub async fn resume(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.lock().await;
        inner.apply(TimerAction::Resume)
    }

    /// Discards the current attempt and returns the phase to full length.
    pub async fn reset(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.lock().await;
        inner.catch_up();
        inner.cancel_auto_advance();
        inner.discard_attempt();
        inner.apply(TimerAction::Reset)
    }

    /// Ends the current phase early and moves to the next one.
    ///
    /// A focus attempt that already ran is recorded as not completed.
    pub async fn skip(&self) -> Option<TimerEvent> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.catch_up();
        inner.cancel_auto_advance();
        let now = inner.now();
        if let Some(record) = inner.session.skip(inner.engine.state(), now) {
            inner.draft_save.cancel();
            inner.publish(FocusEvent::SessionFinalized(record));
            inner.publish(FocusEvent::DraftCleared);
        }
        inner.apply(TimerAction::Skip)
    }

    /// Recomputes the remaining time. A no-op unless running.
    pub async fn tick(&self) -> Option<TimerEvent> {
        let mut inner = self.inner.lock().await;
        if !inner.engine.state().is_running {
            return None;
        }
        inner.apply(TimerAction::Tick)
    }

    /// Changes all phase lengths (minutes) and restarts the current phase.
    ///
    /// The in-progress attempt is discarded. Invalid lengths are rejected
    /// without touching anything.
    pub async fn set_custom_durations(
        &self,
        focus_minutes: u32,
        short_break_minutes: u32,
        long_break_minutes: u32,
    ) -> Result<(), SettingsError> {
        let mut inner = self.inner.lock().await;
        inner
            .engine
            .settings()
            .clone()
            .with_focus_minutes(focus_minutes)
            .with_short_break_minutes(short_break_minutes)
            .with_long_break_minutes(long_break_minutes)
            .validate()?;

        inner.catch_up();
        inner.cancel_auto_advance();
        inner.discard_attempt();
        inner.apply(TimerAction::SetDurations {
            focus_minutes,
            short_break_minutes,
            long_break_minutes,
        });
        let settings = inner.engine.settings().clone();
        inner.persistence.save_settings(&settings);
        Ok(())
    }

    /// Enables or disables starting the next phase automatically.
    pub async fn set_auto_start(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        inner.engine.set_auto_start_next(enabled);
        let settings = inner.engine.settings().clone();
        inner.persistence.save_settings(&settings);
    }

    // ------------------------------------------------------------------------
    // Draft
    // ------------------------------------------------------------------------

    /// Replaces the note attached to the current attempt.
    pub async fn set_note(&self, text: impl Into<String>) {
        let text = text.into();
        let mut inner = self.inner.lock().await;
        inner.session.set_note(text);
        inner.persist_draft();
    }

    /// Replaces the tags attached to the current attempt.
    pub async fn set_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = normalize_tags(tags);
        let mut inner = self.inner.lock().await;
        inner.session.set_tags(tags);
        inner.persist_draft();
    }

    /// Note and tags attached to the current attempt.
    pub async fn draft(&self) -> SessionDraft {
        self.inner.lock().await.session.draft().clone()
    }

    /// Up to `limit` known tags starting with `prefix`, best first.
    pub async fn tag_suggestions(&self, prefix: &str, limit: usize) -> Vec<TagData> {
        self.inner
            .lock()
            .await
            .persistence
            .tag_suggestions(prefix, limit)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Current timer state, brought up to date with the clock.
    pub async fn snapshot(&self) -> TimerState {
        let mut inner = self.inner.lock().await;
        inner.catch_up();
        inner.engine.state().clone()
    }

    /// Current phase lengths and auto-start preference.
    pub async fn settings(&self) -> TimerSettings {
        self.inner.lock().await.engine.settings().clone()
    }

    /// Latest computed streak.
    pub async fn streak(&self) -> StreakState {
        self.inner.lock().await.streak.clone()
    }

    /// All known sessions, oldest first.
    pub async fn history(&self) -> Vec<SessionRecord> {
        self.inner.lock().await.session.history().to_vec()
    }

    /// Qualifying activity per local day.
    pub async fn daily_activity(&self) -> BTreeMap<NaiveDate, DailyActivity> {
        let inner = self.inner.lock().await;
        group_daily_activity(inner.session.history(), &Local)
    }

    /// Deletes a session and rebuilds the streak from the remaining history.
    ///
    /// Returns true if the session was known.
    pub async fn delete_session(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.session.delete_record(id) {
            return false;
        }
        let activity = group_daily_activity(inner.session.history(), &Local);
        let rebuilt = replay_streaks(&activity, inner.today());
        inner.set_streak(rebuilt);
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
