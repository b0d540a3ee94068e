//! Session lifecycle for focus attempts.
//!
//! [`SessionLifecycle`] watches the timer state and turns focus attempts
//! into [`SessionRecord`]s:
//! - a running focus phase starts an attempt
//! - every five minutes of wall-clock time a checkpoint record is upserted
//! - natural completion or a user skip finalizes the attempt exactly once
//! - a reset discards it, including any checkpoint already written
//!
//! Break phases never produce history.

pub mod record;

pub use record::{
    format_duration, normalize_tags, OpenAttempt, SessionDraft, SessionRecord, TagData,
};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::Persistence;
use crate::types::{TimerMode, TimerState};

/// Wall-clock seconds between checkpoint records of a running attempt.
pub const CHECKPOINT_INTERVAL_SECS: i64 = 300;

// ============================================================================
// Attempt
// ============================================================================

/// Bookkeeping for the focus attempt in progress.
#[derive(Debug, Clone)]
struct Attempt {
    /// Record id shared by every checkpoint and the final record
    id: String,
    /// When the attempt first started running
    started_at: DateTime<Utc>,
    /// When the checkpoint clock was last reset
    last_checkpoint: DateTime<Utc>,
    /// Whether a checkpoint record exists in the store
    checkpointed: bool,
}

impl Attempt {
    fn begin(started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at,
            last_checkpoint: now,
            checkpointed: false,
        }
    }

    fn reopen(open: OpenAttempt, now: DateTime<Utc>) -> Self {
        Self {
            id: open.id,
            started_at: open.started_at,
            last_checkpoint: now,
            checkpointed: open.checkpointed,
        }
    }

    fn to_open(&self) -> OpenAttempt {
        OpenAttempt {
            id: self.id.clone(),
            started_at: self.started_at,
            checkpointed: self.checkpointed,
        }
    }
}

// ============================================================================
// SessionLifecycle
// ============================================================================

/// Binds note/tag metadata to focus attempts and persists their records.
#[derive(Debug)]
pub struct SessionLifecycle {
    persistence: Persistence,
    attempt: Option<Attempt>,
    /// One-shot guard; set by complete/skip, cleared when a new attempt starts
    finalized: bool,
    draft: SessionDraft,
    history: Vec<SessionRecord>,
}

impl SessionLifecycle {
    /// Creates a lifecycle with no attempt, draft or history.
    pub fn new(persistence: Persistence) -> Self {
        Self {
            persistence,
            attempt: None,
            finalized: false,
            draft: SessionDraft::default(),
            history: Vec::new(),
        }
    }

    /// Replaces the draft and history, used once at startup.
    pub fn restore(&mut self, draft: SessionDraft, history: Vec<SessionRecord>) {
        self.draft = draft;
        self.history = history;
        self.history.sort_by_key(|r| r.created_at);
    }

    /// Picks up the attempt persisted by a previous process.
    ///
    /// The attempt is kept only if `state` is a focus phase that was already
    /// under way; otherwise the persisted marker is dropped. The checkpoint
    /// clock restarts at `now`.
    pub fn resume_attempt(&mut self, state: &TimerState, now: DateTime<Utc>) {
        let Some(open) = self.persistence.load_attempt() else {
            return;
        };
        if state.mode == TimerMode::Focus && !state.is_fresh() {
            debug!("Resuming focus attempt {} from {}", open.id, open.started_at);
            self.attempt = Some(Attempt::reopen(open, now));
            self.finalized = false;
        } else {
            debug!("Dropping stale focus attempt {}", open.id);
            self.persistence.clear_attempt();
        }
    }

    /// Note and tags of the current attempt.
    pub fn draft(&self) -> &SessionDraft {
        &self.draft
    }

    /// Sessions known to this process, oldest first.
    pub fn history(&self) -> &[SessionRecord] {
        &self.history
    }

    /// Returns true while a focus attempt is being tracked.
    pub fn has_attempt(&self) -> bool {
        self.attempt.is_some()
    }

    /// Returns true once the current attempt has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Replaces the draft note.
    pub fn set_note(&mut self, text: impl Into<String>) {
        self.draft.note_text = text.into();
    }

    /// Replaces the draft tags with their normalized form.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.draft.tags = normalize_tags(tags);
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    /// Reacts to the latest timer state.
    ///
    /// Starts an attempt when a focus phase is running without one, and
    /// writes a checkpoint once the interval has passed. Returns the
    /// checkpoint record if one was written.
    pub fn observe(&mut self, state: &TimerState, now: DateTime<Utc>) -> Option<SessionRecord> {
        if state.mode != TimerMode::Focus || !state.is_running {
            return None;
        }

        let Some(attempt) = self.attempt.as_ref() else {
            let started_at = now - Duration::seconds(i64::from(state.elapsed_seconds()));
            let attempt = Attempt::begin(started_at, now);
            debug!("Focus attempt {} started at {}", attempt.id, started_at);
            self.persistence.save_attempt(&attempt.to_open());
            self.attempt = Some(attempt);
            self.finalized = false;
            return None;
        };

        if (now - attempt.last_checkpoint).num_seconds() < CHECKPOINT_INTERVAL_SECS {
            return None;
        }

        let attempt = attempt.clone();
        let record = self.build_record(&attempt, state, now, false, state.elapsed_seconds());
        debug!(
            "Checkpoint for attempt {} at {}s",
            attempt.id, record.actual_duration_seconds
        );
        self.persistence.save_session(&record);
        self.upsert_history(record.clone());
        if let Some(current) = self.attempt.as_mut() {
            current.last_checkpoint = now;
            if !current.checkpointed {
                current.checkpointed = true;
                self.persistence.save_attempt(&current.to_open());
            }
        }
        Some(record)
    }

    // ------------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------------

    /// Finalizes a focus phase that ran down to zero.
    ///
    /// Returns `None` for break phases or if the attempt was already
    /// finalized.
    pub fn complete(&mut self, state: &TimerState, now: DateTime<Utc>) -> Option<SessionRecord> {
        if state.mode != TimerMode::Focus || self.finalized {
            return None;
        }
        let attempt = self.take_attempt(state, now);
        let record = self.build_record(&attempt, state, now, true, state.duration);
        Some(self.finalize(record, now))
    }

    /// Finalizes a focus phase the user ended early.
    ///
    /// Returns `None` for break phases, for phases that never ran, or if the
    /// attempt was already finalized.
    pub fn skip(&mut self, state: &TimerState, now: DateTime<Utc>) -> Option<SessionRecord> {
        if state.mode != TimerMode::Focus || self.finalized {
            return None;
        }
        let elapsed = state.elapsed_seconds();
        if self.attempt.is_none() && elapsed == 0 {
            return None;
        }
        let attempt = self.take_attempt(state, now);
        let record = self.build_record(&attempt, state, now, false, elapsed);
        Some(self.finalize(record, now))
    }

    /// Drops the attempt without a record and clears the draft.
    ///
    /// A checkpoint already written for the attempt is deleted.
    pub fn discard(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            debug!("Discarding focus attempt {}", attempt.id);
            if attempt.checkpointed {
                self.persistence.delete_session(&attempt.id);
                self.history.retain(|r| r.id != attempt.id);
            }
            self.persistence.clear_attempt();
        }
        self.finalized = false;
        self.draft = SessionDraft::default();
        self.persistence.clear_draft();
    }

    /// Removes a record from history and the store.
    ///
    /// Returns true if the record was known.
    pub fn delete_record(&mut self, id: &str) -> bool {
        let before = self.history.len();
        self.history.retain(|r| r.id != id);
        self.persistence.delete_session(id);
        self.history.len() != before
    }

    fn take_attempt(&mut self, state: &TimerState, now: DateTime<Utc>) -> Attempt {
        self.attempt.take().unwrap_or_else(|| {
            let started_at = now - Duration::seconds(i64::from(state.elapsed_seconds()));
            Attempt::begin(started_at, now)
        })
    }

    fn build_record(
        &self,
        attempt: &Attempt,
        state: &TimerState,
        now: DateTime<Utc>,
        completed: bool,
        actual_seconds: u32,
    ) -> SessionRecord {
        let actual_seconds = actual_seconds.min(state.duration);
        SessionRecord {
            id: attempt.id.clone(),
            start_timestamp: attempt.started_at,
            end_timestamp: now,
            planned_duration_seconds: state.duration,
            actual_duration_seconds: actual_seconds,
            duration_string: format_duration(actual_seconds),
            mode: TimerMode::Focus,
            completed,
            note_text: self.draft.note_text.clone(),
            tags: self.draft.tags.clone(),
            created_at: attempt.started_at.timestamp_millis(),
        }
    }

    fn finalize(&mut self, record: SessionRecord, now: DateTime<Utc>) -> SessionRecord {
        info!(
            "Session {} finalized (completed: {}, {})",
            record.id, record.completed, record.duration_string
        );
        self.persistence.save_session(&record);
        self.persistence
            .record_tag_usage(&record.tags, now.timestamp_millis());
        self.upsert_history(record.clone());
        self.finalized = true;
        self.attempt = None;
        self.persistence.clear_attempt();
        self.draft = SessionDraft::default();
        self.persistence.clear_draft();
        record
    }

    fn upsert_history(&mut self, record: SessionRecord) {
        match self.history.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => {
                let at = self
                    .history
                    .partition_point(|r| r.created_at <= record.created_at);
                self.history.insert(at, record);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
