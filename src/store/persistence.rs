//! Typed, failure-tolerant access to the durable store.
//!
//! Every public method here is infallible from the caller's point of view.
//! Reads fall back to defaults and writes are best-effort; failures are
//! logged at `warn` and the in-memory state stays authoritative.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{DurableStore, Table, CREATED_AT_INDEX};
use crate::session::{OpenAttempt, SessionDraft, SessionRecord, TagData};
use crate::streak::StreakState;
use crate::types::{TimerSettings, TimerState};

/// Key of every singleton record.
const CURRENT_KEY: &str = "current";

/// Key of the note/tag draft inside the timer-state table.
const DRAFT_KEY: &str = "draft";

/// Key of the open focus attempt inside the timer-state table.
const ATTEMPT_KEY: &str = "attempt";

/// Typed facade over a shared [`DurableStore`].
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn DurableStore>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    /// Wraps a shared store.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    fn read<T: DeserializeOwned>(&self, table: Table, key: &str) -> Result<Option<T>> {
        let Some(value) = self
            .store
            .get(table, key)
            .with_context(|| format!("Failed to read '{key}' from {table}"))?
        else {
            return Ok(None);
        };
        let record = serde_json::from_value(value)
            .with_context(|| format!("Failed to decode '{key}' from {table}"))?;
        Ok(Some(record))
    }

    fn write<T: Serialize>(&self, table: Table, key: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)
            .with_context(|| format!("Failed to encode '{key}' for {table}"))?;
        self.store
            .put(table, key, value)
            .with_context(|| format!("Failed to write '{key}' to {table}"))
    }

    fn remove(&self, table: Table, key: &str) -> Result<()> {
        self.store
            .delete(table, key)
            .with_context(|| format!("Failed to delete '{key}' from {table}"))
    }

    fn best_effort(&self, what: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not persist {}: {:#}", what, e);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Loads settings, substituting defaults for missing or invalid data.
    pub fn load_settings(&self) -> TimerSettings {
        match self.read::<TimerSettings>(Table::Settings, CURRENT_KEY) {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    warn!("Discarding persisted settings: {}", e);
                    TimerSettings::default()
                }
            },
            Ok(None) => TimerSettings::default(),
            Err(e) => {
                warn!("Using default settings: {:#}", e);
                TimerSettings::default()
            }
        }
    }

    /// Saves settings; returns false if the write failed.
    pub fn save_settings(&self, settings: &TimerSettings) -> bool {
        self.best_effort("settings", self.write(Table::Settings, CURRENT_KEY, settings))
    }

    // ------------------------------------------------------------------------
    // Timer state
    // ------------------------------------------------------------------------

    /// Loads the persisted timer state if it exists and passes validation.
    pub fn load_timer_state(&self) -> Option<TimerState> {
        match self.read::<TimerState>(Table::TimerState, CURRENT_KEY) {
            Ok(Some(state)) => match state.validate() {
                Ok(()) => Some(state),
                Err(e) => {
                    warn!("Discarding persisted timer state: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Using default timer state: {:#}", e);
                None
            }
        }
    }

    /// Saves the timer state; returns false if the write failed.
    pub fn save_timer_state(&self, state: &TimerState) -> bool {
        debug!(
            "Saving timer state ({}, running: {}, remaining: {}s)",
            state.mode.as_str(),
            state.is_running,
            state.time_remaining
        );
        self.best_effort("timer state", self.write(Table::TimerState, CURRENT_KEY, state))
    }

    // ------------------------------------------------------------------------
    // Draft
    // ------------------------------------------------------------------------

    /// Loads the note/tag draft, empty if missing or unreadable.
    pub fn load_draft(&self) -> SessionDraft {
        match self.read::<SessionDraft>(Table::TimerState, DRAFT_KEY) {
            Ok(draft) => draft.unwrap_or_default(),
            Err(e) => {
                warn!("Using empty session draft: {:#}", e);
                SessionDraft::default()
            }
        }
    }

    /// Saves the note/tag draft.
    pub fn save_draft(&self, draft: &SessionDraft) -> bool {
        self.best_effort("session draft", self.write(Table::TimerState, DRAFT_KEY, draft))
    }

    /// Removes the note/tag draft.
    pub fn clear_draft(&self) -> bool {
        self.best_effort("draft removal", self.remove(Table::TimerState, DRAFT_KEY))
    }

    // ------------------------------------------------------------------------
    // Open attempt
    // ------------------------------------------------------------------------

    /// Loads the open focus attempt left by a previous process.
    pub fn load_attempt(&self) -> Option<OpenAttempt> {
        match self.read::<OpenAttempt>(Table::TimerState, ATTEMPT_KEY) {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!("Ignoring open attempt: {:#}", e);
                None
            }
        }
    }

    /// Saves the identity of the open focus attempt.
    pub fn save_attempt(&self, attempt: &OpenAttempt) -> bool {
        self.best_effort("open attempt", self.write(Table::TimerState, ATTEMPT_KEY, attempt))
    }

    /// Forgets the open focus attempt.
    pub fn clear_attempt(&self) -> bool {
        self.best_effort("open attempt removal", self.remove(Table::TimerState, ATTEMPT_KEY))
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Upserts a session record under its id.
    pub fn save_session(&self, record: &SessionRecord) -> bool {
        self.best_effort(
            &format!("session {}", record.id),
            self.write(Table::Sessions, &record.id, record),
        )
    }

    /// Deletes a session record by id.
    pub fn delete_session(&self, id: &str) -> bool {
        self.best_effort(&format!("deletion of session {id}"), self.remove(Table::Sessions, id))
    }

    /// Loads all sessions ordered by creation time.
    ///
    /// Returns `None` if the store could not be read at all. Individual
    /// records that fail to decode are skipped.
    pub fn load_sessions(&self) -> Option<Vec<SessionRecord>> {
        let rows = match self
            .store
            .get_all_by_index(Table::Sessions, CREATED_AT_INDEX)
            .context("Failed to read session history")
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{:#}", e);
                return None;
            }
        };

        let total = rows.len();
        let records: Vec<SessionRecord> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable session record: {}", e);
                    None
                }
            })
            .collect();
        debug!("Loaded {} of {} session records", records.len(), total);
        Some(records)
    }

    // ------------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------------

    /// Increments the usage counter of every tag in `tags`.
    pub fn record_tag_usage(&self, tags: &[String], at_ms: i64) {
        for tag in tags {
            let result = self
                .read::<TagData>(Table::Tags, tag)
                .and_then(|existing| {
                    let mut data = existing.unwrap_or_else(|| TagData::new(tag.as_str()));
                    data.record_use(at_ms);
                    self.write(Table::Tags, tag, &data)
                });
            self.best_effort(&format!("usage of tag '{tag}'"), result);
        }
    }

    /// Loads every known tag, skipping unreadable rows.
    pub fn load_tags(&self) -> Vec<TagData> {
        let rows = match self.store.get_all(Table::Tags).context("Failed to read tags") {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{:#}", e);
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect()
    }

    /// Returns up to `limit` tags starting with `prefix`, most used first and
    /// most recently used among equals.
    pub fn tag_suggestions(&self, prefix: &str, limit: usize) -> Vec<TagData> {
        let prefix = prefix.trim().trim_start_matches('#').to_lowercase();
        let mut tags: Vec<TagData> = self
            .load_tags()
            .into_iter()
            .filter(|tag| tag.value.starts_with(&prefix))
            .collect();
        tags.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then(b.last_used.cmp(&a.last_used))
                .then(a.value.cmp(&b.value))
        });
        tags.truncate(limit);
        tags
    }

    // ------------------------------------------------------------------------
    // Streak
    // ------------------------------------------------------------------------

    /// Loads the streak baseline, substituting an empty one for missing or
    /// invalid data.
    pub fn load_streak(&self) -> StreakState {
        match self.read::<StreakState>(Table::Streak, CURRENT_KEY) {
            Ok(Some(streak)) => match streak.validate() {
                Ok(()) => streak,
                Err(e) => {
                    warn!("Discarding persisted streak: {}", e);
                    StreakState::default()
                }
            },
            Ok(None) => StreakState::default(),
            Err(e) => {
                warn!("Using empty streak baseline: {:#}", e);
                StreakState::default()
            }
        }
    }

    /// Saves the streak state.
    pub fn save_streak(&self, streak: &StreakState) -> bool {
        self.best_effort("streak", self.write(Table::Streak, CURRENT_KEY, streak))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::format_duration;
    use crate::store::MemoryStore;
    use crate::types::TimerMode;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, Persistence) {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone());
        (store, persistence)
    }

    fn record(id: &str, created_at_secs: i64) -> SessionRecord {
        let start = Utc.timestamp_opt(created_at_secs, 0).unwrap();
        SessionRecord {
            id: id.to_string(),
            start_timestamp: start,
            end_timestamp: start + chrono::Duration::minutes(25),
            planned_duration_seconds: 1500,
            actual_duration_seconds: 1500,
            duration_string: format_duration(1500),
            mode: TimerMode::Focus,
            completed: true,
            note_text: String::new(),
            tags: Vec::new(),
            created_at: start.timestamp_millis(),
        }
    }

    // ------------------------------------------------------------------------
    // Settings / state Tests
    // ------------------------------------------------------------------------

    mod settings_tests {
        use super::*;

        #[test]
        fn test_settings_round_trip() {
            let (_, persistence) = setup();
            let settings = TimerSettings::default().with_focus_minutes(50);

            assert!(persistence.save_settings(&settings));
            assert_eq!(persistence.load_settings(), settings);
        }

        #[test]
        fn test_invalid_settings_fall_back_to_default() {
            let (store, persistence) = setup();
            store
                .put(Table::Settings, CURRENT_KEY, json!({"focusMinutes": 0}))
                .unwrap();

            assert_eq!(persistence.load_settings(), TimerSettings::default());
        }

        #[test]
        fn test_partial_settings_fill_defaults() {
            let (store, persistence) = setup();
            store
                .put(Table::Settings, CURRENT_KEY, json!({"autoStartNext": true}))
                .unwrap();

            let settings = persistence.load_settings();
            assert!(settings.auto_start_next);
            assert_eq!(settings.focus_minutes, 25);
        }

        #[test]
        fn test_unavailable_store_uses_defaults() {
            let (store, persistence) = setup();
            store.set_available(false);

            assert_eq!(persistence.load_settings(), TimerSettings::default());
            assert!(!persistence.save_settings(&TimerSettings::default()));
            assert!(persistence.load_timer_state().is_none());
            assert_eq!(persistence.load_streak(), StreakState::default());
            assert!(persistence.load_sessions().is_none());
        }
    }

    mod timer_state_tests {
        use super::*;

        #[test]
        fn test_timer_state_round_trip() {
            let (_, persistence) = setup();
            let state = TimerState::default();

            persistence.save_timer_state(&state);
            assert_eq!(persistence.load_timer_state(), Some(state));
        }

        #[test]
        fn test_unknown_mode_is_discarded() {
            let (store, persistence) = setup();
            store
                .put(
                    Table::TimerState,
                    CURRENT_KEY,
                    json!({
                        "mode": "nap",
                        "duration": 1500,
                        "timeRemaining": 1500,
                        "isRunning": false,
                        "sessionCount": 1
                    }),
                )
                .unwrap();

            assert!(persistence.load_timer_state().is_none());
        }

        #[test]
        fn test_out_of_range_state_is_discarded() {
            let (store, persistence) = setup();
            store
                .put(
                    Table::TimerState,
                    CURRENT_KEY,
                    json!({
                        "mode": "focus",
                        "duration": 1500,
                        "timeRemaining": 1800,
                        "isRunning": false,
                        "sessionCount": 1
                    }),
                )
                .unwrap();

            assert!(persistence.load_timer_state().is_none());
        }

        #[test]
        fn test_draft_does_not_clobber_state() {
            let (_, persistence) = setup();
            let draft = SessionDraft {
                note_text: "notes".to_string(),
                tags: vec!["rust".to_string()],
            };

            persistence.save_timer_state(&TimerState::default());
            persistence.save_draft(&draft);

            assert_eq!(persistence.load_draft(), draft);
            assert!(persistence.load_timer_state().is_some());

            persistence.clear_draft();
            assert_eq!(persistence.load_draft(), SessionDraft::default());
        }

        #[test]
        fn test_open_attempt_round_trip() {
            let (_, persistence) = setup();
            let attempt = OpenAttempt {
                id: "attempt-1".to_string(),
                started_at: Utc.timestamp_opt(1_000, 0).unwrap(),
                checkpointed: true,
            };

            assert!(persistence.load_attempt().is_none());
            persistence.save_attempt(&attempt);
            persistence.save_timer_state(&TimerState::default());

            assert_eq!(persistence.load_attempt(), Some(attempt));
            persistence.clear_attempt();
            assert!(persistence.load_attempt().is_none());
            assert!(persistence.load_timer_state().is_some());
        }
    }

    // ------------------------------------------------------------------------
    // Session Tests
    // ------------------------------------------------------------------------

    mod session_tests {
        use super::*;

        #[test]
        fn test_sessions_ordered_by_creation() {
            let (_, persistence) = setup();
            persistence.save_session(&record("late", 2_000));
            persistence.save_session(&record("early", 1_000));

            let ids: Vec<String> = persistence
                .load_sessions()
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, vec!["early", "late"]);
        }

        #[test]
        fn test_save_session_upserts_by_id() {
            let (store, persistence) = setup();
            let mut checkpoint = record("a", 1_000);
            checkpoint.completed = false;
            checkpoint.actual_duration_seconds = 300;

            persistence.save_session(&checkpoint);
            persistence.save_session(&record("a", 1_000));

            assert_eq!(store.len(Table::Sessions), 1);
            assert!(persistence.load_sessions().unwrap()[0].completed);
        }

        #[test]
        fn test_corrupt_record_is_skipped() {
            let (store, persistence) = setup();
            persistence.save_session(&record("good", 1_000));
            store
                .put(Table::Sessions, "bad", json!({"createdAt": 5, "mode": "focus"}))
                .unwrap();

            let records = persistence.load_sessions().unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].id, "good");
        }

        #[test]
        fn test_delete_session() {
            let (store, persistence) = setup();
            persistence.save_session(&record("a", 1_000));

            assert!(persistence.delete_session("a"));
            assert!(store.is_empty(Table::Sessions));
        }
    }

    // ------------------------------------------------------------------------
    // Tag Tests
    // ------------------------------------------------------------------------

    mod tag_tests {
        use super::*;

        #[test]
        fn test_record_tag_usage_increments() {
            let (_, persistence) = setup();
            let tags = vec!["rust".to_string(), "writing".to_string()];

            persistence.record_tag_usage(&tags, 1_000);
            persistence.record_tag_usage(&tags[..1], 2_000);

            let mut stored = persistence.load_tags();
            stored.sort_by(|a, b| a.value.cmp(&b.value));
            assert_eq!(stored[0].value, "rust");
            assert_eq!(stored[0].usage_count, 2);
            assert_eq!(stored[0].last_used, 2_000);
            assert_eq!(stored[1].usage_count, 1);
        }

        #[test]
        fn test_tag_suggestions_ranking() {
            let (_, persistence) = setup();
            persistence.record_tag_usage(&["reading".to_string()], 1_000);
            persistence.record_tag_usage(&["review".to_string()], 3_000);
            persistence.record_tag_usage(&["rust".to_string()], 2_000);
            persistence.record_tag_usage(&["rust".to_string()], 2_500);
            persistence.record_tag_usage(&["writing".to_string()], 4_000);

            let values: Vec<String> = persistence
                .tag_suggestions("#R", 10)
                .into_iter()
                .map(|t| t.value)
                .collect();
            assert_eq!(values, vec!["rust", "review", "reading"]);

            assert_eq!(persistence.tag_suggestions("r", 1).len(), 1);
        }

        #[test]
        fn test_tag_usage_tolerates_unavailable_store() {
            let (store, persistence) = setup();
            store.set_available(false);

            persistence.record_tag_usage(&["rust".to_string()], 1_000);
            assert!(persistence.tag_suggestions("", 5).is_empty());
        }
    }

    // ------------------------------------------------------------------------
    // Streak Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_streak_round_trip() {
        let (_, persistence) = setup();
        let streak = StreakState {
            current_streak: 3,
            best_streak: 8,
            last_active_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
            protection_used: true,
            protected_on: None,
        };

        persistence.save_streak(&streak);
        assert_eq!(persistence.load_streak(), streak);
    }

    #[test]
    fn test_inconsistent_streak_falls_back_to_default() {
        let (store, persistence) = setup();
        store
            .put(
                Table::Streak,
                CURRENT_KEY,
                json!({
                    "currentStreak": 9,
                    "bestStreak": 4,
                    "lastActiveDate": "2024-06-01",
                    "protectionUsed": false
                }),
            )
            .unwrap();

        assert_eq!(persistence.load_streak(), StreakState::default());
    }

    #[test]
    fn test_streak_without_protection_day_loads() {
        let (store, persistence) = setup();
        store
            .put(
                Table::Streak,
                CURRENT_KEY,
                json!({
                    "currentStreak": 2,
                    "bestStreak": 4,
                    "lastActiveDate": "2024-06-01",
                    "protectionUsed": true
                }),
            )
            .unwrap();

        let streak = persistence.load_streak();
        assert_eq!(streak.current_streak, 2);
        assert!(streak.protection_used);
        assert_eq!(streak.protected_on, None);
    }
}
