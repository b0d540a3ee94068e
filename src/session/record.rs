//! Session record, draft and tag types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TimerMode;

// ============================================================================
// SessionRecord
// ============================================================================

/// Durable record of one focus attempt.
///
/// Written by the lifecycle manager at checkpoint, completion or skip and
/// never mutated by the timer afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Unique id, stable across checkpoints of the same attempt
    pub id: String,
    /// When the attempt started
    pub start_timestamp: DateTime<Utc>,
    /// When the record was written
    pub end_timestamp: DateTime<Utc>,
    /// Planned phase length in seconds
    pub planned_duration_seconds: u32,
    /// Seconds actually spent focusing
    pub actual_duration_seconds: u32,
    /// `MM:SS` rendering of `actual_duration_seconds`
    pub duration_string: String,
    /// Always [`TimerMode::Focus`]
    pub mode: TimerMode,
    /// True only if the phase ran down to zero
    pub completed: bool,
    /// Free-form note
    #[serde(default)]
    pub note_text: String,
    /// Normalized tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sort key (epoch milliseconds of the attempt start)
    pub created_at: i64,
}

impl SessionRecord {
    /// Returns true if the record counts toward a day's streak activity.
    pub fn is_qualifying(&self) -> bool {
        crate::streak::is_qualifying(self)
    }
}

/// Renders seconds as `MM:SS`; minutes are not wrapped at 60.
pub fn format_duration(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

// ============================================================================
// SessionDraft
// ============================================================================

/// Note and tags the user attaches to the current attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    #[serde(default)]
    pub note_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SessionDraft {
    /// Returns true if there is nothing to attach.
    pub fn is_empty(&self) -> bool {
        self.note_text.trim().is_empty() && self.tags.is_empty()
    }
}

/// Lowercases, trims and de-duplicates tags, keeping first-seen order.
///
/// A leading `#` is dropped and empty tags are skipped.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().trim_start_matches('#').trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

// ============================================================================
// OpenAttempt
// ============================================================================

/// Identity of the focus attempt in progress, persisted so a reload keeps
/// upserting the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAttempt {
    /// Record id shared by every checkpoint and the final record
    pub id: String,
    /// When the attempt first started running
    pub started_at: DateTime<Utc>,
    /// Whether a checkpoint record was written
    #[serde(default)]
    pub checkpointed: bool,
}

// ============================================================================
// TagData
// ============================================================================

/// Usage statistics for one tag, used to rank suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagData {
    /// Normalized tag text
    pub value: String,
    /// Number of finalized sessions carrying the tag
    pub usage_count: u32,
    /// Epoch milliseconds of the last use
    pub last_used: i64,
}

impl TagData {
    /// Creates an entry for a tag that has not been used yet.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            usage_count: 0,
            last_used: 0,
        }
    }

    /// Records one more use at `at_ms`.
    pub fn record_use(&mut self, at_ms: i64) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used = self.last_used.max(at_ms);
    }
}
