//! Durable store contract.
//!
//! The core never talks to a storage engine directly. It depends on the
//! small [`DurableStore`] trait below and wraps it in [`Persistence`], which
//! adds typed records, validation and failure tolerance.

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::Persistence;

use serde_json::Value;

use crate::error::StoreError;

/// Secondary index on the sessions table.
pub const CREATED_AT_INDEX: &str = "createdAt";

// ============================================================================
// Table
// ============================================================================

/// The keyspaces the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Singleton timer state (plus the session draft)
    TimerState,
    /// Singleton settings
    Settings,
    /// Session records keyed by id
    Sessions,
    /// Tag usage keyed by tag value
    Tags,
    /// Singleton streak state
    Streak,
}

impl Table {
    /// Returns the table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::TimerState => "timerState",
            Table::Settings => "settings",
            Table::Sessions => "sessions",
            Table::Tags => "tags",
            Table::Streak => "streak",
        }
    }

    /// Returns the secondary indexes defined on the table.
    pub fn indexes(&self) -> &'static [&'static str] {
        match self {
            Table::Sessions => &[CREATED_AT_INDEX],
            _ => &[],
        }
    }

    /// Returns true if `index` exists on the table.
    pub fn has_index(&self, index: &str) -> bool {
        self.indexes().contains(&index)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DurableStore
// ============================================================================

/// Keyed record storage with one ordering index per table at most.
///
/// Records are JSON values. Implementations must be safe to share across
/// tasks; calls are short and synchronous.
pub trait DurableStore: Send + Sync {
    /// Reads one record.
    fn get(&self, table: Table, key: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts or replaces one record.
    fn put(&self, table: Table, key: &str, record: Value) -> Result<(), StoreError>;

    /// Removes one record. Deleting a missing key is not an error.
    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError>;

    /// Reads every record of a table in key order.
    fn get_all(&self, table: Table) -> Result<Vec<Value>, StoreError>;

    /// Reads every record of a table ordered ascending by `index`.
    fn get_all_by_index(&self, table: Table, index: &str) -> Result<Vec<Value>, StoreError>;
}
