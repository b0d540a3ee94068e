//! In-memory durable store.
//!
//! Used by tests and by hosts without a real storage engine. Availability can
//! be toggled at runtime to exercise the failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use super::{DurableStore, Table};
use crate::error::StoreError;

type Tables = HashMap<Table, BTreeMap<String, Value>>;

/// A [`DurableStore`] backed by process memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
    put_count: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            put_count: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent call succeed or fail with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Number of records currently in `table`.
    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.get(&table).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Returns true if `table` holds no records.
    #[must_use]
    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(f(&mut tables))
    }
}

fn index_key(record: &Value, index: &str) -> Option<i64> {
    record.get(index).and_then(Value::as_i64)
}

impl DurableStore for MemoryStore {
    fn get(&self, table: Table, key: &str) -> Result<Option<Value>, StoreError> {
        self.with_tables(|tables| tables.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    fn put(&self, table: Table, key: &str, record: Value) -> Result<(), StoreError> {
        self.with_tables(|tables| {
            tables
                .entry(table)
                .or_default()
                .insert(key.to_string(), record);
        })?;
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.with_tables(|tables| {
            if let Some(rows) = tables.get_mut(&table) {
                rows.remove(key);
            }
        })
    }

    fn get_all(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        self.with_tables(|tables| {
            tables
                .get(&table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    fn get_all_by_index(&self, table: Table, index: &str) -> Result<Vec<Value>, StoreError> {
        if !table.has_index(index) {
            return Err(StoreError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            });
        }
        let mut rows = self.get_all(table)?;
        // Records missing the index field sort first, like an absent key.
        rows.sort_by_key(|record| index_key(record, index));
        Ok(rows)
    }
}
