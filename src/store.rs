// Persistent tabular store collaborator interface
//
// The engine never talks to a concrete backend directly; everything goes
// through [`ProfileStore`]. Positions are zero-based with position 0 as the
// head of the table's visible ordering. Head inserts shift every existing
// row down by one, deletions shift the rows below up by one.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient quota error; the caller backs off and moves on
    #[error("store quota exceeded")]
    QuotaExceeded,

    /// Credentials rejected; fatal for the run
    #[error("store access unauthorized")]
    Unauthorized,

    /// Missing table; fatal for the run
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("row {position} out of range for table {table}")]
    PositionOutOfRange { table: String, position: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Recoverable errors skip the record; everything else aborts the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded)
    }
}

/// Structured change note attached to a single cell.
///
/// Notes record prior and new values instead of mutating history; a store
/// without per-cell metadata can persist the same tuple to a side-channel
/// change-log table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellNote {
    pub field: String,
    pub before: String,
    pub after: String,
    pub noted_at: String,
}

impl CellNote {
    /// Human-readable note body, e.g. "Before: 22\nAfter: 23"
    pub fn text(&self) -> String {
        format!("Before: {}\nAfter: {}", self.before, self.after)
    }
}

/// One stored row: column values plus per-cell notes keyed by field name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, Vec<CellNote>>,
}

impl Row {
    pub fn new(values: Vec<String>) -> Self {
        Row {
            values,
            notes: HashMap::new(),
        }
    }
}

/// Remote tabular store collaborator.
///
/// Every call may fail with [`StoreError::QuotaExceeded`] (recoverable,
/// feeds the rate controller) or a fatal access error. Implementations do
/// not retry internally; pacing and retry policy belong to the engine.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Full ordered contents of a table, head first
    async fn read_all(&self, table: &str) -> StoreResult<Vec<Vec<String>>>;

    /// Insert a row at position 0, shifting all existing rows down
    async fn insert_at_head(&self, table: &str, values: Vec<String>) -> StoreResult<()>;

    /// Overwrite the values at an existing position
    async fn update_at(&self, table: &str, position: usize, values: Vec<String>)
        -> StoreResult<()>;

    /// Remove the row at a position, shifting the rows below up
    async fn delete_at(&self, table: &str, position: usize) -> StoreResult<()>;

    /// Attach a change note to one cell without touching other cells
    async fn annotate_cell(
        &self,
        table: &str,
        position: usize,
        field: &str,
        note: CellNote,
    ) -> StoreResult<()>;

    /// Upsert keyed by the first column (case-insensitive): overwrite the
    /// matching row or append a new one at the tail
    async fn append_or_overwrite_by_key(
        &self,
        table: &str,
        key: &str,
        values: Vec<String>,
    ) -> StoreResult<()>;
}

// ============================================================================
// MemoryStore - in-process reference backend
// ============================================================================

/// In-memory [`ProfileStore`] used by tests and as the reference semantics
/// for position handling. Tables are created on first touch.
///
/// Test hooks: individual mutating calls can be made to fail with
/// [`StoreError::QuotaExceeded`] by call ordinal, to exercise mid-upsert
/// quota recovery.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    mutation_calls: Mutex<u64>,
    quota_failures: Mutex<Vec<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Arrange for the n-th mutating call (1-based) to fail with
    /// `QuotaExceeded`. May be called multiple times for multiple ordinals.
    pub fn fail_mutation(&self, ordinal: u64) {
        self.quota_failures.lock().unwrap().push(ordinal);
    }

    /// Number of mutating calls observed so far
    pub fn mutation_count(&self) -> u64 {
        *self.mutation_calls.lock().unwrap()
    }

    /// Snapshot of a table's rows (notes included)
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Notes attached to one cell
    pub fn cell_notes(&self, table: &str, position: usize, field: &str) -> Vec<CellNote> {
        self.rows(table)
            .get(position)
            .and_then(|row| row.notes.get(field).cloned())
            .unwrap_or_default()
    }

    /// Seed a table with rows, bypassing call counting (test setup)
    pub fn seed(&self, table: &str, rows: Vec<Vec<String>>) {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        entry.extend(rows.into_iter().map(Row::new));
    }

    fn check_quota(&self) -> StoreResult<()> {
        let mut calls = self.mutation_calls.lock().unwrap();
        *calls += 1;
        if self.quota_failures.lock().unwrap().contains(&calls) {
            return Err(StoreError::QuotaExceeded);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn read_all(&self, table: &str) -> StoreResult<Vec<Vec<String>>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|r| r.values.clone()).collect())
            .unwrap_or_default())
    }

    async fn insert_at_head(&self, table: &str, values: Vec<String>) -> StoreResult<()> {
        self.check_quota()?;
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table.to_string())
            .or_default()
            .insert(0, Row::new(values));
        Ok(())
    }

    async fn update_at(
        &self,
        table: &str,
        position: usize,
        values: Vec<String>,
    ) -> StoreResult<()> {
        self.check_quota()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let row = rows
            .get_mut(position)
            .ok_or_else(|| StoreError::PositionOutOfRange {
                table: table.to_string(),
                position,
            })?;
        row.values = values;
        Ok(())
    }

    async fn delete_at(&self, table: &str, position: usize) -> StoreResult<()> {
        self.check_quota()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if position >= rows.len() {
            return Err(StoreError::PositionOutOfRange {
                table: table.to_string(),
                position,
            });
        }
        rows.remove(position);
        Ok(())
    }

    async fn annotate_cell(
        &self,
        table: &str,
        position: usize,
        field: &str,
        note: CellNote,
    ) -> StoreResult<()> {
        self.check_quota()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let row = rows
            .get_mut(position)
            .ok_or_else(|| StoreError::PositionOutOfRange {
                table: table.to_string(),
                position,
            })?;
        row.notes.entry(field.to_string()).or_default().push(note);
        Ok(())
    }

    async fn append_or_overwrite_by_key(
        &self,
        table: &str,
        key: &str,
        values: Vec<String>,
    ) -> StoreResult<()> {
        self.check_quota()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let existing = rows.iter_mut().find(|row| {
            row.values
                .first()
                .map(|v| v.trim().to_lowercase() == key.trim().to_lowercase())
                .unwrap_or(false)
        });
        match existing {
            Some(row) => row.values = values,
            None => rows.push(Row::new(values)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_at_head_shifts_rows() {
        let store = MemoryStore::new();
        store.insert_at_head("T", vec!["a".into()]).await.unwrap();
        store.insert_at_head("T", vec!["b".into()]).await.unwrap();
        let rows = store.read_all("T").await.unwrap();
        assert_eq!(rows, vec![vec!["b".to_string()], vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn test_delete_out_of_range() {
        let store = MemoryStore::new();
        store.insert_at_head("T", vec!["a".into()]).await.unwrap();
        let err = store.delete_at("T", 5).await.unwrap_err();
        assert!(matches!(err, StoreError::PositionOutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_append_or_overwrite_by_key() {
        let store = MemoryStore::new();
        store
            .append_or_overwrite_by_key("D", "Runs", vec!["Runs".into(), "1".into()])
            .await
            .unwrap();
        store
            .append_or_overwrite_by_key("D", "runs", vec!["Runs".into(), "2".into()])
            .await
            .unwrap();
        let rows = store.read_all("D").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "2");
    }

    #[tokio::test]
    async fn test_quota_injection_by_ordinal() {
        let store = MemoryStore::new();
        store.fail_mutation(2);
        store.insert_at_head("T", vec!["a".into()]).await.unwrap();
        let err = store.insert_at_head("T", vec!["b".into()]).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded));
        assert!(err.is_recoverable());
        // Subsequent calls succeed again, and the failed call still counted
        store.insert_at_head("T", vec!["c".into()]).await.unwrap();
        assert_eq!(store.mutation_count(), 3);
    }

    #[tokio::test]
    async fn test_notes_attach_to_single_cell() {
        let store = MemoryStore::new();
        store
            .insert_at_head("T", vec!["ali".into(), "22".into()])
            .await
            .unwrap();
        let note = CellNote {
            field: "AGE".into(),
            before: "22".into(),
            after: "23".into(),
            noted_at: "07-Mar-25 04:12 PM".into(),
        };
        store.annotate_cell("T", 0, "AGE", note.clone()).await.unwrap();
        assert_eq!(store.cell_notes("T", 0, "AGE"), vec![note.clone()]);
        assert!(store.cell_notes("T", 0, "CITY").is_empty());
        assert_eq!(note.text(), "Before: 22\nAfter: 23");
    }
}
