// File-backed tabular store used by the CLI
//
// All tables live in one JSON document saved atomically (temp file +
// rename) after every mutation. Positions and notes follow the same
// semantics as the trait contract; this backend never rate-limits.
use crate::store::{CellNote, ProfileStore, Row, StoreError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: String,
    tables: HashMap<String, Vec<Row>>,
}

pub struct JsonStore {
    path: PathBuf,
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl JsonStore {
    /// Open an existing store file or start an empty one
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file: {}", path.display()))?;
            let file: StoreFile = serde_json::from_str(&data)
                .with_context(|| format!("corrupt store file: {}", path.display()))?;
            file.tables
        } else {
            HashMap::new()
        };
        Ok(JsonStore {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Names of the tables currently present
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Save to disk atomically
    fn save(&self, tables: &HashMap<String, Vec<Row>>) -> StoreResult<()> {
        let file = StoreFile {
            version: crate::constants::VERSION.to_string(),
            tables: tables.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonStore {
    async fn read_all(&self, table: &str) -> StoreResult<Vec<Vec<String>>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|r| r.values.clone()).collect())
            .unwrap_or_default())
    }

    async fn insert_at_head(&self, table: &str, values: Vec<String>) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table.to_string())
            .or_default()
            .insert(0, Row::new(values));
        self.save(&tables)
    }

    async fn update_at(
        &self,
        table: &str,
        position: usize,
        values: Vec<String>,
    ) -> StoreResult<()> {
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
        self.save(&tables)
    }

    async fn delete_at(&self, table: &str, position: usize) -> StoreResult<()> {
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
        self.save(&tables)
    }

    async fn annotate_cell(
        &self,
        table: &str,
        position: usize,
        field: &str,
        note: CellNote,
    ) -> StoreResult<()> {
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
        self.save(&tables)
    }

    async fn append_or_overwrite_by_key(
        &self,
        table: &str,
        key: &str,
        values: Vec<String>,
    ) -> StoreResult<()> {
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
        self.save(&tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonStore::open(&path).unwrap();
        store
            .insert_at_head("T", vec!["ali".into(), "22".into()])
            .await
            .unwrap();
        store
            .annotate_cell(
                "T",
                0,
                "AGE",
                CellNote {
                    field: "AGE".into(),
                    before: "22".into(),
                    after: "23".into(),
                    noted_at: "t0".into(),
                },
            )
            .await
            .unwrap();
        drop(store);

        let reopened = JsonStore::open(&path).unwrap();
        let rows = reopened.read_all("T").await.unwrap();
        assert_eq!(rows, vec![vec!["ali".to_string(), "22".to_string()]]);
        assert_eq!(reopened.row_count("T"), 1);
        assert_eq!(reopened.table_names(), vec!["T".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonStore::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_update_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("s.json")).unwrap();
        let err = store.update_at("nope", 0, vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
    }
}
