// Identity index - single source of truth for key -> stored position
use crate::schema::{identity_key, ProfileRecord, Schema};
use std::collections::HashMap;

/// Current stored state for one identity key
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub position: usize,
    pub values: ProfileRecord,
}

/// Duplicate identity found in pre-existing store data during the rebuild
/// scan. Not fatal; the engine keeps the last occurrence and reports the
/// rest so the caller can surface data drift.
#[derive(Debug, Clone)]
pub struct DataQualityWarning {
    pub key: String,
    pub kept_position: usize,
    pub duplicate_position: usize,
}

/// Maps a normalized identity key to the stored record's position and
/// values. Rebuilt from a full store scan at the start of every run; owns
/// the mapping exclusively and is consulted before every mutation.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    entries: HashMap<String, IndexedRecord>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        IdentityIndex::default()
    }

    /// Build from the full ordered contents of the profile table.
    ///
    /// Rows with an empty identity are skipped. When the same key appears
    /// more than once the last occurrence wins (pre-existing store drift,
    /// tolerated) and a warning is recorded for each shadowed row.
    pub fn build(schema: &Schema, rows: Vec<Vec<String>>) -> (Self, Vec<DataQualityWarning>) {
        let mut index = IdentityIndex::new();
        let mut warnings = Vec::new();

        for (position, row) in rows.into_iter().enumerate() {
            let record = ProfileRecord::from_row(schema, row);
            let raw_identity = record.identity(schema);
            if raw_identity.trim().is_empty() {
                continue;
            }
            let key = identity_key(raw_identity);
            if let Some(previous) = index.entries.get(&key) {
                warnings.push(DataQualityWarning {
                    key: key.clone(),
                    kept_position: position,
                    duplicate_position: previous.position,
                });
            }
            index.entries.insert(
                key,
                IndexedRecord {
                    position,
                    values: record,
                },
            );
        }

        (index, warnings)
    }

    pub fn lookup(&self, key: &str) -> Option<&IndexedRecord> {
        self.entries.get(key)
    }

    pub fn record(&mut self, key: String, position: usize, values: ProfileRecord) {
        self.entries.insert(key, IndexedRecord { position, values });
    }

    pub fn forget(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn reposition(&mut self, key: &str, new_position: usize) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.position = new_position;
        }
    }

    /// A head insert at `at` pushes every row at or below it down by one
    pub fn shift_for_insert(&mut self, at: usize) {
        for entry in self.entries.values_mut() {
            if entry.position >= at {
                entry.position += 1;
            }
        }
    }

    /// A deletion at `at` pulls every row below it up by one
    pub fn shift_for_delete(&mut self, at: usize) {
        for entry in self.entries.values_mut() {
            if entry.position > at {
                entry.position -= 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FIELD_NICK;

    fn row(schema: &Schema, nick: &str) -> Vec<String> {
        let record = ProfileRecord::from_pairs(schema, vec![(FIELD_NICK, nick.to_string())]);
        record.into_values()
    }

    #[test]
    fn test_build_skips_empty_identity() {
        let schema = Schema::profile_default();
        let rows = vec![row(&schema, "ali"), row(&schema, "   "), row(&schema, "sara")];
        let (index, warnings) = IdentityIndex::build(&schema, rows);
        assert_eq!(index.len(), 2);
        assert!(warnings.is_empty());
        assert_eq!(index.lookup("ali").unwrap().position, 0);
        assert_eq!(index.lookup("sara").unwrap().position, 2);
    }

    #[test]
    fn test_build_last_duplicate_wins_with_warning() {
        let schema = Schema::profile_default();
        let rows = vec![row(&schema, "Ali"), row(&schema, "sara"), row(&schema, "ALI")];
        let (index, warnings) = IdentityIndex::build(&schema, rows);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("ali").unwrap().position, 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "ali");
        assert_eq!(warnings[0].duplicate_position, 0);
        assert_eq!(warnings[0].kept_position, 2);
    }

    #[test]
    fn test_shift_for_insert_and_delete() {
        let schema = Schema::profile_default();
        let rows = vec![row(&schema, "a"), row(&schema, "b"), row(&schema, "c")];
        let (mut index, _) = IdentityIndex::build(&schema, rows);

        index.shift_for_insert(0);
        assert_eq!(index.lookup("a").unwrap().position, 1);
        assert_eq!(index.lookup("c").unwrap().position, 3);

        index.shift_for_delete(1);
        assert_eq!(index.lookup("a").unwrap().position, 1);
        assert_eq!(index.lookup("b").unwrap().position, 1);
        assert_eq!(index.lookup("c").unwrap().position, 2);
    }

    #[test]
    fn test_forget_and_reposition() {
        let schema = Schema::profile_default();
        let (mut index, _) = IdentityIndex::build(&schema, vec![row(&schema, "ali")]);
        index.reposition("ali", 7);
        assert_eq!(index.lookup("ali").unwrap().position, 7);
        index.forget("ali");
        assert!(index.lookup("ali").is_none());
    }
}
