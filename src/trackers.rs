// Keyed aggregate trackers maintained alongside the profile table
use std::collections::HashMap;

/// Occurrence record for one identity key.
///
/// `first_seen_at` is set once and never changes; `times_seen` and
/// `last_seen_at` move on every subsequent observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenEntry {
    pub key: String,
    pub times_seen: u64,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// Seen-count tracker backing the NickList table.
///
/// Expected to be called exactly once per record processed; rebuilt from
/// the store at the start of each run.
#[derive(Debug, Default)]
pub struct SeenTracker {
    entries: HashMap<String, SeenEntry>,
    dirty: std::collections::HashSet<String>,
}

impl SeenTracker {
    pub fn new() -> Self {
        SeenTracker::default()
    }

    /// Load pre-existing NickList rows: [key, times seen, first, last].
    /// Malformed counts fall back to 1 rather than dropping the entry.
    pub fn load(rows: Vec<Vec<String>>) -> Self {
        let mut tracker = SeenTracker::new();
        for mut row in rows {
            row.resize(4, String::new());
            let key = row[0].trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let times_seen = row[1].trim().parse::<u64>().unwrap_or(1).max(1);
            tracker.entries.insert(
                key.clone(),
                SeenEntry {
                    key,
                    times_seen,
                    first_seen_at: std::mem::take(&mut row[2]),
                    last_seen_at: std::mem::take(&mut row[3]),
                },
            );
        }
        tracker
    }

    pub fn record(&mut self, key: &str, observed_at: &str) {
        self.dirty.insert(key.to_string());
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.times_seen += 1;
                entry.last_seen_at = observed_at.to_string();
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    SeenEntry {
                        key: key.to_string(),
                        times_seen: 1,
                        first_seen_at: observed_at.to_string(),
                        last_seen_at: observed_at.to_string(),
                    },
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SeenEntry> {
        self.entries.get(key)
    }

    /// Entries touched this run, sorted by key for deterministic flushing
    pub fn entries(&self) -> Vec<&SeenEntry> {
        let mut all: Vec<&SeenEntry> = self.entries.values().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Entries observed during this run (the only ones worth flushing;
    /// loaded-but-untouched entries are already persisted)
    pub fn dirty_entries(&self) -> Vec<&SeenEntry> {
        let mut touched: Vec<&SeenEntry> = self
            .dirty
            .iter()
            .filter_map(|key| self.entries.get(key))
            .collect();
        touched.sort_by(|a, b| a.key.cmp(&b.key));
        touched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run metrics registry backing the Dashboard table.
///
/// Flat name -> value map, merge-by-name on publish, last write wins.
/// Insertion order is preserved so the flushed table stays stable.
#[derive(Debug, Default)]
pub struct MetricsTracker {
    entries: Vec<(String, String)>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        MetricsTracker::default()
    }

    pub fn publish<I, K, V>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (name, value) in metrics {
            let name = name.into();
            let value = value.to_string();
            match self.entries.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = value,
                None => self.entries.push((name, value)),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}
