// Record source collaborator - yields profile snapshots for one run
use crate::constants::MIN_IDENTITY_LEN;
use crate::schema::{ProfileRecord, Schema};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Lazy, finite, non-restartable sequence of profile snapshots.
///
/// A per-record error means "skip, log, continue" for the engine; a setup
/// error belongs in the constructor and aborts the run before the engine
/// starts.
pub trait RecordSource {
    fn next_record(&mut self) -> Result<Option<ProfileRecord>>;
}

/// Capture-file source: one JSON object per line, keys matching schema
/// field names. Unknown keys are ignored, missing fields default to empty.
pub struct JsonlSource {
    reader: BufReader<File>,
    schema: Schema,
    line_no: usize,
}

impl JsonlSource {
    pub fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open capture file: {}", path.display()))?;
        Ok(JsonlSource {
            reader: BufReader::new(file),
            schema,
            line_no: 0,
        })
    }

    fn parse_line(&self, line: &str) -> Result<ProfileRecord> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid JSON object", self.line_no))?;

        let pairs = object.iter().map(|(name, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (name.as_str(), text)
        });
        let record = ProfileRecord::from_pairs(&self.schema, pairs);

        let identity = record.identity(&self.schema).trim();
        if identity.len() < MIN_IDENTITY_LEN || !identity.chars().any(|c| c.is_alphabetic()) {
            anyhow::bail!("line {}: implausible identity {:?}", self.line_no, identity);
        }
        Ok(record)
    }
}

impl RecordSource for JsonlSource {
    fn next_record(&mut self) -> Result<Option<ProfileRecord>> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return self.parse_line(line.trim()).map(Some);
        }
    }
}

/// Fixed in-memory source for tests and seeding
pub struct VecSource {
    records: std::vec::IntoIter<ProfileRecord>,
}

impl VecSource {
    pub fn new(records: Vec<ProfileRecord>) -> Self {
        VecSource {
            records: records.into_iter(),
        }
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Result<Option<ProfileRecord>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_CITY, FIELD_FOLLOWERS, FIELD_NICK};
    use std::io::Write;

    fn write_capture(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_jsonl_source_reads_records() {
        let file = write_capture(&[
            r#"{"NICK NAME": "ali", "CITY": "Lahore", "FOLLOWERS": 42}"#,
            "",
            r#"{"NICK NAME": "sara", "UNKNOWN": "x"}"#,
        ]);
        let schema = Schema::profile_default();
        let mut source = JsonlSource::open(file.path(), schema.clone()).unwrap();

        let first = source.next_record().unwrap().unwrap();
        assert_eq!(first.identity(&schema), "ali");
        assert_eq!(first.get(schema.field_id(FIELD_CITY).unwrap()), "Lahore");
        // non-string scalars are carried as text
        assert_eq!(first.get(schema.field_id(FIELD_FOLLOWERS).unwrap()), "42");

        let second = source.next_record().unwrap().unwrap();
        assert_eq!(second.identity(&schema), "sara");

        assert!(source.next_record().unwrap().is_none());
    }

    #[test]
    fn test_jsonl_source_rejects_implausible_identity() {
        let file = write_capture(&[r#"{"NICK NAME": "12"}"#]);
        let mut source = JsonlSource::open(file.path(), Schema::profile_default()).unwrap();
        assert!(source.next_record().is_err());
    }

    #[test]
    fn test_jsonl_source_missing_file_is_setup_error() {
        let result = JsonlSource::open("/no/such/capture.jsonl", Schema::profile_default());
        assert!(result.is_err());
    }

    #[test]
    fn test_vec_source_drains() {
        let schema = Schema::profile_default();
        let record =
            ProfileRecord::from_pairs(&schema, vec![(FIELD_NICK, "ali".to_string())]);
        let mut source = VecSource::new(vec![record]);
        assert!(source.next_record().unwrap().is_some());
        assert!(source.next_record().unwrap().is_none());
    }
}
