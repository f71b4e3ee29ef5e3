// Schema and record model for profile snapshots
use crate::constants;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordinal of a field within a [`Schema`]
pub type FieldId = usize;

/// Explicit ordered field layout for profile tables.
///
/// The schema is constructed once and passed into the engine; there is no
/// module-level layout state. Field positions are stable for the lifetime
/// of a run and double as store column ordinals.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<String>,
    by_name: HashMap<String, FieldId>,
    identity: FieldId,
    captured_at: Option<FieldId>,
    link_fields: HashSet<FieldId>,
    diff_excluded: HashSet<FieldId>,
}

impl Schema {
    pub fn new(
        fields: Vec<String>,
        identity_field: &str,
        link_fields: &[&str],
        diff_excluded: &[&str],
        captured_at_field: Option<&str>,
    ) -> Result<Self> {
        let by_name: HashMap<String, FieldId> = fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        if by_name.len() != fields.len() {
            anyhow::bail!("schema contains duplicate field names");
        }

        let resolve = |name: &str| -> Result<FieldId> {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown schema field: {}", name))
        };

        let identity = resolve(identity_field)?;
        let captured_at = match captured_at_field {
            Some(name) => Some(resolve(name)?),
            None => None,
        };
        let link_fields = link_fields
            .iter()
            .map(|n| resolve(n))
            .collect::<Result<HashSet<_>>>()?;
        let diff_excluded = diff_excluded
            .iter()
            .map(|n| resolve(n))
            .collect::<Result<HashSet<_>>>()?;

        Ok(Schema {
            fields,
            by_name,
            identity,
            captured_at,
            link_fields,
            diff_excluded,
        })
    }

    /// The default profile layout used by the scraper tables
    pub fn profile_default() -> Self {
        use constants::*;
        let fields = [
            FIELD_IMAGE,
            FIELD_NICK,
            FIELD_TAGS,
            FIELD_LAST_POST,
            FIELD_LAST_POST_TIME,
            FIELD_FRIEND,
            FIELD_CITY,
            FIELD_GENDER,
            FIELD_MARRIED,
            FIELD_AGE,
            FIELD_JOINED,
            FIELD_FOLLOWERS,
            FIELD_STATUS,
            FIELD_POSTS,
            FIELD_PROFILE_LINK,
            FIELD_INTRO,
            FIELD_SOURCE,
            FIELD_CAPTURED_AT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Schema::new(
            fields,
            FIELD_NICK,
            &[FIELD_IMAGE, FIELD_LAST_POST, FIELD_PROFILE_LINK],
            &[FIELD_LAST_POST, FIELD_LAST_POST_TIME, FIELD_CAPTURED_AT],
            Some(FIELD_CAPTURED_AT),
        )
        .expect("default profile schema is well-formed")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_name(&self, id: FieldId) -> &str {
        &self.fields[id]
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    pub fn identity_id(&self) -> FieldId {
        self.identity
    }

    pub fn captured_at_id(&self) -> Option<FieldId> {
        self.captured_at
    }

    pub fn is_link(&self, id: FieldId) -> bool {
        self.link_fields.contains(&id)
    }

    pub fn is_diff_excluded(&self, id: FieldId) -> bool {
        self.diff_excluded.contains(&id)
    }
}

/// One profile snapshot, values aligned to the schema's field ordinals.
///
/// All fields default to the empty string; only the identity field is
/// required to be non-empty before an upsert will accept the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    values: Vec<String>,
}

impl ProfileRecord {
    pub fn new(schema: &Schema) -> Self {
        ProfileRecord {
            values: vec![String::new(); schema.len()],
        }
    }

    /// Build a record from (field name, value) pairs; unknown names are
    /// ignored so sources can carry extra columns without breaking callers.
    pub fn from_pairs<'a, I>(schema: &Schema, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut record = ProfileRecord::new(schema);
        for (name, value) in pairs {
            if let Some(id) = schema.field_id(name) {
                record.values[id] = value;
            }
        }
        record
    }

    /// Build a record from a raw store row, padding or truncating to the
    /// schema width (pre-existing rows may be ragged).
    pub fn from_row(schema: &Schema, mut row: Vec<String>) -> Self {
        row.resize(schema.len(), String::new());
        ProfileRecord { values: row }
    }

    pub fn get(&self, id: FieldId) -> &str {
        &self.values[id]
    }

    pub fn set(&mut self, id: FieldId, value: impl Into<String>) {
        self.values[id] = value.into();
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    /// The record's raw identity value
    pub fn identity<'a>(&'a self, schema: &Schema) -> &'a str {
        &self.values[schema.identity_id()]
    }
}

/// Normalized identity key: trimmed, case-folded
pub fn identity_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Cosmetic cleanup for plain-text field values: trim and collapse
/// internal whitespace runs to a single space.
pub fn clean_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Normalize an incoming record in place: clean plain-text fields, pass
/// link fields through untouched, and stamp the capture-timestamp field.
pub fn normalize_record(schema: &Schema, record: &mut ProfileRecord, captured_at: &str) {
    for id in 0..schema.len() {
        if schema.is_link(id) {
            continue;
        }
        let cleaned = clean_value(record.get(id));
        record.set(id, cleaned);
    }
    if let Some(id) = schema.captured_at_id() {
        record.set(id, captured_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_CAPTURED_AT, FIELD_CITY, FIELD_IMAGE, FIELD_NICK};

    #[test]
    fn test_default_schema_layout() {
        let schema = Schema::profile_default();
        assert_eq!(schema.len(), 18);
        assert_eq!(schema.field_id(FIELD_NICK), Some(1));
        assert_eq!(schema.identity_id(), 1);
        assert!(schema.is_link(schema.field_id(FIELD_IMAGE).unwrap()));
        assert!(schema.is_diff_excluded(schema.field_id(FIELD_CAPTURED_AT).unwrap()));
        assert!(!schema.is_diff_excluded(schema.field_id(FIELD_CITY).unwrap()));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let fields = vec!["A".to_string(), "A".to_string()];
        assert!(Schema::new(fields, "A", &[], &[], None).is_err());
    }

    #[test]
    fn test_identity_key_normalization() {
        assert_eq!(identity_key("  Ali  "), "ali");
        assert_eq!(identity_key("SARA"), "sara");
    }

    #[test]
    fn test_clean_value_collapses_whitespace() {
        assert_eq!(clean_value("  a\t b\n\nc "), "a b c");
        assert_eq!(clean_value(""), "");
    }

    #[test]
    fn test_from_pairs_ignores_unknown_fields() {
        let schema = Schema::profile_default();
        let record = ProfileRecord::from_pairs(
            &schema,
            vec![
                (FIELD_NICK, "ali".to_string()),
                ("NO SUCH COLUMN", "x".to_string()),
            ],
        );
        assert_eq!(record.identity(&schema), "ali");
    }

    #[test]
    fn test_from_row_pads_ragged_rows() {
        let schema = Schema::profile_default();
        let record = ProfileRecord::from_row(&schema, vec!["img".to_string(), "ali".to_string()]);
        assert_eq!(record.values().len(), schema.len());
        assert_eq!(record.identity(&schema), "ali");
    }

    #[test]
    fn test_normalize_record_stamps_capture_time() {
        let schema = Schema::profile_default();
        let mut record = ProfileRecord::new(&schema);
        record.set(schema.identity_id(), "  ali   khan ");
        let image_id = schema.field_id(FIELD_IMAGE).unwrap();
        record.set(image_id, "  https://x/y.png ");

        normalize_record(&schema, &mut record, "07-Mar-25 04:12 PM");

        assert_eq!(record.identity(&schema), "ali khan");
        // link fields are raw passthrough
        assert_eq!(record.get(image_id), "  https://x/y.png ");
        let cap = schema.captured_at_id().unwrap();
        assert_eq!(record.get(cap), "07-Mar-25 04:12 PM");
    }
}
