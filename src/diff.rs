// Field-level diff between an incoming record and its stored counterpart
use crate::constants::EMPTY_PLACEHOLDERS;
use crate::schema::{clean_value, FieldId, ProfileRecord, Schema};

/// Normalize a value for comparison: trim, collapse internal whitespace,
/// and map the "no value" placeholder vocabulary to the empty string.
///
/// Upstream scrapers emit different literal missing-markers depending on
/// site state ("Not set" one run, "N/A" the next); naive comparison would
/// manufacture a spurious diff on every run. Apart from the placeholder
/// match the comparison stays case-sensitive.
pub fn normalize_for_diff(raw: &str) -> String {
    let cleaned = clean_value(raw);
    let folded = cleaned.to_lowercase();
    if EMPTY_PLACEHOLDERS.iter().any(|p| *p == folded) {
        return String::new();
    }
    cleaned
}

/// Compute the set of substantively changed fields between two records.
///
/// Iterates the schema in fixed order and skips `DiffExcludedFields`
/// (volatile timestamps and activity fields that vary every run). The
/// returned ordering is the schema ordering, which keeps downstream cell
/// annotation deterministic.
pub fn diff(schema: &Schema, before: &ProfileRecord, after: &ProfileRecord) -> Vec<FieldId> {
    let mut changed = Vec::new();
    for id in 0..schema.len() {
        if schema.is_diff_excluded(id) {
            continue;
        }
        if normalize_for_diff(before.get(id)) != normalize_for_diff(after.get(id)) {
            changed.push(id);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_AGE, FIELD_CAPTURED_AT, FIELD_CITY, FIELD_LAST_POST_TIME};

    fn record_with(schema: &Schema, pairs: &[(&str, &str)]) -> ProfileRecord {
        ProfileRecord::from_pairs(
            schema,
            pairs.iter().map(|(name, value)| (*name, value.to_string())),
        )
    }

    #[test]
    fn test_placeholder_equivalence() {
        let schema = Schema::profile_default();
        let a = record_with(&schema, &[(FIELD_CITY, "N/A")]);
        let b = record_with(&schema, &[(FIELD_CITY, "")]);
        assert!(diff(&schema, &a, &b).is_empty());

        let c = record_with(&schema, &[(FIELD_CITY, "Lahore")]);
        let changed = diff(&schema, &a, &c);
        assert_eq!(changed, vec![schema.field_id(FIELD_CITY).unwrap()]);
    }

    #[test]
    fn test_placeholders_any_case() {
        for marker in ["Not Set", "NONE", "null", "None", "n/a", "-"] {
            assert_eq!(normalize_for_diff(marker), "", "marker: {}", marker);
        }
    }

    #[test]
    fn test_whitespace_insensitive() {
        let schema = Schema::profile_default();
        let a = record_with(&schema, &[(FIELD_CITY, " Lahore  City ")]);
        let b = record_with(&schema, &[(FIELD_CITY, "Lahore City")]);
        assert!(diff(&schema, &a, &b).is_empty());
    }

    #[test]
    fn test_excluded_fields_never_diff() {
        let schema = Schema::profile_default();
        let a = record_with(
            &schema,
            &[
                (FIELD_CAPTURED_AT, "07-Mar-25 04:12 PM"),
                (FIELD_LAST_POST_TIME, "3 minutes ago"),
            ],
        );
        let b = record_with(
            &schema,
            &[
                (FIELD_CAPTURED_AT, "08-Mar-25 09:01 AM"),
                (FIELD_LAST_POST_TIME, "just now"),
            ],
        );
        assert!(diff(&schema, &a, &b).is_empty());
    }

    #[test]
    fn test_changed_fields_in_schema_order() {
        let schema = Schema::profile_default();
        let a = record_with(&schema, &[(FIELD_CITY, "Lahore"), (FIELD_AGE, "22")]);
        let b = record_with(&schema, &[(FIELD_CITY, "Karachi"), (FIELD_AGE, "23")]);
        let changed = diff(&schema, &a, &b);
        let city = schema.field_id(FIELD_CITY).unwrap();
        let age = schema.field_id(FIELD_AGE).unwrap();
        assert_eq!(changed, vec![city, age]);
    }

    #[test]
    fn test_case_still_significant_for_real_values() {
        let schema = Schema::profile_default();
        let a = record_with(&schema, &[(FIELD_CITY, "Lahore")]);
        let b = record_with(&schema, &[(FIELD_CITY, "lahore")]);
        assert_eq!(diff(&schema, &a, &b).len(), 1);
    }
}
