use std::collections::HashSet;

use crate::models::raw::{field, RawRecord};

fn hash_string(input_string: &str) -> String {
    blake3::hash(input_string.as_bytes()).to_string()
}

/// Drops records whose composite business key was already seen, keeping the
/// first occurrence. Overlapping extraction passes re-emit rows near chunk
/// boundaries; the key fields are declared per section family.
pub fn deduplicate_records(records: Vec<RawRecord>, key_fields: &[&str]) -> Vec<RawRecord> {
    if key_fields.is_empty() {
        return records;
    }

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(records.len());

    for record in records {
        let composite = key_fields
            .iter()
            .map(|key| field(&record, key).trim())
            .collect::<Vec<_>>()
            .join("|");
        if seen.insert(hash_string(&composite)) {
            result.push(record);
        }
    }

    result
}

/// Rows where every field is blank carry no information; extraction
/// sometimes emits them around page boundaries.
pub fn remove_empty_records(records: Vec<RawRecord>) -> Vec<RawRecord> {
    records
        .into_iter()
        .filter(|record| record.values().any(|value| !value.trim().is_empty()))
        .collect()
}
