use std::collections::HashMap;

use crate::models::raw::{field, RawRecord};
use crate::models::transaction::RowKind;

/// Continuation record carried between chunk-processing calls so a section
/// that starts mid-group (page break) still knows its group. Explicit state,
/// never hidden in the stitcher itself.
#[derive(Debug, Clone, Default)]
pub struct StitchState {
    last_values: HashMap<String, String>,
}

impl StitchState {
    pub fn new() -> StitchState {
        StitchState::default()
    }

    pub fn last_value(&self, field_name: &str) -> Option<&str> {
        self.last_values.get(field_name).map(String::as_str)
    }
}

/// Fills blank grouping fields from the nearest preceding non-blank value.
/// Single forward pass, order-preserving. Subtotal and total marker rows are
/// filled but never used as propagation sources.
pub fn stitch_section(
    records: &mut [RawRecord],
    group_fields: &[&str],
    state: &mut StitchState,
) {
    for record in records.iter_mut() {
        let is_source = RowKind::from_label(field(record, "row_kind")).is_detail();

        for group_field in group_fields {
            let current = field(record, group_field).trim().to_string();
            if current.is_empty() {
                if let Some(last) = state.last_values.get(*group_field) {
                    record.insert((*group_field).to_string(), last.clone());
                }
            } else if is_source {
                state.last_values.insert((*group_field).to_string(), current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, row_kind: &str, number: &str) -> RawRecord {
        let mut row = RawRecord::new();
        row.insert("name".to_string(), name.to_string());
        row.insert("code".to_string(), String::new());
        row.insert("row_kind".to_string(), row_kind.to_string());
        row.insert("number".to_string(), number.to_string());
        row
    }

    #[test]
    fn propagates_name_forward_within_a_section() {
        let mut records = vec![
            record("CEDEAR APPLE INC.", "", "1"),
            record("", "", "2"),
            record("", "", "3"),
        ];
        let mut state = StitchState::new();
        stitch_section(&mut records, &["name", "code"], &mut state);

        assert_eq!(field(&records[1], "name"), "CEDEAR APPLE INC.");
        assert_eq!(field(&records[2], "name"), "CEDEAR APPLE INC.");
    }

    #[test]
    fn subtotal_rows_are_filled_but_not_sources() {
        let mut records = vec![
            record("CEDEAR APPLE INC.", "", "1"),
            record("Total Especie", "Total", ""),
            record("", "", "2"),
        ];
        let mut state = StitchState::new();
        stitch_section(&mut records, &["name"], &mut state);

        // the detail row after the total keeps the detail group, not the
        // total marker text
        assert_eq!(field(&records[2], "name"), "CEDEAR APPLE INC.");
    }

    #[test]
    fn continuation_state_carries_across_chunks() {
        let mut state = StitchState::new();

        let mut first_chunk = vec![record("BONO AL30", "", "1")];
        stitch_section(&mut first_chunk, &["name"], &mut state);

        // next chunk starts with a blank group field
        let mut second_chunk = vec![record("", "", "2")];
        stitch_section(&mut second_chunk, &["name"], &mut state);

        assert_eq!(field(&second_chunk[0], "name"), "BONO AL30");
        assert_eq!(state.last_value("name"), Some("BONO AL30"));
    }

    #[test]
    fn never_reorders_rows() {
        let mut records = vec![
            record("A", "", "1"),
            record("", "", "2"),
            record("B", "", "3"),
        ];
        let mut state = StitchState::new();
        stitch_section(&mut records, &["name"], &mut state);

        let numbers: Vec<_> = records.iter().map(|row| field(row, "number")).collect();
        assert_eq!(numbers, ["1", "2", "3"]);
        assert_eq!(field(&records[2], "name"), "B");
    }
}
