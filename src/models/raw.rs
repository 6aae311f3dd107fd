use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A flat record as delivered by the extraction collaborator: every value is
/// a text token, absent cells arrive as the empty string.
pub type RawRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ledger,
    BrokerSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSection {
    pub label: String,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub source: SourceKind,
    pub sections: Vec<RawSection>,
}

pub fn field<'a>(record: &'a RawRecord, name: &str) -> &'a str {
    record.get(name).map(String::as_str).unwrap_or("")
}
