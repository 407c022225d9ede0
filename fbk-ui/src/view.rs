//! Display helpers for record cards

use fbk_common::{Record, RecordId};
use serde::Serialize;

/// Status label shown while a record awaits enrichment
pub const PROCESSING_LABEL: &str = "Processing...";
/// Status label shown once a record is enriched
pub const PROCESSED_LABEL: &str = "Processed";
/// Placeholder for a missing category or priority
pub const MISSING_FIELD: &str = "-";

/// One record as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordCard {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: &'static str,
    pub submitted_at: String,
}

impl From<&Record> for RecordCard {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            category: display_or_dash(record.category.as_deref()),
            priority: display_or_dash(record.priority.as_deref()),
            status: if record.is_pending() {
                PROCESSING_LABEL
            } else {
                PROCESSED_LABEL
            },
            submitted_at: record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl RecordCard {
    /// Single-line rendering for terminal output
    pub fn render_line(&self) -> String {
        format!(
            "{}  [{}]  {}  (category: {}, priority: {})",
            self.submitted_at, self.status, self.title, self.category, self.priority
        )
    }
}

fn display_or_dash(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING_FIELD.to_string(),
    }
}

/// Cards for a whole snapshot, in view order
pub fn cards(records: &[Record]) -> Vec<RecordCard> {
    records.iter().map(RecordCard::from).collect()
}
