use ingest::EntityRow;
use provider::ErrorClass;
use serde::Serialize;
use std::fmt;

/// Terminal classification of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Success,
    Empty,
    Error,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Empty => "EMPTY",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    /// The run was cancelled before this entity started.
    Cancelled,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Transient => Self::Transient,
            ErrorClass::Permanent => Self::Permanent,
        }
    }
}

pub const CANCELLED_DETAIL: &str = "cancelled before processing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    pub entity_index: usize,
    pub raw_value: String,
    pub answer: String,
    pub status: EntityStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl EntityOutcome {
    pub fn success(row: &EntityRow, answer: String) -> Self {
        Self {
            entity_index: row.index,
            raw_value: row.raw_value.clone(),
            answer,
            status: EntityStatus::Success,
            error_kind: None,
            error_detail: None,
        }
    }

    pub fn empty(row: &EntityRow) -> Self {
        Self {
            entity_index: row.index,
            raw_value: row.raw_value.clone(),
            answer: String::new(),
            status: EntityStatus::Empty,
            error_kind: None,
            error_detail: None,
        }
    }

    pub fn failed(row: &EntityRow, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            entity_index: row.index,
            raw_value: row.raw_value.clone(),
            answer: String::new(),
            status: EntityStatus::Error,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
        }
    }

    pub fn cancelled(row: &EntityRow) -> Self {
        Self::failed(row, ErrorKind::Cancelled, CANCELLED_DETAIL)
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }

    /// The error detail, when this entity failed for a reason retrying cannot fix.
    pub fn permanent_error(&self) -> Option<&str> {
        match self.error_kind {
            Some(ErrorKind::Permanent) => self.error_detail.as_deref(),
            _ => None,
        }
    }
}

/// Outcomes in input order, one per input row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<EntityOutcome>,
}

impl ResultTable {
    pub fn new(rows: Vec<EntityOutcome>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EntityOutcome] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<EntityOutcome> {
        self.rows
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.rows.len(),
            ..Default::default()
        };

        for outcome in &self.rows {
            match outcome.status {
                EntityStatus::Success => summary.success_count += 1,
                EntityStatus::Empty => summary.empty_count += 1,
                EntityStatus::Error => {
                    summary.error_count += 1;
                    if outcome.is_cancelled() {
                        summary.cancelled_count += 1;
                    }
                }
            }
        }

        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub success_count: usize,
    pub empty_count: usize,
    /// Includes cancelled entities.
    pub error_count: usize,
    pub cancelled_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_each_status() {
        let rows = ingest::rows_from_values(["a", "b", "c", "d", "e"]);
        let table = ResultTable::new(vec![
            EntityOutcome::success(&rows[0], "x".to_string()),
            EntityOutcome::empty(&rows[1]),
            EntityOutcome::failed(&rows[2], ErrorKind::Transient, "timeout"),
            EntityOutcome::cancelled(&rows[3]),
            EntityOutcome::success(&rows[4], "y".to_string()),
        ]);

        assert_eq!(
            table.summary(),
            RunSummary {
                total: 5,
                success_count: 2,
                empty_count: 1,
                error_count: 2,
                cancelled_count: 1,
            }
        );
    }

    #[test]
    fn test_cancelled_outcome_is_an_error() {
        let row = EntityRow::new(3, "Initech");
        let outcome = EntityOutcome::cancelled(&row);

        assert_eq!(outcome.status, EntityStatus::Error);
        assert_eq!(outcome.error_detail.as_deref(), Some(CANCELLED_DETAIL));
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.permanent_error(), None);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let row = EntityRow::new(0, "Acme Corp");
        let json = serde_json::to_value(EntityOutcome::empty(&row)).unwrap();

        assert_eq!(json["status"], "EMPTY");
        assert_eq!(json["answer"], "");
        assert!(json["error_detail"].is_null());
    }
}
