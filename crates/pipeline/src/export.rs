use anyhow::{Context, Result};

use crate::outcome::ResultTable;

pub const EXPORT_FILE_NAME: &str = "ai_agent_results.csv";

pub const EXPORT_HEADERS: [&str; 4] = ["Entity", "Extracted Information", "Status", "Error"];

/// Render the table as CSV, one line per entity in input order.
pub fn export_csv(table: &ResultTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_HEADERS)
        .context("Failed to write CSV header")?;

    for outcome in table.iter() {
        writer
            .write_record([
                outcome.raw_value.as_str(),
                outcome.answer.as_str(),
                outcome.status.as_str(),
                outcome.error_detail.as_deref().unwrap_or(""),
            ])
            .with_context(|| format!("Failed to write row {}", outcome.entity_index))?;
    }

    writer.into_inner().context("Failed to flush CSV output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{EntityOutcome, ErrorKind};
    use ingest::rows_from_values;

    #[test]
    fn test_export_header_and_rows() {
        let rows = rows_from_values(["Acme Corp", "Globex, Inc.", "Initech"]);
        let table = ResultTable::new(vec![
            EntityOutcome::success(&rows[0], "Widgets".to_string()),
            EntityOutcome::empty(&rows[1]),
            EntityOutcome::failed(&rows[2], ErrorKind::Permanent, "invalid key"),
        ]);

        let bytes = export_csv(&table).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Entity,Extracted Information,Status,Error");
        assert_eq!(lines[1], "Acme Corp,Widgets,SUCCESS,");
        assert_eq!(lines[2], "\"Globex, Inc.\",,EMPTY,");
        assert_eq!(lines[3], "Initech,,ERROR,invalid key");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_export_empty_table_has_header_only() {
        let bytes = export_csv(&ResultTable::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Entity,Extracted Information,Status,Error\n");
    }
}
