use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::row::EntityRow;

/// Which column of the table holds the entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelector {
    #[default]
    First,
    Named(String),
    Position(usize),
}

impl ColumnSelector {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.trim().is_empty() => Self::Named(name.to_string()),
            _ => Self::First,
        }
    }

    fn resolve(&self, headers: &[String]) -> Result<usize> {
        match self {
            Self::First => Ok(0),
            Self::Position(position) => {
                if *position < headers.len() {
                    Ok(*position)
                } else {
                    anyhow::bail!(
                        "column position {} out of range, table has {} columns",
                        position,
                        headers.len()
                    )
                }
            }
            Self::Named(name) => headers
                .iter()
                .position(|h| h == name)
                .or_else(|| {
                    // Fall back to a forgiving match for hand-edited headers
                    headers
                        .iter()
                        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
                })
                .with_context(|| {
                    format!("column {:?} not found, available: {:?}", name, headers)
                }),
        }
    }
}

/// Rows pulled out of one column of a table.
#[derive(Debug, Clone)]
pub struct LoadedRows {
    pub column: String,
    pub headers: Vec<String>,
    pub rows: Vec<EntityRow>,
    /// Indices of rows whose value is missing or whitespace only.
    pub blank_indices: Vec<usize>,
}

impl LoadedRows {
    pub fn has_blanks(&self) -> bool {
        !self.blank_indices.is_empty()
    }
}

pub struct TableReader;

impl TableReader {
    pub async fn read_file(path: &Path, column: &ColumnSelector) -> Result<LoadedRows> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let delimiter = match extension.as_str() {
            "csv" | "txt" => b',',
            "tsv" => b'\t',
            _ => anyhow::bail!("Unsupported table format: {}", extension),
        };

        let content = fs::read(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        Self::read_delimited(content.as_slice(), delimiter, column)
            .with_context(|| format!("Failed to parse table: {:?}", path))
    }

    pub fn read_csv<R: Read>(data: R, column: &ColumnSelector) -> Result<LoadedRows> {
        Self::read_delimited(data, b',', column)
    }

    pub fn read_delimited<R: Read>(
        data: R,
        delimiter: u8,
        column: &ColumnSelector,
    ) -> Result<LoadedRows> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            anyhow::bail!("Table has no header row");
        }

        let position = column.resolve(&headers)?;
        let column_name = headers[position].clone();

        let mut rows = Vec::new();
        let mut blank_indices = Vec::new();

        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read row {}", index + 1))?;

            // Short rows are treated as a missing value, not an error
            let row = EntityRow::new(index, record.get(position).unwrap_or(""));
            if row.is_blank() {
                blank_indices.push(index);
            }
            rows.push(row);
        }

        if !blank_indices.is_empty() {
            warn!(
                column = %column_name,
                blank_rows = blank_indices.len(),
                "Selected column contains missing values"
            );
        }

        info!(column = %column_name, rows = rows.len(), "Loaded entity rows");

        Ok(LoadedRows {
            column: column_name,
            headers,
            rows,
            blank_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANIES: &str = "Company,Country\nAcme Corp,US\nGlobex,US\n,DE\nInitech\n";

    #[test]
    fn test_reads_named_column() {
        let loaded = TableReader::read_csv(
            COMPANIES.as_bytes(),
            &ColumnSelector::Named("Country".to_string()),
        )
        .unwrap();

        assert_eq!(loaded.column, "Country");
        let values: Vec<_> = loaded.rows.iter().map(|r| r.raw_value.as_str()).collect();
        assert_eq!(values, vec!["US", "US", "DE", ""]);
        assert_eq!(loaded.blank_indices, vec![3]);
    }

    #[test]
    fn test_defaults_to_first_column() {
        let loaded = TableReader::read_csv(COMPANIES.as_bytes(), &ColumnSelector::First).unwrap();

        assert_eq!(loaded.column, "Company");
        assert_eq!(loaded.rows.len(), 4);
        assert_eq!(loaded.rows[1], EntityRow::new(1, "Globex"));
        assert_eq!(loaded.blank_indices, vec![2]);
        assert!(loaded.has_blanks());
    }

    #[test]
    fn test_column_lookup_is_forgiving() {
        let loaded = TableReader::read_csv(
            COMPANIES.as_bytes(),
            &ColumnSelector::Named(" company ".to_string()),
        )
        .unwrap();

        assert_eq!(loaded.column, "Company");
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let err = TableReader::read_csv(
            COMPANIES.as_bytes(),
            &ColumnSelector::Named("Revenue".to_string()),
        )
        .unwrap_err();

        assert!(err.to_string().contains("Revenue"));
    }

    #[test]
    fn test_position_out_of_range() {
        assert!(TableReader::read_csv(COMPANIES.as_bytes(), &ColumnSelector::Position(5)).is_err());
    }

    #[test]
    fn test_header_only_table_has_no_rows() {
        let loaded = TableReader::read_csv("Company\n".as_bytes(), &ColumnSelector::First).unwrap();
        assert!(loaded.rows.is_empty());
    }

    #[test]
    fn test_tab_delimited() {
        let loaded = TableReader::read_delimited(
            "Name\tSector\nUmbrella\tPharma\n".as_bytes(),
            b'\t',
            &ColumnSelector::Position(1),
        )
        .unwrap();

        assert_eq!(loaded.rows[0].raw_value, "Pharma");
    }
}
