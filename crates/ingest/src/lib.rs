pub mod reader;
pub mod row;
pub mod sheets;
pub mod template;

pub use reader::{ColumnSelector, LoadedRows, TableReader};
pub use row::{EntityRow, rows_from_values};
pub use sheets::SheetReader;
pub use template::{PLACEHOLDER, QueryTemplate, RenderedQuery, TemplateError};

use anyhow::Result;
use std::path::Path;

/// Where the entity table comes from.
#[derive(Debug, Clone)]
pub enum TableSource {
    File(std::path::PathBuf),
    Csv(String),
    Sheet(String),
}

/// Load the ordered entity rows from a table source.
pub async fn load_rows(source: &TableSource, column: &ColumnSelector) -> Result<LoadedRows> {
    match source {
        TableSource::File(path) => load_file(path, column).await,
        TableSource::Csv(text) => TableReader::read_csv(text.as_bytes(), column),
        TableSource::Sheet(url) => SheetReader::default().read_sheet(url, column).await,
    }
}

pub async fn load_file(path: &Path, column: &ColumnSelector) -> Result<LoadedRows> {
    TableReader::read_file(path, column).await
}
