use serde::{Deserialize, Serialize};

/// One entity read from the input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRow {
    pub index: usize, // 0-based position in the source, stable for the whole run
    pub raw_value: String,
}

impl EntityRow {
    pub fn new(index: usize, raw_value: impl Into<String>) -> Self {
        Self {
            index,
            raw_value: raw_value.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.raw_value.trim().is_empty()
    }
}

/// Build rows from plain values, numbering them in order.
pub fn rows_from_values<I, S>(values: I) -> Vec<EntityRow>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| EntityRow::new(index, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_numbered_in_order() {
        let rows = rows_from_values(["Acme Corp", "Globex", "Acme Corp"]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], EntityRow::new(0, "Acme Corp"));
        assert_eq!(rows[2].index, 2);
        assert_eq!(rows[2].raw_value, "Acme Corp");
    }

    #[test]
    fn test_blank_detection() {
        assert!(EntityRow::new(0, "   ").is_blank());
        assert!(!EntityRow::new(0, " x ").is_blank());
    }
}
