use serde::Serialize;
use thiserror::Error;

use crate::row::EntityRow;

/// Marker replaced with the entity value when a query is rendered.
pub const PLACEHOLDER: &str = "{entity}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("template {template:?} does not contain the {{entity}} placeholder")]
    MissingPlaceholder { template: String },
}

/// A validated prompt template. Holding one means the placeholder is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    text: String,
}

/// The template rendered for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedQuery {
    pub entity_index: usize,
    pub text: String,
}

impl QueryTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();

        if text.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        if !text.contains(PLACEHOLDER) {
            return Err(TemplateError::MissingPlaceholder { template: text });
        }

        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Literal, single-pass substitution of every placeholder occurrence.
    /// Placeholders appearing inside the entity value are left alone.
    pub fn render(&self, entity: &EntityRow) -> RenderedQuery {
        RenderedQuery {
            entity_index: entity.index,
            text: self.text.replace(PLACEHOLDER, &entity.raw_value),
        }
    }
}
