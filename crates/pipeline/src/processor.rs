use extract::Extractor;
use ingest::{EntityRow, QueryTemplate};
use search::SearchClient;
use std::fmt;
use tracing::{Instrument, debug, info_span, warn};

use crate::metrics::{Metrics, TimedOperation};
use crate::outcome::{EntityOutcome, ErrorKind};

/// Where an entity is in its lifecycle. Terminal states live on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Pending,
    Templated,
    Searched,
    Extracted,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Templated => "templated",
            Self::Searched => "searched",
            Self::Extracted => "extracted",
        };
        f.write_str(name)
    }
}

/// Drives a single row through template, search and extraction.
#[derive(Clone)]
pub struct EntityProcessor {
    template: QueryTemplate,
    search: SearchClient,
    extractor: Extractor,
}

impl EntityProcessor {
    pub fn new(template: QueryTemplate, search: SearchClient, extractor: Extractor) -> Self {
        Self {
            template,
            search,
            extractor,
        }
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Always yields exactly one outcome; provider failures become ERROR rows.
    pub async fn process(&self, row: &EntityRow, metrics: &Metrics) -> EntityOutcome {
        let span = info_span!("entity", entity_index = row.index);
        let timer = TimedOperation::start();

        let outcome = self.process_inner(row, metrics).instrument(span).await;

        metrics.record_entity(timer.elapsed(), outcome.status);
        outcome
    }

    async fn process_inner(&self, row: &EntityRow, metrics: &Metrics) -> EntityOutcome {
        let mut state = ProcessingState::Pending;
        debug!(%state, raw_value = %row.raw_value, "Processing entity");

        let query = self.template.render(row);
        state = ProcessingState::Templated;
        debug!(%state, query = %query.text, "Rendered query");

        let timer = TimedOperation::start();
        let results = match self.search.search(&query).await {
            Ok(results) => {
                metrics.record_search(timer.elapsed(), true);
                results
            }
            Err(e) => {
                metrics.record_search(timer.elapsed(), false);
                warn!(%state, attempts = e.attempts, error = %e.source, "Search failed");
                return EntityOutcome::failed(row, ErrorKind::from(e.class()), e.to_string());
            }
        };
        state = ProcessingState::Searched;
        debug!(%state, snippets = results.len(), "Search completed");

        if results.is_empty() {
            metrics.record_skipped_extraction();
        }

        let timer = TimedOperation::start();
        let extraction = match self.extractor.extract(&query, &results).await {
            Ok(extraction) => {
                if extraction.model_called {
                    metrics.record_extraction(timer.elapsed(), true);
                }
                extraction
            }
            Err(e) => {
                metrics.record_extraction(timer.elapsed(), false);
                warn!(%state, attempts = e.attempts, error = %e.source, "Extraction failed");
                return EntityOutcome::failed(row, ErrorKind::from(e.class()), e.to_string());
            }
        };
        state = ProcessingState::Extracted;
        debug!(%state, found = extraction.has_answer(), "Extraction completed");

        if extraction.has_answer() {
            EntityOutcome::success(row, extraction.answer)
        } else {
            EntityOutcome::empty(row)
        }
    }
}
