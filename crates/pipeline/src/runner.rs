use extract::{CompletionProvider, Extractor};
use futures::stream::{self, StreamExt};
use ingest::EntityRow;
use provider::ProviderLimiter;
use search::{SearchClient, SearchProvider};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, PipelineConfig};
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};
use crate::outcome::{EntityOutcome, ResultTable, RunSummary};
use crate::processor::EntityProcessor;
use crate::progress::{ProgressEvent, ProgressSink};

/// The two external providers and the limiters guarding them.
///
/// Limiters are shared: hand the same `Arc` to every runner that talks to the
/// same provider account.
#[derive(Clone)]
pub struct Providers {
    pub search: Arc<dyn SearchProvider>,
    pub search_limiter: Arc<ProviderLimiter>,
    pub completion: Arc<dyn CompletionProvider>,
    pub completion_limiter: Arc<ProviderLimiter>,
}

impl Providers {
    /// Providers with unthrottled limiters of their own.
    pub fn new(search: Arc<dyn SearchProvider>, completion: Arc<dyn CompletionProvider>) -> Self {
        let search_limiter = Arc::new(ProviderLimiter::unlimited(search.name()));
        let completion_limiter = Arc::new(ProviderLimiter::unlimited(completion.name()));
        Self {
            search,
            search_limiter,
            completion,
            completion_limiter,
        }
    }

    pub fn with_limiters(
        mut self,
        search_limiter: Arc<ProviderLimiter>,
        completion_limiter: Arc<ProviderLimiter>,
    ) -> Self {
        self.search_limiter = search_limiter;
        self.completion_limiter = completion_limiter;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub table: ResultTable,
    pub summary: RunSummary,
    pub warnings: Vec<String>,
    pub metrics: MetricsSnapshot,
}

pub struct PipelineRunner {
    processor: EntityProcessor,
    search_limiter: Arc<ProviderLimiter>,
    completion_limiter: Arc<ProviderLimiter>,
    concurrency: usize,
    misconfiguration_window: usize,
}

impl PipelineRunner {
    /// Validates the whole configuration; nothing is called on failure.
    pub fn new(config: &PipelineConfig, providers: Providers) -> Result<Self, ConfigError> {
        let template = config.validate()?;
        let retry = config.retry_policy();

        let search = SearchClient::new(
            providers.search,
            providers.search_limiter.clone(),
            retry.clone(),
            config.max_results,
            config.timeout(),
        );
        let extractor = Extractor::new(
            providers.completion,
            providers.completion_limiter.clone(),
            retry,
            config.sampling(),
            config.timeout(),
        );

        Ok(Self {
            processor: EntityProcessor::new(template, search, extractor),
            search_limiter: providers.search_limiter,
            completion_limiter: providers.completion_limiter,
            concurrency: config.concurrency,
            misconfiguration_window: config.misconfiguration_window,
        })
    }

    /// Process every row, at most `concurrency` at a time, and return one
    /// outcome per row in input order.
    ///
    /// Rows that have not started when `cancel` fires are marked cancelled.
    pub async fn run(
        &self,
        rows: Vec<EntityRow>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let total = rows.len();
        let metrics = Metrics::new();
        let timer = TimedOperation::start();

        info!(
            %run_id,
            total,
            concurrency = self.concurrency,
            template = self.processor.template().as_str(),
            "Starting run"
        );

        let processor = &self.processor;
        let metrics_ref: &Metrics = &metrics;

        let mut slots: Vec<Option<EntityOutcome>> = vec![None; total];
        let mut completed = 0;

        let rows_ref: &[EntityRow] = &rows;

        let mut outcomes = stream::iter(0..total)
            .map(move |position| async move {
                let row = &rows_ref[position];
                let outcome = if cancel.is_cancelled() {
                    EntityOutcome::cancelled(row)
                } else {
                    processor.process(row, metrics_ref).await
                };
                (position, outcome)
            })
            .buffer_unordered(self.concurrency);

        while let Some((position, outcome)) = outcomes.next().await {
            completed += 1;
            progress.on_progress(&ProgressEvent {
                entity_index: outcome.entity_index,
                completed,
                total,
                status: outcome.status,
            });
            slots[position] = Some(outcome);
        }

        let table = ResultTable::new(slots.into_iter().flatten().collect());
        let summary = table.summary();

        let mut warnings = Vec::new();
        if let Some(warning) = misconfiguration_warning(&table, self.misconfiguration_window) {
            warn!(%run_id, "{}", warning);
            warnings.push(warning);
        }
        if summary.cancelled_count > 0 {
            warn!(%run_id, cancelled = summary.cancelled_count, "Run cancelled before all entities started");
        }

        let search_stats = self.search_limiter.stats().await;
        let completion_stats = self.completion_limiter.stats().await;

        info!(
            %run_id,
            total = summary.total,
            success = summary.success_count,
            empty = summary.empty_count,
            errors = summary.error_count,
            cancelled = summary.cancelled_count,
            search_throttled = search_stats.throttled,
            completion_throttled = completion_stats.throttled,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Run finished"
        );

        RunReport {
            run_id,
            table,
            summary,
            warnings,
            metrics: metrics.snapshot(),
        }
    }
}

/// Flags a run whose leading rows all hit the same permanent error, which
/// almost always means a bad key or an exhausted quota rather than bad data.
fn misconfiguration_warning(table: &ResultTable, window: usize) -> Option<String> {
    let inspected = window.min(table.len());
    if inspected < 2 {
        return None;
    }

    let leading = &table.rows()[..inspected];
    let detail = leading[0].permanent_error()?;

    if leading.iter().all(|outcome| outcome.permanent_error() == Some(detail)) {
        Some(format!(
            "the first {inspected} entities failed with the same permanent error, check credentials and quota: {detail}"
        ))
    } else {
        None
    }
}
