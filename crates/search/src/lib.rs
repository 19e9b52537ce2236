pub mod serpapi;
pub mod testing;

pub use serpapi::SerpApiProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest::RenderedQuery;
use provider::{ErrorClass, ProviderError, ProviderLimiter, RetryError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub title: Option<String>,
    pub link: Option<String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: None,
            link: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Snippets found for one entity, in provider relevance order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultSet {
    pub entity_index: usize,
    pub snippets: Vec<Snippet>,
    pub fetched_at: DateTime<Utc>,
}

impl SearchResultSet {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("search failed after {attempts} attempt(s): {source}")]
pub struct SearchError {
    pub attempts: usize,
    #[source]
    pub source: ProviderError,
}

impl SearchError {
    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}

impl From<RetryError> for SearchError {
    fn from(err: RetryError) -> Self {
        Self {
            attempts: err.attempts,
            source: err.source,
        }
    }
}

/// A single raw call to a web search provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ordered results for `query`, at most `num_results` requested.
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<Snippet>, ProviderError>;
}

/// Search adapter: bounded result sets with per-call timeout, shared rate
/// limiting and retries around a [`SearchProvider`].
#[derive(Clone)]
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    limiter: Arc<ProviderLimiter>,
    retry: RetryPolicy,
    max_results: usize,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        limiter: Arc<ProviderLimiter>,
        retry: RetryPolicy,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            limiter,
            retry,
            max_results,
            timeout,
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search(&self, query: &RenderedQuery) -> Result<SearchResultSet, SearchError> {
        let hits = self
            .retry
            .retry("search", || {
                self.limiter
                    .call(self.timeout, self.provider.search(&query.text, self.max_results))
            })
            .await?;

        let received = hits.len();
        let snippets: Vec<Snippet> = hits
            .into_iter()
            .filter(|hit| !hit.text.trim().is_empty())
            .take(self.max_results)
            .collect();

        debug!(
            entity_index = query.entity_index,
            provider = self.provider.name(),
            received,
            kept = snippets.len(),
            "Search completed"
        );

        Ok(SearchResultSet {
            entity_index: query.entity_index,
            snippets,
            fetched_at: Utc::now(),
        })
    }
}
