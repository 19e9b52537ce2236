//! Scriptable search provider for tests and offline runs.

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use provider::ProviderError;

use crate::{SearchProvider, Snippet};

/// Returns canned snippets per query and records every call.
///
/// Unknown queries return no results.
#[derive(Default)]
pub struct MockSearchProvider {
    results: RwLock<HashMap<String, Vec<Snippet>>>,
    failures: RwLock<HashMap<String, ProviderError>>,
    failure: Option<ProviderError>,
    fixed_delay: Option<Duration>,
    max_random_delay: Option<Duration>,
    calls: RwLock<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippets(self, query: &str, snippets: &[&str]) -> Self {
        self.results.write().unwrap().insert(
            query.to_string(),
            snippets.iter().map(|s| Snippet::new(*s)).collect(),
        );
        self
    }

    pub fn with_results(self, query: &str, snippets: Vec<Snippet>) -> Self {
        self.results
            .write()
            .unwrap()
            .insert(query.to_string(), snippets);
        self
    }

    /// Every call fails with `error`.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Calls for `query` fail with `error`.
    pub fn failing_for(self, query: &str, error: ProviderError) -> Self {
        self.failures
            .write()
            .unwrap()
            .insert(query.to_string(), error);
        self
    }

    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.fixed_delay = Some(delay);
        self
    }

    /// Each call sleeps a random time up to `max`.
    pub fn with_random_delay(mut self, max: Duration) -> Self {
        self.max_random_delay = Some(max);
        self
    }

    /// Queries received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn delay(&self) -> Option<Duration> {
        let random = self.max_random_delay.map(|max| {
            let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            Duration::from_millis(millis)
        });
        match (self.fixed_delay, random) {
            (Some(fixed), Some(random)) => Some(fixed + random),
            (fixed, random) => fixed.or(random),
        }
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &'static str {
        "mock-search"
    }

    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<Snippet>, ProviderError> {
        self.calls.write().unwrap().push(query.to_string());

        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.read().unwrap().get(query) {
            return Err(error.clone());
        }

        let mut results = self
            .results
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        results.truncate(num_results);
        Ok(results)
    }
}
