//! Scriptable completion provider for tests and offline runs.

use async_trait::async_trait;
use rand::Rng;
use std::sync::RwLock;
use std::time::Duration;

use provider::ProviderError;

use crate::llm::CompletionProvider;
use crate::schema::CompletionRequest;

/// Answers from a list of `(needle, reply)` rules matched against the prompt,
/// falling back to a default reply. Records every request.
pub struct MockCompletionProvider {
    rules: RwLock<Vec<(String, String)>>,
    default_reply: String,
    failure: Option<ProviderError>,
    max_random_delay: Option<Duration>,
    calls: RwLock<Vec<CompletionRequest>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            default_reply: crate::prompt::NOT_FOUND_MARKER.to_string(),
            failure: None,
            max_random_delay: None,
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Reply used when no rule matches.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    pub fn with_reply_when(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((needle.into(), reply.into()));
        self
    }

    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_random_delay(mut self, max: Duration) -> Self {
        self.max_random_delay = Some(max);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    fn name(&self) -> &'static str {
        "mock-completion"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.write().unwrap().push(request.clone());

        if let Some(max) = self.max_random_delay {
            let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let reply = self
            .rules
            .read()
            .unwrap()
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());

        Ok(reply)
    }
}
