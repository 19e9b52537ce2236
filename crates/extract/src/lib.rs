pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod schema;
pub mod testing;

pub use llm::{ChatCompletionsProvider, CompletionProvider};
pub use normalizer::AnswerNormalizer;
pub use schema::{CompletionRequest, ExtractionResult, SamplingParams};

use ingest::RenderedQuery;
use provider::{ErrorClass, ProviderError, ProviderLimiter, RetryError, RetryPolicy};
use search::SearchResultSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction failed after {attempts} attempt(s): {source}")]
pub struct ExtractionError {
    pub attempts: usize,
    #[source]
    pub source: ProviderError,
}

impl ExtractionError {
    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}

impl From<RetryError> for ExtractionError {
    fn from(err: RetryError) -> Self {
        Self {
            attempts: err.attempts,
            source: err.source,
        }
    }
}

/// Extraction adapter: asks the completion provider to answer a question
/// strictly from a set of search snippets.
#[derive(Clone)]
pub struct Extractor {
    llm_client: Arc<dyn CompletionProvider>,
    limiter: Arc<ProviderLimiter>,
    retry: RetryPolicy,
    params: SamplingParams,
    timeout: Duration,
    normalizer: AnswerNormalizer,
}

impl Extractor {
    pub fn new(
        llm_client: Arc<dyn CompletionProvider>,
        limiter: Arc<ProviderLimiter>,
        retry: RetryPolicy,
        params: SamplingParams,
        timeout: Duration,
    ) -> Self {
        Self {
            llm_client,
            limiter,
            retry,
            params,
            timeout,
            normalizer: AnswerNormalizer::default(),
        }
    }

    pub fn params(&self) -> SamplingParams {
        self.params
    }

    pub fn build_request(&self, question: &RenderedQuery, results: &SearchResultSet) -> CompletionRequest {
        CompletionRequest {
            system: prompt::SYSTEM_PROMPT.to_string(),
            prompt: prompt::build_extraction_prompt(&question.text, &results.snippets),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        }
    }

    /// Extract an answer to `question` from `results`.
    ///
    /// An empty result set returns an empty answer without calling the model.
    pub async fn extract(
        &self,
        question: &RenderedQuery,
        results: &SearchResultSet,
    ) -> Result<ExtractionResult, ExtractionError> {
        if results.is_empty() {
            debug!(
                entity_index = question.entity_index,
                "No search context, skipping completion call"
            );
            return Ok(ExtractionResult {
                entity_index: question.entity_index,
                answer: String::new(),
                raw_model_output: String::new(),
                model_called: false,
            });
        }

        let request = self.build_request(question, results);

        let raw_model_output = self
            .retry
            .retry("extract", || {
                self.limiter
                    .call(self.timeout, self.llm_client.complete(&request))
            })
            .await?;

        let answer = self.normalizer.normalize(&raw_model_output);

        debug!(
            entity_index = question.entity_index,
            provider = self.llm_client.name(),
            found = !answer.is_empty(),
            "Extraction completed"
        );

        Ok(ExtractionResult {
            entity_index: question.entity_index,
            answer,
            raw_model_output,
            model_called: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompletionProvider;
    use chrono::Utc;
    use search::Snippet;

    fn question() -> RenderedQuery {
        RenderedQuery {
            entity_index: 0,
            text: "What does Acme Corp sell?".to_string(),
        }
    }

    fn results(snippets: &[&str]) -> SearchResultSet {
        SearchResultSet {
            entity_index: 0,
            snippets: snippets.iter().map(|s| Snippet::new(*s)).collect(),
            fetched_at: Utc::now(),
        }
    }

    fn extractor(llm: Arc<MockCompletionProvider>) -> Extractor {
        Extractor::new(
            llm,
            Arc::new(ProviderLimiter::unlimited("mock-completion")),
            RetryPolicy::new(2, 10, 100),
            SamplingParams {
                temperature: 0.2,
                max_tokens: 64,
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_empty_context_skips_the_model() {
        let llm = Arc::new(MockCompletionProvider::new().with_default_reply("Widgets"));

        let result = extractor(llm.clone())
            .extract(&question(), &results(&[]))
            .await
            .unwrap();

        assert_eq!(llm.call_count(), 0);
        assert_eq!(result.answer, "");
        assert!(!result.model_called);
    }

    #[tokio::test]
    async fn test_answer_from_context() {
        let llm = Arc::new(MockCompletionProvider::new().with_default_reply("  Widgets\n"));

        let result = extractor(llm.clone())
            .extract(&question(), &results(&["Acme sells widgets."]))
            .await
            .unwrap();

        assert_eq!(result.answer, "Widgets");
        assert_eq!(result.raw_model_output, "  Widgets\n");
        assert!(result.model_called);

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, 0.2);
        assert_eq!(calls[0].max_tokens, 64);
        assert!(calls[0].prompt.contains("What does Acme Corp sell?"));
        assert!(calls[0].prompt.contains("Acme sells widgets."));
    }

    #[tokio::test]
    async fn test_not_found_marker_is_empty_answer() {
        let llm = Arc::new(MockCompletionProvider::new().with_default_reply("not_found"));

        let result = extractor(llm)
            .extract(&question(), &results(&["Unrelated text."]))
            .await
            .unwrap();

        assert_eq!(result.answer, "");
        assert!(!result.has_answer());
        assert!(result.model_called);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_provider_errors() {
        let llm = Arc::new(MockCompletionProvider::new().failing_with(ProviderError::RateLimited {
            provider: "mock-completion",
            retry_after: None,
        }));

        let err = extractor(llm.clone())
            .extract(&question(), &results(&["Acme sells widgets."]))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_not_retried() {
        let llm = Arc::new(
            MockCompletionProvider::new()
                .failing_with(ProviderError::malformed("mock-completion", "no content")),
        );

        let err = extractor(llm.clone())
            .extract(&question(), &results(&["Acme sells widgets."]))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(llm.call_count(), 1);
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
