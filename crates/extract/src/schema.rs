use serde::{Deserialize, Serialize};

/// Sampling settings passed through to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 150,
        }
    }
}

/// One request to a completion provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entity_index: usize,
    /// Empty when the model found nothing or was never asked.
    pub answer: String,
    pub raw_model_output: String,
    /// False when an empty search result short-circuited the call.
    pub model_called: bool,
}

impl ExtractionResult {
    pub fn has_answer(&self) -> bool {
        !self.answer.is_empty()
    }
}
