use async_trait::async_trait;
use provider::{ProviderError, retry_after};
use serde::{Deserialize, Serialize};

use crate::schema::CompletionRequest;

/// A single raw call to a language-model completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// The model's text reply to `request`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Clone)]
pub struct ChatCompletionsProvider {
    name: &'static str,
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    code: Option<serde_json::Value>,
}

impl ChatCompletionsProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            name: vendor_name(&base_url),
            base_url,
            model: model.into(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn groq(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self::new(
            "https://api.groq.com/openai/v1",
            "llama-3.1-8b-instant",
            api_key,
            client,
        )
    }

    /// Name used in logs and error messages.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name, &e))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name, &e))?;

        if !status.is_success() {
            let error = error_message(&text);
            return Err(ProviderError::from_status_and_code(
                self.name,
                status,
                retry_after,
                error.code.as_deref(),
                &error.message,
            ));
        }

        parse_response(self.name, &text)
    }
}

struct ErrorMessage {
    code: Option<String>,
    message: String,
}

/// Provider error text and its string code, or the raw body.
fn error_message(body: &str) -> ErrorMessage {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody { error }) => ErrorMessage {
            code: match error.code {
                Some(serde_json::Value::String(code)) => Some(code),
                _ => None,
            },
            message: error.message,
        },
        Err(_) => ErrorMessage {
            code: None,
            message: body.to_string(),
        },
    }
}

/// Known hosts get their vendor name, anything else a generic one.
fn vendor_name(base_url: &str) -> &'static str {
    let host = base_url
        .split("://")
        .nth(1)
        .unwrap_or(base_url)
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    [
        ("groq.com", "groq"),
        ("openai.com", "openai"),
        ("together.xyz", "together"),
        ("mistral.ai", "mistral"),
        ("openrouter.ai", "openrouter"),
        ("fireworks.ai", "fireworks"),
        ("deepseek.com", "deepseek"),
    ]
    .iter()
    .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
    .map(|(_, name)| *name)
    .unwrap_or("chat-completions")
}

pub(crate) fn parse_response(provider: &'static str, body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(provider, format!("invalid completion JSON: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| ProviderError::malformed(provider, "response has no message content"))
}
