use async_trait::async_trait;
use provider::{ProviderError, retry_after};
use serde::Deserialize;

use crate::{SearchProvider, Snippet};

const PROVIDER: &str = "serpapi";

/// SerpAPI reports "no results" as an error message, not an empty list.
const NO_RESULTS: &str = "hasn't returned any results";

#[derive(Clone)]
pub struct SerpApiProvider {
    api_key: String,
    base_url: String,
    engine: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct SerpErrorBody {
    error: String,
}

impl SerpApiProvider {
    pub fn new(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://serpapi.com".to_string(),
            engine: "google".to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<Snippet>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let num = num_results.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, &e.without_url()))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, &e.without_url()))?;

        if !status.is_success() {
            let message = error_message(&body);
            if message.contains(NO_RESULTS) {
                return Ok(Vec::new());
            }
            return Err(ProviderError::from_status(PROVIDER, status, retry_after, &message));
        }

        parse_response(&body)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<SerpErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string())
}

/// Parse a successful SerpAPI body into snippets, in result order.
pub(crate) fn parse_response(body: &str) -> Result<Vec<Snippet>, ProviderError> {
    let parsed: SerpResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(PROVIDER, format!("invalid search JSON: {}", e)))?;

    if let Some(message) = parsed.error {
        if message.contains(NO_RESULTS) {
            return Ok(Vec::new());
        }
        return Err(classify_error(&message));
    }

    Ok(parsed
        .organic_results
        .into_iter()
        .filter_map(|result| {
            let mut snippet = Snippet::new(result.snippet?);
            snippet.title = result.title;
            snippet.link = result.link;
            Some(snippet)
        })
        .collect())
}

fn classify_error(message: &str) -> ProviderError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid api key") {
        ProviderError::Unauthorized {
            provider: PROVIDER,
            status: 401,
            message: message.to_string(),
        }
    } else if lower.contains("run out of searches") {
        ProviderError::QuotaExhausted {
            provider: PROVIDER,
            message: message.to_string(),
        }
    } else {
        ProviderError::BadRequest {
            provider: PROVIDER,
            status: 200,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_organic_results_in_order() {
        let body = r#"{
            "search_metadata": {"status": "Success"},
            "organic_results": [
                {"position": 1, "title": "Acme", "link": "https://acme.test", "snippet": "Acme sells widgets."},
                {"position": 2, "title": "No snippet", "link": "https://x.test"},
                {"position": 3, "title": "Wiki", "snippet": "Acme Corporation is a fictional company."}
            ]
        }"#;

        let snippets = parse_response(body).unwrap();

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "Acme sells widgets.");
        assert_eq!(snippets[0].title.as_deref(), Some("Acme"));
        assert_eq!(snippets[0].link.as_deref(), Some("https://acme.test"));
        assert_eq!(snippets[1].title.as_deref(), Some("Wiki"));
        assert_eq!(snippets[1].link, None);
    }

    #[test]
    fn test_missing_results_is_empty() {
        assert!(parse_response(r#"{"search_metadata": {}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_no_results_message_is_not_an_error() {
        let body = r#"{"error": "Google hasn't returned any results for this query."}"#;
        assert!(parse_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_error_messages_are_classified() {
        let err = parse_response(r#"{"error": "Invalid API key. Your API key should be here: https://serpapi.com/manage-api-key"}"#)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized { .. }));

        let err = parse_response(r#"{"error": "Your account has run out of searches."}"#).unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExhausted { .. }));

        let err = parse_response(r#"{"error": "Missing query `q` parameter."}"#).unwrap_err();
        assert!(matches!(err, ProviderError::BadRequest { .. }));
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        let err = parse_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_message_prefers_json_field() {
        assert_eq!(error_message(r#"{"error": "Invalid API key."}"#), "Invalid API key.");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
