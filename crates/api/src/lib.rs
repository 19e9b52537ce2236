pub mod config;
pub mod routes;

pub use config::{AppConfig, Credentials, get_credentials};
pub use routes::{AppState, router};

use anyhow::{Context, Result};
use extract::{ChatCompletionsProvider, CompletionProvider};
use pipeline::Providers;
use provider::ProviderLimiter;
use search::{SearchProvider, SerpApiProvider};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("entity-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Production providers, each behind one limiter shared by every run.
pub fn build_providers(
    config: &AppConfig,
    credentials: &Credentials,
    client: reqwest::Client,
) -> Providers {
    let search = SerpApiProvider::new(&credentials.search_key, client.clone());
    let completion = ChatCompletionsProvider::new(
        &config.completion.base_url,
        &config.completion.model,
        &credentials.completion_key,
        client,
    );

    let search_limiter = Arc::new(ProviderLimiter::per_second(
        search.name(),
        config.rate_limits.search_rps,
    ));
    let completion_limiter = Arc::new(ProviderLimiter::per_second(
        completion.name(),
        config.rate_limits.completion_rps,
    ));

    tracing::info!(
        search = search.name(),
        completion = completion.name(),
        model = completion.model(),
        search_rps = config.rate_limits.search_rps,
        completion_rps = config.rate_limits.completion_rps,
        "Providers configured"
    );

    Providers::new(Arc::new(search), Arc::new(completion))
        .with_limiters(search_limiter, completion_limiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_limiter_named_after_vendor() {
        let mut config = AppConfig::default();
        config.completion.base_url = "https://api.openai.com/v1".to_string();
        let credentials = Credentials {
            search_key: "search".to_string(),
            completion_key: "completion".to_string(),
            sheet_credentials: None,
        };

        let providers = build_providers(&config, &credentials, reqwest::Client::new());
        assert_eq!(providers.completion_limiter.name(), "openai");
        assert_eq!(providers.search_limiter.name(), "serpapi");
    }
}
