use anyhow::{Context, Result, bail};
use pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub rate_limits: RateLimitConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Steady request quota per provider, 0 disables it.
    pub search_rps: u32,
    pub completion_rps: u32,
}

/// API keys, kept out of `AppConfig` so they never end up in logs.
#[derive(Clone)]
pub struct Credentials {
    pub search_key: String,
    pub completion_key: String,
    /// Reported only; sheets are fetched through their public CSV export.
    pub sheet_credentials: Option<PathBuf>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("search_key", &mask(&self.search_key))
            .field("completion_key", &mask(&self.completion_key))
            .field("sheet_credentials", &self.sheet_credentials)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                log_json: false,
            },
            completion: CompletionConfig {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                model: "llama-3.1-8b-instant".to_string(),
            },
            rate_limits: RateLimitConfig {
                search_rps: 5,
                completion_rps: 5,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Some(json) = parse::<bool>(&lookup, "LOG_JSON")? {
            config.server.log_json = json;
        }
        if let Some(url) = lookup("COMPLETION_BASE_URL") {
            config.completion.base_url = url;
        }
        if let Some(model) = lookup("COMPLETION_MODEL") {
            config.completion.model = model;
        }
        if let Some(rps) = parse(&lookup, "SEARCH_RPS")? {
            config.rate_limits.search_rps = rps;
        }
        if let Some(rps) = parse(&lookup, "COMPLETION_RPS")? {
            config.rate_limits.completion_rps = rps;
        }

        let pipeline = &mut config.pipeline;
        if let Some(template) = lookup("PIPELINE_TEMPLATE") {
            pipeline.template = template;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_MAX_RESULTS")? {
            pipeline.max_results = value;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_TIMEOUT_MS")? {
            pipeline.timeout_ms = value;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_TEMPERATURE")? {
            pipeline.temperature = value;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_MAX_TOKENS")? {
            pipeline.max_tokens = value;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_CONCURRENCY")? {
            pipeline.concurrency = value;
        }
        if let Some(value) = parse(&lookup, "PIPELINE_MAX_RETRIES")? {
            pipeline.retry.max_retries = value;
        }

        Ok(config)
    }
}

/// Read the provider keys from the environment.
pub fn get_credentials() -> Result<Credentials> {
    let _ = dotenvy::dotenv();
    credentials_from_lookup(|name| env::var(name).ok())
}

pub fn credentials_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
    let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let search_key = present("SERPAPI_API_KEY").context("SERPAPI_API_KEY must be set")?;
    let completion_key = match present("GROQ_API_KEY").or_else(|| present("COMPLETION_API_KEY")) {
        Some(key) => key,
        None => bail!("GROQ_API_KEY or COMPLETION_API_KEY must be set"),
    };

    Ok(Credentials {
        search_key,
        completion_key,
        sheet_credentials: present("GOOGLE_SHEETS_CREDENTIALS").map(PathBuf::from),
    })
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a valid value, got {raw:?}")),
        None => Ok(None),
    }
}

fn mask(secret: &str) -> String {
    let show = secret.chars().take(4).collect::<String>();
    format!("{}*** ({} chars)", show, secret.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.pipeline.max_results, 5);
        assert_eq!(config.completion.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("SEARCH_RPS", "0"),
            ("PIPELINE_TEMPLATE", "Who founded {entity}?"),
            ("PIPELINE_CONCURRENCY", "4"),
            ("PIPELINE_TEMPERATURE", "0.1"),
        ]))
        .unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.rate_limits.search_rps, 0);
        assert_eq!(config.pipeline.template, "Who founded {entity}?");
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.pipeline.temperature, 0.1);
    }

    #[test]
    fn test_unparseable_value_names_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("PIPELINE_MAX_RESULTS", "five")])).unwrap_err();
        assert!(err.to_string().contains("PIPELINE_MAX_RESULTS"));
    }

    #[test]
    fn test_credentials() {
        let creds = credentials_from_lookup(lookup(&[
            ("SERPAPI_API_KEY", "serp-secret"),
            ("COMPLETION_API_KEY", "llm-secret"),
        ]))
        .unwrap();

        assert_eq!(creds.search_key, "serp-secret");
        assert_eq!(creds.completion_key, "llm-secret");
        assert!(creds.sheet_credentials.is_none());
        assert!(!format!("{:?}", creds).contains("serp-secret"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = credentials_from_lookup(lookup(&[("GROQ_API_KEY", "x")])).unwrap_err();
        assert!(err.to_string().contains("SERPAPI_API_KEY"));

        let err = credentials_from_lookup(lookup(&[("SERPAPI_API_KEY", "  ")])).unwrap_err();
        assert!(err.to_string().contains("SERPAPI_API_KEY"));

        let err = credentials_from_lookup(lookup(&[("SERPAPI_API_KEY", "x")])).unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }
}
