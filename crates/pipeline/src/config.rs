use extract::SamplingParams;
use ingest::{QueryTemplate, TemplateError};
use provider::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub template: String,
    pub max_results: usize,
    /// Per network call, not per entity.
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub concurrency: usize,
    pub retry: RetryConfig,
    /// Leading rows inspected for a repeated permanent failure; below 2 disables the check.
    pub misconfiguration_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("max_results must be at least 1, got {0}")]
    MaxResults(usize),

    #[error("timeout must be greater than zero")]
    Timeout,

    #[error("temperature must be within [0, 2], got {0}")]
    Temperature(f32),

    #[error("max_tokens must be at least 1, got {0}")]
    MaxTokens(u32),

    #[error("concurrency must be at least 1, got {0}")]
    Concurrency(usize),

    #[error(
        "initial backoff ({initial_ms} ms) must be positive and not exceed max backoff ({max_ms} ms)"
    )]
    Backoff { initial_ms: u64, max_ms: u64 },
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template: "What is the main product or service of {entity}?".to_string(),
            max_results: 5,
            timeout_ms: 30_000,
            temperature: 0.5,
            max_tokens: 150,
            concurrency: 1,
            retry: RetryConfig::default(),
            misconfiguration_window: 3,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl PipelineConfig {
    /// Check every setting and compile the template. Nothing is clamped.
    pub fn validate(&self) -> Result<QueryTemplate, ConfigError> {
        let template = QueryTemplate::new(self.template.clone())?;

        if self.max_results == 0 {
            return Err(ConfigError::MaxResults(self.max_results));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Timeout);
        }
        // NaN fails the range check too
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::MaxTokens(self.max_tokens));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.retry.max_retries > 0
            && (self.retry.initial_backoff_ms == 0
                || self.retry.initial_backoff_ms > self.retry.max_backoff_ms)
        {
            return Err(ConfigError::Backoff {
                initial_ms: self.retry.initial_backoff_ms,
                max_ms: self.retry.max_backoff_ms,
            });
        }

        Ok(template)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        let template = config.validate().unwrap();

        assert_eq!(template.as_str(), "What is the main product or service of {entity}?");
        assert_eq!(config.retry_policy().max_retries(), 2);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_template_without_placeholder() {
        let config = PipelineConfig {
            template: "What do they sell?".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Template(TemplateError::MissingPlaceholder { .. }))
        ));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let base = PipelineConfig::default();

        let cases = [
            PipelineConfig { max_results: 0, ..base.clone() },
            PipelineConfig { timeout_ms: 0, ..base.clone() },
            PipelineConfig { temperature: -0.1, ..base.clone() },
            PipelineConfig { temperature: 2.5, ..base.clone() },
            PipelineConfig { temperature: f32::NAN, ..base.clone() },
            PipelineConfig { max_tokens: 0, ..base.clone() },
            PipelineConfig { concurrency: 0, ..base.clone() },
            PipelineConfig {
                retry: RetryConfig {
                    max_retries: 2,
                    initial_backoff_ms: 5_000,
                    max_backoff_ms: 1_000,
                },
                ..base.clone()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }

    #[test]
    fn test_boundaries_are_accepted() {
        let config = PipelineConfig {
            temperature: 2.0,
            max_results: 1,
            max_tokens: 1,
            retry: RetryConfig {
                max_retries: 0,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            ..Default::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"template": "Who founded {entity}?", "concurrency": 3}"#).unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.retry.max_retries, 2);
    }
}
