use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use thiserror::Error;

/// Longest provider message kept in an error, in characters.
const MAX_MESSAGE_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying: timeouts, throttling, provider outages.
    Transient,
    /// Retrying cannot help: bad credentials, exhausted quota, rejected input.
    Permanent,
}

/// A failed call to an external provider, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{provider} timed out: {message}")]
    Timeout {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{provider} unavailable ({status}): {message}")]
    Unavailable {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} connection failed: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected credentials ({status}): {message}")]
    Unauthorized {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} quota exhausted: {message}")]
    QuotaExhausted {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected the request ({status}): {message}")]
    BadRequest {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::Network { .. } => ErrorClass::Transient,
            Self::Unauthorized { .. }
            | Self::QuotaExhausted { .. }
            | Self::BadRequest { .. }
            | Self::MalformedResponse { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Wait requested by the provider, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::Network { provider, .. }
            | Self::Unauthorized { provider, .. }
            | Self::QuotaExhausted { provider, .. }
            | Self::BadRequest { provider, .. }
            | Self::MalformedResponse { provider, .. } => *provider,
        }
    }

    pub fn timeout(provider: &'static str, after: Duration) -> Self {
        Self::Timeout {
            provider,
            message: format!("no response within {} ms", after.as_millis()),
        }
    }

    pub fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            message: condense(&message.into()),
        }
    }

    /// Classify a non-success HTTP status. `message` is the provider's own
    /// error text when it could be parsed, otherwise the raw body.
    pub fn from_status(
        provider: &'static str,
        status: StatusCode,
        retry_after: Option<Duration>,
        message: &str,
    ) -> Self {
        Self::from_status_and_code(provider, status, retry_after, None, message)
    }

    /// Like [`from_status`](Self::from_status), but a machine-readable error
    /// code from the body takes precedence over the status and the text.
    pub fn from_status_and_code(
        provider: &'static str,
        status: StatusCode,
        retry_after: Option<Duration>,
        error_code: Option<&str>,
        message: &str,
    ) -> Self {
        let message = condense(message);
        let code = status.as_u16();

        match error_code {
            Some("rate_limit_exceeded") => {
                return Self::RateLimited {
                    provider,
                    retry_after,
                };
            }
            Some("insufficient_quota") => return Self::QuotaExhausted { provider, message },
            Some("invalid_api_key") => {
                return Self::Unauthorized {
                    provider,
                    status: code,
                    message,
                };
            }
            _ => {}
        }

        match code {
            402 | 403 | 429 if mentions_quota(&message) => Self::QuotaExhausted { provider, message },
            402 => Self::QuotaExhausted { provider, message },
            429 => Self::RateLimited {
                provider,
                retry_after,
            },
            401 | 403 => Self::Unauthorized {
                provider,
                status: code,
                message,
            },
            408 | 500..=599 => Self::Unavailable {
                provider,
                status: code,
                message,
            },
            400..=499 => Self::BadRequest {
                provider,
                status: code,
                message,
            },
            _ => Self::MalformedResponse {
                provider,
                message: format!("unexpected status {}", code),
            },
        }
    }

    pub fn from_reqwest(provider: &'static str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                provider,
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(provider, status, None, &err.to_string());
        }
        if err.is_decode() || err.is_body() {
            return Self::malformed(provider, err.to_string());
        }
        if err.is_builder() {
            return Self::BadRequest {
                provider,
                status: 0,
                message: condense(&err.to_string()),
            };
        }
        Self::Network {
            provider,
            message: condense(&err.to_string()),
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn mentions_quota(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["exceeded your current quota", "run out of searches"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn condense(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_MESSAGE_CHARS {
        collapsed
    } else {
        let mut truncated: String = collapsed.chars().take(MAX_MESSAGE_CHARS).collect();
        truncated.push('…');
        truncated
    }
}
