use chrono::{DateTime, Utc};
use thiserror::Error;

pub type CreditsResult<T> = Result<T, CreditsError>;

#[derive(Debug, Error)]
pub enum CreditsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("forge returned {status} for {url}: {message}")]
    Transport {
        status: u16,
        url: String,
        message: String,
    },

    #[error("malformed payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limit exceeded (limit {limit:?}, resets at {reset_at:?}, retry after {retry_after_seconds:?}s)")]
    RateLimitExceeded {
        limit: Option<u64>,
        reset_at: Option<DateTime<Utc>>,
        retry_after_seconds: Option<u64>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CreditsError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Whether the same request could succeed if issued again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimitExceeded { .. } => true,
            Self::Transport { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure is a transport-level one (network or HTTP status).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Transport { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

impl From<config::ConfigError> for CreditsError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let server = CreditsError::Transport {
            status: 502,
            url: "https://api.github.com/orgs/x/repos".to_string(),
            message: String::new(),
        };
        let client = CreditsError::Transport {
            status: 404,
            url: "https://api.github.com/orgs/x/repos".to_string(),
            message: "Not Found".to_string(),
        };

        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(client.is_transport());
    }

    #[test]
    fn rate_limit_is_flagged() {
        let err = CreditsError::RateLimitExceeded {
            limit: Some(60),
            reset_at: None,
            retry_after_seconds: None,
        };
        assert!(err.is_rate_limit());
        assert!(!err.is_transport());
    }
}
