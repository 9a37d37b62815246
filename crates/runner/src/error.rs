//! Runner error types — the uniform error kinds shared by all node families.

use std::time::Duration;

/// Error type for all runner operations.
///
/// Kinds are uniform across node families so the engine can apply one retry
/// and error-policy path, and so user-facing logs carry a stable `kind`
/// string plus actionable advice instead of stack traces.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// Parameters missing or out of range. Fatal to the node.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No credential stored for the provider.
    #[error("credentials missing for provider {provider}")]
    CredentialsMissing {
        /// The provider the node needs (e.g. `"slack"`).
        provider: String,
    },

    /// The stored credential expired and could not be refreshed.
    #[error("credentials expired for provider {provider}")]
    CredentialsExpired {
        /// The provider whose credential expired.
        provider: String,
    },

    /// Non-2xx from an external system.
    #[error("provider {provider} returned {status}: {message}")]
    ProviderError {
        /// Which provider failed.
        provider: String,
        /// HTTP-ish status code the provider returned.
        status: u16,
        /// The provider's error message.
        message: String,
    },

    /// The provider asked us to slow down. Retryable.
    #[error("rate limited")]
    RateLimited {
        /// Suggested delay before retrying, if the provider sent one.
        retry_after: Option<Duration>,
    },

    /// The provider rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The runner exceeded its wall-time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Cooperative cancellation acknowledged.
    #[error("cancelled")]
    Cancelled,

    /// An expression failed to parse or evaluate.
    #[error("expression failed: {0}")]
    Expression(String),

    /// Engine or runner invariant broken. Fatal to the execution.
    #[error("internal: {0}")]
    Internal(String),
}

impl RunnerError {
    /// Create an invalid-configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The stable kind string recorded on node runs and log entries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::CredentialsMissing { .. } => "credentials_missing",
            Self::CredentialsExpired { .. } => "credentials_expired",
            Self::ProviderError { .. } => "provider_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Expression(_) => "expression_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns `true` if the engine should consider retrying.
    ///
    /// Rate limits are always retryable; provider errors only when the
    /// provider-side status is a 5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::ProviderError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Suggested delay before the next attempt, if the error carries one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// User-actionable advice for the log entry, when there is any.
    #[must_use]
    pub fn advice(&self) -> Option<String> {
        match self {
            Self::CredentialsMissing { provider } => {
                Some(format!("Connect {provider} and retry"))
            }
            Self::CredentialsExpired { provider } => {
                Some(format!("Reconnect {provider} and retry"))
            }
            Self::RateLimited { .. } => Some("Reduce request frequency or batch size".to_owned()),
            Self::Timeout(_) => Some("Increase the node timeout or reduce input size".to_owned()),
            Self::InvalidConfiguration(_) => {
                Some("Fix the node configuration and run again".to_owned())
            }
            Self::InvalidRequest(_) => Some("Check the request parameters".to_owned()),
            _ => None,
        }
    }
}
