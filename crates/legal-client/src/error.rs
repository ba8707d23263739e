//! Error types for crucial policy fetching and validation.
//!
//! The taxonomy follows the three ways a policy fetch can go wrong:
//!
//! - transport failures (connection refused, DNS, timeouts) abort a fetch
//!   immediately and are never retried within that fetch
//! - server failures (HTTP 5xx) are retried with backoff until the retry
//!   budget is spent
//! - protocol failures (unexpected status, undecodable body) are surfaced
//!   immediately

use std::fmt;

use crate::config::ConfigError;

/// Errors that can occur while fetching crucial policies or validating claims.
#[derive(Debug, thiserror::Error)]
pub enum LegalError {
    /// The policy service could not be reached.
    #[error("Transport error calling {url}: {message}")]
    Transport {
        /// The request URL.
        url: String,
        /// Description of the underlying network failure.
        message: String,
    },

    /// The policy service kept answering with a 5xx status until the retry
    /// budget was exhausted.
    #[error("Policy service returned status {status} after {attempts} attempts")]
    Server {
        /// The last status code received.
        status: u16,
        /// Number of attempts made, including the first.
        attempts: u32,
    },

    /// The policy service answered with a status that is neither 200 nor 5xx.
    #[error("Unexpected status {status} from policy service: {body}")]
    UnexpectedStatus {
        /// The status code received.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The response body could not be decoded as a crucial policy document.
    #[error("Failed to decode crucial policy document: {0}")]
    Decode(String),

    /// The configured base URL is not usable.
    #[error("Invalid policy service URL: {0}")]
    InvalidUrl(String),

    /// The client configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The local cache was already primed and the refresh loop is running.
    #[error("Crucial policy caching already started")]
    AlreadyStarted,

    /// An operation needed the background tasks but they were never started.
    #[error("Crucial policy caching not started")]
    NotStarted,
}

impl LegalError {
    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedStatus` error.
    #[must_use]
    pub fn unexpected_status(status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if a fetch that failed this way may succeed on retry.
    ///
    /// Only server errors qualify. Transport and protocol failures are
    /// permanent for the fetch that produced them.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Returns `true` if the policy service answered but the answer was unusable.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { .. } | Self::Decode(_))
    }

    /// Returns the error category for logging and health reporting.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Server { .. } => ErrorCategory::Server,
            Self::UnexpectedStatus { .. } | Self::Decode(_) => ErrorCategory::Protocol,
            Self::InvalidUrl(_)
            | Self::Configuration { .. }
            | Self::AlreadyStarted
            | Self::NotStarted => ErrorCategory::Client,
        }
    }
}

impl From<ConfigError> for LegalError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Categories of policy client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network or connection failures.
    Transport,
    /// Policy service 5xx responses.
    Server,
    /// Malformed or unexpected policy service responses.
    Protocol,
    /// Misuse or misconfiguration of the client itself.
    Client,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Server => write!(f, "server"),
            Self::Protocol => write!(f, "protocol"),
            Self::Client => write!(f, "client"),
        }
    }
}
