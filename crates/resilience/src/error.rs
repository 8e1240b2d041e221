//! Error types for the outbound-call resilience layer
//!
//! Two error families live here:
//!
//! 1. [`ProviderError`]: the closed set of transport-level failures a
//!    provider call can surface. Each variant is tagged retryable-or-not at
//!    the point of creation, so retry classification never falls back to
//!    string matching on error messages.
//!
//! 2. [`Error`]: the terminal errors this layer raises to callers. Every
//!    terminal condition is typed; nothing on the primary call path is
//!    silently swallowed.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Which configured quota a rate-limit rejection tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Per-minute request quota
    RequestsPerMinute,
    /// Per-hour request quota
    RequestsPerHour,
    /// Per-minute token budget
    TokensPerMinute,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestsPerMinute => write!(f, "requests_per_minute"),
            Self::RequestsPerHour => write!(f, "requests_per_hour"),
            Self::TokensPerMinute => write!(f, "tokens_per_minute"),
        }
    }
}

/// Discriminant for [`ProviderError`] variants
///
/// Retry policies hold a set of these to mark which failure classes are
/// transient for a given operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request timed out before the provider answered
    Timeout,
    /// TCP/TLS level connection failure
    Connection,
    /// Provider reported its own quota exhausted (HTTP 429 family)
    RateLimited,
    /// Non-2xx HTTP response not covered by a more specific variant
    Http,
    /// Provider signalled temporary unavailability (HTTP 5xx family)
    ServerUnavailable,
    /// Request was malformed; retrying cannot help
    InvalidRequest,
    /// Credentials rejected
    Unauthorized,
    /// Response body could not be decoded
    Decode,
}

/// Transport-level failure from a provider call
///
/// The transport adapter constructs exactly one of these per failed call.
/// The set is closed on purpose: the retry orchestrator classifies
/// retryability from [`ErrorKind`] tags and HTTP status codes, never from
/// error message text.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded its transport deadline
    #[error("request timed out after {elapsed:?}")]
    Timeout {
        /// How long the call ran before the deadline fired
        elapsed: Duration,
    },

    /// The connection could not be established or was dropped
    #[error("connection failed: {message}")]
    Connection {
        /// Transport-level detail
        message: String,
    },

    /// The provider rejected the call for quota reasons
    #[error("provider rate limit hit")]
    RateLimited {
        /// Provider-supplied wait hint, from a Retry-After style header
        retry_after: Option<Duration>,
    },

    /// Generic non-2xx response
    #[error("provider returned HTTP {status}")]
    Http {
        /// HTTP status code of the response
        status: u16,
        /// Provider-supplied wait hint, if any
        retry_after: Option<Duration>,
    },

    /// The provider is temporarily unavailable (5xx family)
    #[error("provider temporarily unavailable")]
    ServerUnavailable {
        /// Provider-supplied wait hint, if any
        retry_after: Option<Duration>,
    },

    /// The request itself was invalid
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Validation detail from the provider
        message: String,
    },

    /// Authentication or authorization failure
    #[error("provider rejected credentials")]
    Unauthorized,

    /// The response body could not be parsed
    #[error("failed to decode provider response: {message}")]
    Decode {
        /// Parser detail
        message: String,
    },
}

impl ProviderError {
    /// The classification tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Http { .. } => ErrorKind::Http,
            Self::ServerUnavailable { .. } => ErrorKind::ServerUnavailable,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Provider-supplied wait hint, when the failure carried one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after }
            | Self::Http { retry_after, .. }
            | Self::ServerUnavailable { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status code, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::ServerUnavailable { .. } => Some(503),
            _ => None,
        }
    }
}

/// Terminal errors raised by the resilience layer
#[derive(Debug, Error)]
pub enum Error {
    /// Admission denied: the quota for this window is already consumed.
    /// Callers should defer or queue rather than retry immediately.
    #[error("rate limit exceeded: {kind} at {current}/{limit}")]
    RateLimitExceeded {
        /// Which quota tripped
        kind: LimitKind,
        /// Observed count in the current window
        current: u64,
        /// Configured ceiling for that window
        limit: u64,
    },

    /// The operation failed with an error the policy does not consider
    /// transient; no further attempts were made
    #[error("non-retryable provider error: {source}")]
    NonRetryable {
        /// The underlying transport failure
        #[source]
        source: ProviderError,
    },

    /// All configured attempts were consumed
    #[error("retries exhausted after {attempts} attempts over {elapsed:?}: {source}")]
    RetryExhausted {
        /// Number of attempts made (equals the policy's max)
        attempts: u32,
        /// Wall-clock time from first attempt to final failure
        elapsed: Duration,
        /// The last underlying failure
        #[source]
        source: ProviderError,
    },

    /// The circuit breaker for this service is open; the call was not
    /// attempted
    #[error("circuit breaker open for service '{service}'")]
    CircuitOpen {
        /// Name of the protected service dependency
        service: String,
    },

    /// The caller's cancellation token fired between attempts
    #[error("operation cancelled before attempt {attempt}")]
    Cancelled {
        /// Attempt number that was about to run
        attempt: u32,
    },

    /// A policy or limiter configuration failed validation
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// What failed validation
        message: String,
    },

    /// The shared counter store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for resilience operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `LimitKind` display formatting.
    ///
    /// Assertions:
    /// - Confirms `LimitKind::RequestsPerMinute.to_string()` equals
    ///   `"requests_per_minute"`.
    /// - Confirms `LimitKind::TokensPerMinute.to_string()` equals
    ///   `"tokens_per_minute"`.
    #[test]
    fn test_limit_kind_display() {
        assert_eq!(LimitKind::RequestsPerMinute.to_string(), "requests_per_minute");
        assert_eq!(LimitKind::RequestsPerHour.to_string(), "requests_per_hour");
        assert_eq!(LimitKind::TokensPerMinute.to_string(), "tokens_per_minute");
    }

    /// Validates `ProviderError::kind` tagging for every variant.
    ///
    /// Assertions:
    /// - Confirms each variant maps to its matching `ErrorKind`.
    #[test]
    fn test_provider_error_kinds() {
        let err = ProviderError::Timeout { elapsed: Duration::from_secs(30) };
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = ProviderError::RateLimited { retry_after: None };
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = ProviderError::InvalidRequest { message: "bad payload".to_string() };
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        assert_eq!(ProviderError::Unauthorized.kind(), ErrorKind::Unauthorized);
    }

    /// Validates `ProviderError::retry_after` extraction.
    ///
    /// Assertions:
    /// - Confirms rate-limited errors surface their wait hint.
    /// - Confirms timeouts carry no wait hint.
    #[test]
    fn test_provider_error_retry_after() {
        let err = ProviderError::RateLimited { retry_after: Some(Duration::from_secs(15)) };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(15)));

        let err = ProviderError::Timeout { elapsed: Duration::from_secs(30) };
        assert_eq!(err.retry_after(), None);
    }

    /// Validates `ProviderError::status` mapping.
    ///
    /// Assertions:
    /// - Confirms `Http { status: 502 }` reports 502.
    /// - Confirms `RateLimited` reports 429.
    /// - Confirms `Connection` reports no status.
    #[test]
    fn test_provider_error_status() {
        let err = ProviderError::Http { status: 502, retry_after: None };
        assert_eq!(err.status(), Some(502));

        let err = ProviderError::RateLimited { retry_after: None };
        assert_eq!(err.status(), Some(429));

        let err = ProviderError::Connection { message: "refused".to_string() };
        assert_eq!(err.status(), None);
    }

    /// Validates `Error` display formatting for terminal variants.
    ///
    /// Assertions:
    /// - Ensures the rate-limit error names the tripped quota and counts.
    /// - Ensures the exhaustion error names the attempt count.
    #[test]
    fn test_error_display() {
        let err = Error::RateLimitExceeded {
            kind: LimitKind::RequestsPerMinute,
            current: 100,
            limit: 100,
        };
        assert!(err.to_string().contains("requests_per_minute"));
        assert!(err.to_string().contains("100/100"));

        let err = Error::RetryExhausted {
            attempts: 3,
            elapsed: Duration::from_secs(7),
            source: ProviderError::Unauthorized,
        };
        assert!(err.to_string().contains("3 attempts"));

        let err = Error::CircuitOpen { service: "deepgram".to_string() };
        assert!(err.to_string().contains("deepgram"));
    }
}
