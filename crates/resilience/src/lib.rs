//! Outbound-call resilience for rate-limited speech and AI providers
//!
//! Murmur's provider adapters (transcription, chat completion, analysis)
//! all route their outbound calls through this crate, which layers three
//! guards in front of every call:
//!
//! - [`RateLimiter`]: fixed-window admission control over a shared counter
//!   store, so a fleet of workers collectively respects each provider's
//!   published quotas instead of discovering them via 429s.
//! - [`RetryOrchestrator`]: policy-driven retries with tagged-error
//!   classification, provider wait hints, and configurable backoff.
//! - [`CircuitBreaker`]: a per-service failure accumulator embedded in the
//!   orchestrator that fast-fails calls while a dependency is down.
//!
//! The typical call path:
//!
//! ```no_run
//! use std::sync::Arc;
//! use murmur_resilience::{
//!     InMemoryCounterStore, ProviderError, RateLimiter, RetryOrchestrator, RetryPolicy,
//! };
//!
//! # async fn transcribe_chunk() -> Result<String, ProviderError> { Ok(String::new()) }
//! # async fn example() -> murmur_resilience::Result<String> {
//! let store = Arc::new(InMemoryCounterStore::new());
//! let limiter = RateLimiter::new("deepgram", store);
//! let orchestrator = RetryOrchestrator::new("transcription", RetryPolicy::transcription())?;
//!
//! limiter.check_rate_limit("listen", None).await?;
//! let transcript = orchestrator
//!     .with_retries(|_attempt| transcribe_chunk())
//!     .await?;
//! # Ok(transcript)
//! # }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod store;

pub use circuit_breaker::{
    BreakerConfig, BreakerConfigBuilder, BreakerSnapshot, BreakerState, CircuitBreaker,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{Error, ErrorKind, LimitKind, ProviderError, Result};
pub use rate_limiter::{
    ProviderLimits, RateLimitStatus, RateLimiter, ResponseMetadata, PROVIDER_LIMITS,
};
pub use report::{ErrorReport, ErrorReporter, NullReporter, TracingReporter};
pub use retry::{BackoffStrategy, RetryOrchestrator, RetryPolicy, RetryPolicyBuilder};
pub use store::{CounterStore, InMemoryCounterStore, StoreError, StoreResult};
