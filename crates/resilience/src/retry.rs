//! Policy-driven retry orchestration
//!
//! The orchestrator wraps one logical outbound operation and drives it to a
//! terminal outcome: success, a non-retryable failure, exhausted attempts,
//! or a fast-fail from an embedded circuit breaker. Retryability is decided
//! from [`ErrorKind`] tags and HTTP status codes carried by
//! [`ProviderError`]; error message text is never inspected.
//!
//! Delays come from the policy's backoff strategy, except when the provider
//! supplied its own wait hint (a Retry-After style header), which wins but
//! is capped at the policy's `max_delay` so a hostile header cannot stall a
//! worker.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, ErrorKind, ProviderError, Result};
use crate::report::{ErrorReport, ErrorReporter, TracingReporter};

/// Minimum delay produced by [`BackoffStrategy::ExponentialJitter`]
const JITTER_FLOOR: Duration = Duration::from_millis(100);

/// How inter-attempt delays grow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `min(base * 2^(attempt-1), max)` with symmetric 25% jitter,
    /// floored at 100ms
    ExponentialJitter,
    /// Uniform draw from `[0, min(base * 2^(attempt-1), max)]`; decorrelates
    /// synchronized retry herds at the cost of occasional near-zero waits
    ExponentialFullJitter,
    /// `min(base * attempt, max)`, no jitter
    Linear,
    /// Always `base`
    Constant,
}

/// Retry behavior for one class of outbound operation
///
/// Policies are plain data: which failures to retry, how many attempts, and
/// how delays grow. The presets cover our operation classes; bespoke
/// policies go through [`RetryPolicy::builder`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 means no retries)
    pub max_attempts: u32,
    /// Base delay the backoff strategy scales from
    pub base_delay: Duration,
    /// Ceiling on any single inter-attempt delay, provider hints included
    pub max_delay: Duration,
    /// Delay growth strategy
    pub backoff: BackoffStrategy,
    /// Failure classes considered transient for this operation
    pub retryable_kinds: HashSet<ErrorKind>,
    /// HTTP statuses considered transient, for generic `Http` failures
    pub retryable_statuses: HashSet<u16>,
    /// Embedded circuit breaker configuration, if the operation guards a
    /// service dependency
    pub breaker: Option<BreakerConfig>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api_default()
    }
}

impl RetryPolicy {
    /// Create a policy builder seeded with [`RetryPolicy::api_default`]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Long-running transcription jobs: few attempts, patient delays
    pub fn transcription() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::ExponentialJitter,
            retryable_kinds: transient_kinds(),
            retryable_statuses: transient_statuses(),
            breaker: Some(BreakerConfig::default()),
        }
    }

    /// Interactive chat completions: more attempts, decorrelated jitter to
    /// spread concurrent sessions
    pub fn chat_completion() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            backoff: BackoffStrategy::ExponentialFullJitter,
            retryable_kinds: transient_kinds(),
            retryable_statuses: transient_statuses(),
            breaker: Some(BreakerConfig::default()),
        }
    }

    /// Default for miscellaneous provider calls
    pub fn api_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff: BackoffStrategy::ExponentialJitter,
            retryable_kinds: transient_kinds(),
            retryable_statuses: transient_statuses(),
            breaker: None,
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }
        if self.base_delay.is_zero() {
            return Err(Error::InvalidConfiguration {
                message: "base_delay must be greater than zero".to_string(),
            });
        }
        if self.max_delay < self.base_delay {
            return Err(Error::InvalidConfiguration {
                message: "max_delay must be at least base_delay".to_string(),
            });
        }
        if let Some(breaker) = &self.breaker {
            breaker.validate()?;
        }
        Ok(())
    }

    /// Whether the policy considers `error` worth another attempt
    ///
    /// Provider-reported rate limits are always retryable: the provider has
    /// told us exactly when capacity returns, refusing to wait would give up
    /// capacity for free.
    pub fn is_retryable(&self, error: &ProviderError) -> bool {
        let kind = error.kind();
        if kind == ErrorKind::RateLimited {
            return true;
        }
        if self.retryable_kinds.contains(&kind) {
            return true;
        }
        error.status().is_some_and(|status| self.retryable_statuses.contains(&status))
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base_ms = self.base_delay.as_millis();
        let max_ms = self.max_delay.as_millis();

        match self.backoff {
            BackoffStrategy::ExponentialJitter => {
                let capped = base_ms.saturating_mul(1_u128 << exponent).min(max_ms) as f64;
                let jitter = rand::thread_rng().gen_range(-0.25..=0.25) * capped;
                let delay = Duration::from_millis((capped + jitter).max(0.0) as u64);
                delay.max(JITTER_FLOOR)
            }
            BackoffStrategy::ExponentialFullJitter => {
                let capped = base_ms.saturating_mul(1_u128 << exponent).min(max_ms) as u64;
                Duration::from_millis(rand::thread_rng().gen_range(0..=capped))
            }
            BackoffStrategy::Linear => {
                let scaled = base_ms.saturating_mul(u128::from(attempt.max(1))).min(max_ms);
                Duration::from_millis(scaled as u64)
            }
            BackoffStrategy::Constant => self.base_delay,
        }
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    /// Start from [`RetryPolicy::api_default`]
    pub fn new() -> Self {
        Self { policy: RetryPolicy::api_default() }
    }

    /// Set the total attempt count (including the first call)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the base delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Set the delay ceiling
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the backoff strategy
    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.policy.backoff = strategy;
        self
    }

    /// Replace the set of retryable failure classes
    pub fn retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.policy.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Replace the set of retryable HTTP statuses
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.policy.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Embed a circuit breaker with the given configuration
    pub fn breaker(mut self, config: BreakerConfig) -> Self {
        self.policy.breaker = Some(config);
        self
    }

    /// Remove the embedded circuit breaker
    pub fn no_breaker(mut self) -> Self {
        self.policy.breaker = None;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<RetryPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

fn transient_kinds() -> HashSet<ErrorKind> {
    HashSet::from([
        ErrorKind::Timeout,
        ErrorKind::Connection,
        ErrorKind::RateLimited,
        ErrorKind::ServerUnavailable,
    ])
}

fn transient_statuses() -> HashSet<u16> {
    HashSet::from([429, 500, 502, 503, 504])
}

/// Drives one logical operation through its retry policy
///
/// The orchestrator owns the policy's circuit breaker (when configured) and
/// the terminal-error reporter, so every failure path converges here:
/// exactly one report per terminal outcome, however it was reached.
pub struct RetryOrchestrator<C: Clock = SystemClock> {
    operation: String,
    policy: RetryPolicy,
    breaker: Option<CircuitBreaker<C>>,
    reporter: Arc<dyn ErrorReporter>,
    context: HashMap<String, String>,
    clock: Arc<C>,
}

impl RetryOrchestrator<SystemClock> {
    /// Create an orchestrator for the named operation
    pub fn new(operation: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        Self::with_clock(operation, policy, SystemClock)
    }
}

impl<C: Clock + Clone> RetryOrchestrator<C> {
    /// Create an orchestrator with a custom clock (useful for testing)
    pub fn with_clock(operation: impl Into<String>, policy: RetryPolicy, clock: C) -> Result<Self> {
        policy.validate()?;
        let operation = operation.into();
        let breaker = match &policy.breaker {
            Some(config) => {
                Some(CircuitBreaker::with_clock(operation.clone(), config.clone(), clock.clone())?)
            }
            None => None,
        };
        Ok(Self {
            operation,
            policy,
            breaker,
            reporter: Arc::new(TracingReporter),
            context: HashMap::new(),
            clock: Arc::new(clock),
        })
    }
}

impl<C: Clock> RetryOrchestrator<C> {
    /// Replace the terminal-error reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Add an attribution tag carried on every terminal report
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Logical operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The embedded circuit breaker, when the policy configured one
    pub fn breaker(&self) -> Option<&CircuitBreaker<C>> {
        self.breaker.as_ref()
    }

    /// Run `op` to a terminal outcome under this policy
    ///
    /// `op` is called with the 1-based attempt number. Returns the first
    /// success, or the terminal error after the policy gives up.
    pub async fn with_retries<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.run(op, None).await
    }

    /// Like [`with_retries`], but abandons the operation when `cancel`
    /// fires between attempts or during a backoff wait
    ///
    /// An attempt already in flight is never interrupted; cancellation takes
    /// effect at the next decision point.
    ///
    /// [`with_retries`]: Self::with_retries
    pub async fn with_retries_cancellable<T, F, Fut>(
        &self,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.run(op, Some(cancel)).await
    }

    async fn run<T, F, Fut>(&self, mut op: F, cancel: Option<&CancellationToken>) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let started = self.clock.now();

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return self.give_up(attempt - 1, started, Error::Cancelled { attempt });
            }

            if let Some(breaker) = &self.breaker {
                if breaker.is_open() {
                    let err = Error::CircuitOpen { service: self.operation.clone() };
                    return self.give_up(attempt - 1, started, err);
                }
            }

            match op(attempt).await {
                Ok(value) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        debug!(
                            operation = %self.operation,
                            attempt,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(provider_err) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }

                    if !self.policy.is_retryable(&provider_err) {
                        let err = Error::NonRetryable { source: provider_err };
                        return self.give_up(attempt, started, err);
                    }

                    if attempt == self.policy.max_attempts {
                        let err = Error::RetryExhausted {
                            attempts: attempt,
                            elapsed: self.clock.now().duration_since(started),
                            source: provider_err,
                        };
                        return self.give_up(attempt, started, err);
                    }

                    // Provider wait hints win over policy backoff, capped so
                    // a hostile header cannot stall the worker.
                    let delay = provider_err
                        .retry_after()
                        .map(|hint| hint.min(self.policy.max_delay))
                        .unwrap_or_else(|| self.policy.delay_for(attempt));

                    warn!(
                        operation = %self.operation,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %provider_err,
                        "attempt failed, retrying"
                    );

                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    let err = Error::Cancelled { attempt: attempt + 1 };
                                    return self.give_up(attempt, started, err);
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }
        }

        // max_attempts >= 1 is enforced by validate(); the loop always
        // returns from its final iteration.
        unreachable!("retry loop exited without a terminal outcome")
    }

    /// Report the terminal error once, then surface it
    fn give_up<T>(&self, attempts: u32, started: std::time::Instant, error: Error) -> Result<T> {
        self.reporter.report(&ErrorReport {
            operation: &self.operation,
            attempts,
            elapsed: self.clock.now().duration_since(started),
            error: error.to_string(),
            context: &self.context,
        });
        Err(error)
    }
}
