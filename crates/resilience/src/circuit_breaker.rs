//! Per-service circuit breaker
//!
//! A failure accumulator with a three-state machine (closed / open /
//! half-open) wrapping one logical service dependency. State transitions are
//! lazy: nothing runs on a timer, the open-to-half-open transition happens
//! as a side effect of the next inspection after the recovery timeout
//! elapses.
//!
//! State is process-local. Each service replica trips its own breaker
//! independently and acts as its own bulkhead; cross-process burst
//! protection is the rate limiter's job. The breaker does not distinguish
//! failure causes: every recorded failure counts, including ones the retry
//! orchestrator later classifies as non-retryable, so a single breaker
//! protects the dependency end-to-end.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Error;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Failures accumulate; calls pass through
    Closed,
    /// Calls are blocked until the recovery timeout elapses
    Open,
    /// One probe call is allowed through to test recovery
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout: Duration::from_secs(60) }
    }
}

impl BreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfiguration {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }
        if self.recovery_timeout.is_zero() {
            return Err(Error::InvalidConfiguration {
                message: "recovery_timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`BreakerConfig`]
#[derive(Debug)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self { config: BreakerConfig::default() }
    }

    /// Set the consecutive-failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the open-state recovery timeout
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<BreakerConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Read-only snapshot of breaker state for monitoring
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: BreakerState,
    /// Consecutive failures recorded since the last success
    pub failure_count: u32,
    /// Time since the most recent recorded failure, if any
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_claimed_at: Option<Instant>,
}

/// Circuit breaker for one named service dependency
///
/// All state lives behind a single mutex so the half-open probe can be
/// claimed atomically: when the recovery timeout elapses, exactly one
/// inspecting caller is let through as the probe and concurrent inspectors
/// keep seeing the circuit as open until that probe resolves. A claim that
/// is never resolved (the claiming caller was dropped mid-flight, e.g. by a
/// deadline around the whole call) goes stale after another recovery
/// timeout and the next inspection takes over as the probe.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    service: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<C>,
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker for `service` using the system clock
    pub fn new(service: impl Into<String>, config: BreakerConfig) -> Result<Self, Error> {
        Self::with_clock(service, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        service: impl Into<String>,
        config: BreakerConfig,
        clock: C,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            service: service.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_claimed_at: None,
            }),
            clock: Arc::new(clock),
        })
    }

    /// Name of the protected service
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether calls are currently blocked
    ///
    /// Evaluated lazily: if the recovery timeout has elapsed while open,
    /// this inspection transitions the breaker to half-open and returns
    /// `false` for the claiming caller only. Other callers continue to see
    /// `true` until the probe resolves via [`record_success`] or
    /// [`record_failure`] — or until the claim itself ages past the
    /// recovery timeout, at which point it is treated as abandoned and the
    /// next inspection claims a fresh probe.
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let recovered = inner
                    .last_failure
                    .is_some_and(|at| now.duration_since(at) >= self.config.recovery_timeout);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_claimed_at = Some(now);
                    info!(service = %self.service, "circuit breaker half-open, probe allowed");
                    false
                } else {
                    true
                }
            }
            BreakerState::HalfOpen => {
                let probe_live = inner
                    .probe_claimed_at
                    .is_some_and(|at| now.duration_since(at) < self.config.recovery_timeout);
                if probe_live {
                    // A probe is in flight; treat as still open.
                    true
                } else {
                    if inner.probe_claimed_at.is_some() {
                        warn!(
                            service = %self.service,
                            "circuit breaker probe abandoned, allowing a new probe"
                        );
                    }
                    inner.probe_claimed_at = Some(now);
                    false
                }
            }
        }
    }

    /// Record a successful call
    ///
    /// Resets the failure count and closes the circuit from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!(service = %self.service, from = %inner.state, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.probe_claimed_at = None;
    }

    /// Record a failed call
    ///
    /// Increments the failure count and stamps the failure time. Opens the
    /// circuit at the threshold, or immediately when a half-open probe
    /// fails.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(self.clock.now());

        match inner.state {
            BreakerState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    warn!(
                        service = %self.service,
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                } else {
                    debug!(
                        service = %self.service,
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "circuit breaker failure recorded"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.probe_claimed_at = None;
                warn!(service = %self.service, "circuit breaker re-opened after failed probe");
            }
            BreakerState::Open => {}
        }
    }

    /// Current state without side effects
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Snapshot for dashboards and health checks
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|at| self.clock.now().duration_since(at)),
        }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}
