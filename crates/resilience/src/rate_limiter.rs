//! Per-provider sliding-window admission control
//!
//! Before an outbound call is made, the limiter checks the provider's
//! minute and hour request counters (and optionally a minute token budget)
//! held in the shared counter store, and rejects the call if any quota is
//! already consumed. After a call completes, it records quota telemetry
//! from the provider's response headers.
//!
//! Counters are fixed-window on purpose: one atomic increment per window per
//! call against a plain key/value store, at the cost of a theoretical 2x
//! burst at window boundaries. That trade is acceptable at our call volumes
//! and keeps the store interface to read/write/increment.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, LimitKind, Result};
use crate::report::{ErrorReport, ErrorReporter, TracingReporter};
use crate::store::CounterStore;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);
const TELEMETRY_TTL: Duration = Duration::from_secs(3600);

/// Header carrying the provider's remaining-request count
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the provider's remaining-token budget
const REMAINING_TOKENS_HEADER: &str = "x-ratelimit-remaining-tokens";

/// Static per-provider quota configuration
///
/// Loaded once from [`PROVIDER_LIMITS`] at limiter construction and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct ProviderLimits {
    /// Requests allowed per minute window
    pub requests_per_minute: u64,
    /// Requests allowed per hour window
    pub requests_per_hour: u64,
    /// Token budget per minute window, for providers that meter tokens
    pub tokens_per_minute: Option<u64>,
    /// Configured burst tolerance; informational only, not enforced
    pub burst_allowance: u64,
    /// Name of the provider's rate-limit-reset response header
    pub reset_header: &'static str,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        // Conservative fallback for providers without a table entry.
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1_000,
            tokens_per_minute: None,
            burst_allowance: 10,
            reset_header: "x-ratelimit-reset",
        }
    }
}

/// Known provider quota table, keyed by provider identifier
pub static PROVIDER_LIMITS: Lazy<HashMap<&'static str, ProviderLimits>> = Lazy::new(|| {
    HashMap::from([
        (
            "deepgram",
            ProviderLimits {
                requests_per_minute: 100,
                requests_per_hour: 3_000,
                tokens_per_minute: None,
                burst_allowance: 20,
                reset_header: "x-ratelimit-reset",
            },
        ),
        (
            "assemblyai",
            ProviderLimits {
                requests_per_minute: 60,
                requests_per_hour: 1_200,
                tokens_per_minute: None,
                burst_allowance: 10,
                reset_header: "x-ratelimit-reset",
            },
        ),
        (
            "openai",
            ProviderLimits {
                requests_per_minute: 500,
                requests_per_hour: 10_000,
                tokens_per_minute: Some(90_000),
                burst_allowance: 50,
                reset_header: "x-ratelimit-reset-requests",
            },
        ),
        (
            "anthropic",
            ProviderLimits {
                requests_per_minute: 300,
                requests_per_hour: 8_000,
                tokens_per_minute: Some(80_000),
                burst_allowance: 30,
                reset_header: "anthropic-ratelimit-requests-reset",
            },
        ),
    ])
});

impl ProviderLimits {
    /// Look up the quota entry for `provider`, falling back to the
    /// conservative default for unknown providers
    pub fn for_provider(provider: &str) -> Self {
        PROVIDER_LIMITS.get(provider).cloned().unwrap_or_default()
    }
}

/// Transport-agnostic view of a completed provider response
///
/// The HTTP client lives outside this layer; callers hand over just the
/// status code and headers so telemetry extraction does not depend on any
/// particular transport crate. Header names are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    status: u16,
    headers: HashMap<String, String>,
}

impl ResponseMetadata {
    /// Create a view with the given status and no headers
    pub fn new(status: u16) -> Self {
        Self { status, headers: HashMap::new() }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Look up a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Read-only usage snapshot for dashboards and health checks
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Provider identifier
    pub provider: String,
    /// Requests counted in the current minute window
    pub requests_this_minute: u64,
    /// Requests counted in the current hour window
    pub requests_this_hour: u64,
    /// Tokens counted in the current minute window, when metered
    pub tokens_this_minute: Option<u64>,
    /// Configured per-minute request ceiling
    pub requests_per_minute: u64,
    /// Configured per-hour request ceiling
    pub requests_per_hour: u64,
    /// Configured per-minute token ceiling, when metered
    pub tokens_per_minute: Option<u64>,
    /// When the current minute window rolls over
    pub next_minute_reset: DateTime<Utc>,
    /// When the current hour window rolls over
    pub next_hour_reset: DateTime<Utc>,
}

/// Per-provider admission control over shared window counters
///
/// Safe for concurrent use from many tasks and processes: all mutable state
/// lives in the counter store, whose atomic increment-with-TTL carries the
/// quota accounting. The limiter itself holds only immutable configuration.
pub struct RateLimiter<C: Clock = SystemClock> {
    provider: String,
    limits: ProviderLimits,
    store: Arc<dyn CounterStore>,
    clock: Arc<C>,
    reporter: Arc<dyn ErrorReporter>,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter for `provider` using its static quota table entry
    pub fn new(provider: impl Into<String>, store: Arc<dyn CounterStore>) -> Self {
        let provider = provider.into();
        let limits = ProviderLimits::for_provider(&provider);
        Self {
            provider,
            limits,
            store,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
        }
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter with explicit limits and clock (useful for testing)
    pub fn with_clock(
        provider: impl Into<String>,
        limits: ProviderLimits,
        store: Arc<dyn CounterStore>,
        clock: C,
    ) -> Self {
        Self {
            provider: provider.into(),
            limits,
            store,
            clock: Arc::new(clock),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the rejection reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Provider identifier this limiter guards
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Configured limits for this provider
    pub fn limits(&self) -> &ProviderLimits {
        &self.limits
    }

    /// Admission check before an outbound call
    ///
    /// Reads the current minute and hour counters and fails with
    /// [`Error::RateLimitExceeded`] if either is at its ceiling. When a
    /// token estimate is supplied and the provider meters tokens, the
    /// minute token budget is checked as well. A failed check never
    /// consumes quota: counters are incremented only after every check has
    /// passed. Every rejection is reported once through the limiter's
    /// [`ErrorReporter`] with provider and endpoint attribution.
    ///
    /// `endpoint` attributes the call in logs and rejection reports.
    pub async fn check_rate_limit(&self, endpoint: &str, tokens: Option<u64>) -> Result<()> {
        let now = self.wall_clock();
        let minute_key = self.window_key("minute", &minute_bucket(&now));
        let hour_key = self.window_key("hour", &hour_bucket(&now));
        let token_key = self.window_key("tokens", &minute_bucket(&now));

        let minute_count = self.read_count(&minute_key).await?;
        if minute_count >= self.limits.requests_per_minute {
            return Err(self.reject(
                endpoint,
                LimitKind::RequestsPerMinute,
                minute_count,
                self.limits.requests_per_minute,
            ));
        }

        let hour_count = self.read_count(&hour_key).await?;
        if hour_count >= self.limits.requests_per_hour {
            return Err(self.reject(
                endpoint,
                LimitKind::RequestsPerHour,
                hour_count,
                self.limits.requests_per_hour,
            ));
        }

        if let (Some(estimate), Some(budget)) = (tokens, self.limits.tokens_per_minute) {
            let token_count = self.read_count(&token_key).await?;
            if token_count.saturating_add(estimate) > budget {
                return Err(self.reject(
                    endpoint,
                    LimitKind::TokensPerMinute,
                    token_count,
                    budget,
                ));
            }
        }

        // Every check passed: consume quota. Each counter carries its
        // window length as TTL so unused counters self-expire.
        self.store.increment(&minute_key, 1, MINUTE_WINDOW).await?;
        self.store.increment(&hour_key, 1, HOUR_WINDOW).await?;
        if let (Some(estimate), Some(_)) = (tokens, self.limits.tokens_per_minute) {
            self.store.increment(&token_key, estimate, MINUTE_WINDOW).await?;
        }

        debug!(
            provider = %self.provider,
            endpoint,
            minute = minute_count + 1,
            hour = hour_count + 1,
            "rate limit check passed"
        );
        Ok(())
    }

    /// Record quota telemetry from a completed response
    ///
    /// Extracts the provider's reset/remaining/token headers into telemetry
    /// keys (1-hour TTL) and, when the actual token spend is known, adds it
    /// to the minute token counter. Best-effort by contract: this never
    /// fails the primary call path, extraction and store errors are logged
    /// and swallowed.
    pub async fn record_response(&self, response: &ResponseMetadata, tokens_used: Option<u64>) {
        if let Some(reset) = response.header(self.limits.reset_header) {
            self.write_telemetry("reset_at", reset).await;
        }
        if let Some(remaining) = response.header(REMAINING_HEADER) {
            self.write_telemetry("remaining", remaining).await;
        }
        if let Some(tokens_remaining) = response.header(REMAINING_TOKENS_HEADER) {
            self.write_telemetry("tokens_remaining", tokens_remaining).await;
        }

        if let Some(used) = tokens_used {
            let now = self.wall_clock();
            let token_key = self.window_key("tokens", &minute_bucket(&now));
            if let Err(err) = self.store.increment(&token_key, used, MINUTE_WINDOW).await {
                warn!(provider = %self.provider, %err, "failed to record token usage");
            }
        }
    }

    /// Provider-flavored backoff delay, independent of any retry policy
    ///
    /// `min(base * 2^(attempt-1), max)` with symmetric 20% jitter, floored
    /// at zero. Used by callers that want to pre-empt a known provider
    /// reset time rather than rely on the orchestrator's policy backoff.
    pub fn calculate_backoff_delay(&self, attempt: u32, base: Duration, max: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let capped = base
            .as_millis()
            .saturating_mul(1_u128 << exponent)
            .min(max.as_millis()) as f64;

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-0.2..=0.2) * capped;
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    /// Read-only snapshot of current usage vs configured limits
    pub async fn status(&self) -> Result<RateLimitStatus> {
        let now = self.wall_clock();
        let minute_key = self.window_key("minute", &minute_bucket(&now));
        let hour_key = self.window_key("hour", &hour_bucket(&now));
        let token_key = self.window_key("tokens", &minute_bucket(&now));

        let tokens_this_minute = match self.limits.tokens_per_minute {
            Some(_) => Some(self.read_count(&token_key).await?),
            None => None,
        };

        Ok(RateLimitStatus {
            provider: self.provider.clone(),
            requests_this_minute: self.read_count(&minute_key).await?,
            requests_this_hour: self.read_count(&hour_key).await?,
            tokens_this_minute,
            requests_per_minute: self.limits.requests_per_minute,
            requests_per_hour: self.limits.requests_per_hour,
            tokens_per_minute: self.limits.tokens_per_minute,
            next_minute_reset: next_window_reset(&now, 60),
            next_hour_reset: next_window_reset(&now, 3600),
        })
    }

    /// Log and report one admission rejection, then hand back the error
    fn reject(&self, endpoint: &str, kind: LimitKind, current: u64, limit: u64) -> Error {
        let error = Error::RateLimitExceeded { kind, current, limit };
        warn!(
            provider = %self.provider,
            endpoint,
            kind = %kind,
            current,
            limit,
            "rate limit exceeded, call rejected"
        );

        let context = HashMap::from([
            ("provider".to_string(), self.provider.clone()),
            ("endpoint".to_string(), endpoint.to_string()),
            ("limit_kind".to_string(), kind.to_string()),
        ]);
        self.reporter.report(&ErrorReport {
            operation: endpoint,
            attempts: 0,
            elapsed: Duration::ZERO,
            error: error.to_string(),
            context: &context,
        });
        error
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.clock.system_time().into()
    }

    fn window_key(&self, window_kind: &str, bucket: &str) -> String {
        format!("rate_limit:{}:{}:{}", self.provider, window_kind, bucket)
    }

    async fn read_count(&self, key: &str) -> Result<u64> {
        let value = self.store.read(key).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn write_telemetry(&self, metric: &str, value: &str) {
        let key = format!("rate_limit:{}:{}", self.provider, metric);
        if let Err(err) = self.store.write(&key, value, TELEMETRY_TTL).await {
            warn!(provider = %self.provider, metric, %err, "failed to write rate limit telemetry");
        }
    }
}

/// Minute-truncated bucket label, e.g. `202608311405`
fn minute_bucket(now: &DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

/// Hour-truncated bucket label, e.g. `2026083114`
fn hour_bucket(now: &DateTime<Utc>) -> String {
    now.format("%Y%m%d%H").to_string()
}

fn next_window_reset(now: &DateTime<Utc>, window_secs: i64) -> DateTime<Utc> {
    let ts = now.timestamp();
    let next = ts - ts.rem_euclid(window_secs) + window_secs;
    DateTime::from_timestamp(next, 0).unwrap_or(*now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::store::InMemoryCounterStore;

    fn limits(rpm: u64, rph: u64, tpm: Option<u64>) -> ProviderLimits {
        ProviderLimits {
            requests_per_minute: rpm,
            requests_per_hour: rph,
            tokens_per_minute: tpm,
            burst_allowance: 0,
            reset_header: "x-ratelimit-reset",
        }
    }

    fn limiter(
        rpm: u64,
        rph: u64,
        tpm: Option<u64>,
        clock: MockClock,
    ) -> RateLimiter<MockClock> {
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        RateLimiter::with_clock("testprov", limits(rpm, rph, tpm), store, clock)
    }

    /// Tests that calls within the minute quota all pass and the next one
    /// is rejected with the tripped kind.
    #[tokio::test]
    async fn test_minute_quota_enforced() {
        let rl = limiter(5, 1_000, None, MockClock::new());

        for _ in 0..5 {
            rl.check_rate_limit("transcribe", None).await.unwrap();
        }

        let err = rl.check_rate_limit("transcribe", None).await.unwrap_err();
        match err {
            Error::RateLimitExceeded { kind, current, limit } => {
                assert_eq!(kind, LimitKind::RequestsPerMinute);
                assert_eq!(current, 5);
                assert_eq!(limit, 5);
            }
            other => panic!("Expected RateLimitExceeded, got {other:?}"),
        }
    }

    /// Validates idempotent rejection: failed checks consume no quota.
    ///
    /// Assertions:
    /// - Confirms repeated over-quota checks leave counters unchanged.
    #[tokio::test]
    async fn test_rejection_consumes_no_quota() {
        let rl = limiter(3, 1_000, None, MockClock::new());

        for _ in 0..3 {
            rl.check_rate_limit("transcribe", None).await.unwrap();
        }
        for _ in 0..4 {
            assert!(rl.check_rate_limit("transcribe", None).await.is_err());
        }

        let status = rl.status().await.unwrap();
        assert_eq!(status.requests_this_minute, 3);
        assert_eq!(status.requests_this_hour, 3);
    }

    /// Validates that every rejection reaches the rejection reporter with
    /// provider attribution, and admissions do not.
    ///
    /// Assertions:
    /// - Confirms an admitted call produces no report.
    /// - Confirms each rejection produces exactly one report carrying
    ///   provider, endpoint and tripped-quota context.
    #[tokio::test]
    async fn test_rejection_is_reported() {
        use parking_lot::Mutex;

        use crate::report::{ErrorReport, ErrorReporter};

        #[derive(Default)]
        struct CapturingReporter {
            reports: Mutex<Vec<(String, std::collections::HashMap<String, String>)>>,
        }

        impl ErrorReporter for CapturingReporter {
            fn report(&self, report: &ErrorReport<'_>) {
                self.reports.lock().push((report.error.clone(), report.context.clone()));
            }
        }

        let reporter = Arc::new(CapturingReporter::default());
        let rl = limiter(1, 1_000, None, MockClock::new())
            .with_reporter(Arc::clone(&reporter) as Arc<dyn ErrorReporter>);

        rl.check_rate_limit("transcribe", None).await.unwrap();
        assert!(reporter.reports.lock().is_empty(), "admission must not report");

        assert!(rl.check_rate_limit("transcribe", None).await.is_err());
        assert!(rl.check_rate_limit("transcribe", None).await.is_err());

        let reports = reporter.reports.lock();
        assert_eq!(reports.len(), 2, "one report per rejection");

        let (error, context) = &reports[0];
        assert!(error.contains("requests_per_minute"));
        assert_eq!(context.get("provider").map(String::as_str), Some("testprov"));
        assert_eq!(context.get("endpoint").map(String::as_str), Some("transcribe"));
        assert_eq!(context.get("limit_kind").map(String::as_str), Some("requests_per_minute"));
    }

    /// Validates the hour quota independently of the minute quota.
    ///
    /// Assertions:
    /// - Confirms the hour ceiling trips even when minute windows roll over.
    #[tokio::test]
    async fn test_hour_quota_enforced() {
        let clock = MockClock::new();
        let rl = limiter(2, 4, None, clock.clone());

        for _ in 0..2 {
            rl.check_rate_limit("transcribe", None).await.unwrap();
        }
        clock.advance_secs(60);
        for _ in 0..2 {
            rl.check_rate_limit("transcribe", None).await.unwrap();
        }
        clock.advance_secs(60);

        let err = rl.check_rate_limit("transcribe", None).await.unwrap_err();
        match err {
            Error::RateLimitExceeded { kind, .. } => {
                assert_eq!(kind, LimitKind::RequestsPerHour);
            }
            other => panic!("Expected RateLimitExceeded, got {other:?}"),
        }
    }

    /// Validates the token budget check and its no-partial-increment rule.
    ///
    /// Assertions:
    /// - Confirms an over-budget token estimate is rejected.
    /// - Confirms the rejection increments neither request nor token
    ///   counters.
    #[tokio::test]
    async fn test_token_budget() {
        let rl = limiter(100, 1_000, Some(1_000), MockClock::new());

        rl.check_rate_limit("analyze", Some(600)).await.unwrap();

        let err = rl.check_rate_limit("analyze", Some(500)).await.unwrap_err();
        match err {
            Error::RateLimitExceeded { kind, current, limit } => {
                assert_eq!(kind, LimitKind::TokensPerMinute);
                assert_eq!(current, 600);
                assert_eq!(limit, 1_000);
            }
            other => panic!("Expected RateLimitExceeded, got {other:?}"),
        }

        let status = rl.status().await.unwrap();
        assert_eq!(status.requests_this_minute, 1, "failed token check must not count a request");
        assert_eq!(status.tokens_this_minute, Some(600));

        // A fitting estimate still passes.
        rl.check_rate_limit("analyze", Some(400)).await.unwrap();
    }

    /// Validates that counters roll over at the minute boundary.
    ///
    /// Assertions:
    /// - Confirms a fresh minute window admits calls again.
    #[tokio::test]
    async fn test_minute_window_rollover() {
        let clock = MockClock::new();
        let rl = limiter(1, 1_000, None, clock.clone());

        rl.check_rate_limit("transcribe", None).await.unwrap();
        assert!(rl.check_rate_limit("transcribe", None).await.is_err());

        clock.advance_secs(60);
        rl.check_rate_limit("transcribe", None).await.unwrap();
    }

    /// Validates `record_response` telemetry extraction and token
    /// accounting.
    ///
    /// Assertions:
    /// - Confirms reset/remaining headers land in telemetry keys.
    /// - Confirms actual token spend is added to the minute counter.
    #[tokio::test]
    async fn test_record_response() {
        let clock = MockClock::new();
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let rl = RateLimiter::with_clock(
            "testprov",
            limits(100, 1_000, Some(10_000)),
            Arc::clone(&store) as Arc<dyn CounterStore>,
            clock,
        );

        let response = ResponseMetadata::new(200)
            .with_header("X-RateLimit-Reset", "1756640700")
            .with_header("X-RateLimit-Remaining", "87");
        rl.record_response(&response, Some(1_250)).await;

        assert_eq!(
            store.read("rate_limit:testprov:reset_at").await.unwrap(),
            Some("1756640700".to_string())
        );
        assert_eq!(
            store.read("rate_limit:testprov:remaining").await.unwrap(),
            Some("87".to_string())
        );

        let status = rl.status().await.unwrap();
        assert_eq!(status.tokens_this_minute, Some(1_250));
    }

    /// Validates that `record_response` swallows missing headers.
    ///
    /// Assertions:
    /// - Ensures a header-free response records nothing and does not panic.
    #[tokio::test]
    async fn test_record_response_best_effort() {
        let rl = limiter(100, 1_000, None, MockClock::new());
        rl.record_response(&ResponseMetadata::new(500), None).await;

        let status = rl.status().await.unwrap();
        assert_eq!(status.requests_this_minute, 0);
    }

    /// Validates backoff delay growth and its jitter bound.
    ///
    /// Assertions:
    /// - Confirms each delay stays within +-20% of the capped exponential.
    /// - Confirms the delay never exceeds `max * 1.2`.
    #[test]
    fn test_calculate_backoff_delay_bounds() {
        let rl = limiter(10, 100, None, MockClock::new());
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(8);

        for attempt in 1..=6 {
            let expected = (base.as_millis() << (attempt - 1)).min(max.as_millis()) as f64;
            let delay = rl.calculate_backoff_delay(attempt as u32, base, max).as_millis() as f64;
            assert!(delay >= expected * 0.8 - 1.0, "attempt {attempt}: {delay} too small");
            assert!(delay <= expected * 1.2 + 1.0, "attempt {attempt}: {delay} too large");
            assert!(delay <= max.as_millis() as f64 * 1.2 + 1.0);
        }
    }

    /// Validates the status snapshot's reset instants.
    ///
    /// Assertions:
    /// - Confirms minute and hour resets land on the next window
    ///   boundaries.
    #[tokio::test]
    async fn test_status_reset_instants() {
        let clock = MockClock::new();
        clock.set_elapsed(Duration::from_secs(90)); // 00:01:30 epoch time
        let rl = limiter(10, 100, None, clock);

        let status = rl.status().await.unwrap();
        assert_eq!(status.next_minute_reset.timestamp(), 120);
        assert_eq!(status.next_hour_reset.timestamp(), 3600);
    }

    /// Validates the status snapshot's JSON rendering for dashboards.
    ///
    /// Assertions:
    /// - Confirms counters, limits and the tripped quota name serialize
    ///   under their field names.
    #[tokio::test]
    async fn test_status_serializes_to_json() {
        let rl = limiter(10, 100, None, MockClock::new());
        rl.check_rate_limit("transcribe", None).await.unwrap();

        let status = rl.status().await.unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["provider"], "testprov");
        assert_eq!(json["requests_this_minute"], 1);
        assert_eq!(json["requests_per_minute"], 10);
        assert!(json["tokens_this_minute"].is_null());

        assert_eq!(
            serde_json::to_value(LimitKind::TokensPerMinute).unwrap(),
            serde_json::Value::String("tokens_per_minute".to_string())
        );
    }

    /// Validates the static provider table lookup and fallback.
    ///
    /// Assertions:
    /// - Confirms a known provider resolves its table entry.
    /// - Confirms unknown providers get the conservative default.
    #[test]
    fn test_provider_table_lookup() {
        let openai = ProviderLimits::for_provider("openai");
        assert_eq!(openai.requests_per_minute, 500);
        assert_eq!(openai.tokens_per_minute, Some(90_000));

        let unknown = ProviderLimits::for_provider("nobody");
        assert_eq!(unknown.requests_per_minute, 60);
        assert_eq!(unknown.tokens_per_minute, None);
    }

    /// Validates case-insensitive header lookup on `ResponseMetadata`.
    ///
    /// Assertions:
    /// - Confirms mixed-case lookups resolve the same header.
    #[test]
    fn test_response_metadata_headers() {
        let response = ResponseMetadata::new(200).with_header("X-RateLimit-Remaining", "12");
        assert_eq!(response.header("x-ratelimit-remaining"), Some("12"));
        assert_eq!(response.header("X-RATELIMIT-REMAINING"), Some("12"));
        assert_eq!(response.header("missing"), None);
        assert_eq!(response.status(), 200);
    }
}
