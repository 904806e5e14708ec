use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use recap_core::completion::{Completion, CompletionRequest, CompletionService};
use recap_core::errors::CompletionError;

/// Retry and circuit-breaker knobs for [`ReliableCompletion`].
#[derive(Clone, Debug)]
pub struct ReliableConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before retry `k` is `base_delay * 2^k`.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay to randomize in either direction.
    pub jitter_factor: f64,
    /// Bound on a single attempt; expiry counts as a retryable timeout.
    pub attempt_timeout: Option<Duration>,
    /// Consecutive failed calls before the breaker opens. 0 disables it.
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
            attempt_timeout: Some(Duration::from_secs(60)),
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Circuit {
    Closed,
    Open(Instant),
    /// Cooldown elapsed; the next result decides.
    Probing,
}

struct Breaker {
    circuit: Circuit,
    failures: u32,
}

/// Bounded retries with exponential backoff, plus a circuit breaker that
/// fails fast with `Overloaded` once the backend has failed
/// `circuit_breaker_threshold` calls in a row.
///
/// Fatal errors (guardrail, auth, bad request) return immediately and do not
/// count against the breaker. `retry_after` hints replace the computed delay
/// but are still capped at `max_delay`.
pub struct ReliableCompletion<C: CompletionService> {
    inner: C,
    config: ReliableConfig,
    breaker: Mutex<Breaker>,
    retries: AtomicU64,
}

impl<C: CompletionService> ReliableCompletion<C> {
    pub fn new(inner: C, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            breaker: Mutex::new(Breaker {
                circuit: Circuit::Closed,
                failures: 0,
            }),
            retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: C) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Retries performed over this wrapper's lifetime.
    pub fn total_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn circuit_state_name(&self) -> &'static str {
        match self.breaker.lock().circuit {
            Circuit::Closed => "closed",
            Circuit::Open(_) => "open",
            Circuit::Probing => "half_open",
        }
    }

    fn admit(&self) -> Result<(), CompletionError> {
        let mut breaker = self.breaker.lock();
        if let Circuit::Open(since) = breaker.circuit {
            if since.elapsed() < self.config.circuit_breaker_cooldown {
                return Err(CompletionError::Overloaded);
            }
            breaker.circuit = Circuit::Probing;
        }
        Ok(())
    }

    fn succeeded(&self) {
        let mut breaker = self.breaker.lock();
        breaker.failures = 0;
        if breaker.circuit != Circuit::Closed {
            info!("circuit breaker closed");
            breaker.circuit = Circuit::Closed;
        }
    }

    fn failed(&self) {
        let mut breaker = self.breaker.lock();
        breaker.failures += 1;
        let threshold = self.config.circuit_breaker_threshold;
        let tripped = threshold > 0 && breaker.failures >= threshold;
        if tripped && !matches!(breaker.circuit, Circuit::Open(_)) {
            warn!(
                failures = breaker.failures,
                cooldown_secs = self.config.circuit_breaker_cooldown.as_secs(),
                "circuit breaker opened"
            );
            breaker.circuit = Circuit::Open(Instant::now());
        }
    }

    /// Delay before retry `attempt` (0-based), unless the backend suggested one.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay.min(self.config.max_delay);
        }
        let base = self.config.base_delay.as_millis() as f64;
        let cap = self.config.max_delay.as_millis() as f64;
        let delay = (base * 2f64.powi(attempt.min(31) as i32)).min(cap);

        let spread = delay * self.config.jitter_factor;
        let offset = if spread >= 1.0 {
            let width = spread as u64 * 2 + 1;
            (xorshift() % width) as f64 - spread
        } else {
            0.0
        };
        Duration::from_millis((delay + offset).max(0.0) as u64)
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let call = self.inner.complete(request);
        match self.config.attempt_timeout {
            None => call.await,
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(CompletionError::Timeout(limit)),
            },
        }
    }
}

/// Cheap per-thread PRNG for jitter.
fn xorshift() -> u64 {
    thread_local! {
        static SEED: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E37_79B9_7F4A_7C15)
                | 1,
        );
    }
    SEED.with(|seed| {
        let mut x = seed.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        seed.set(x);
        x
    })
}

#[async_trait]
impl<C: CompletionService> CompletionService for ReliableCompletion<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        self.admit()?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match self.attempt(request).await {
                Ok(completion) => {
                    self.succeeded();
                    return Ok(completion);
                }
                Err(err) => err,
            };

            // The backend answered; a refusal says nothing about its health.
            if err.is_fatal() {
                return Err(err);
            }
            if !err.is_retryable() || attempt + 1 >= max_attempts {
                self.failed();
                return Err(err);
            }

            let delay = self.retry_delay(attempt, err.suggested_delay());
            self.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                error_kind = err.error_kind(),
                "completion failed, retrying"
            );
            tokio::time::sleep(delay).await;
            self.admit()?;
            attempt += 1;
        }
    }
}
