use crate::error::ErrorCategory;
use crate::{Error, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Custom retryability predicate; overrides status/code matching when present.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Retry configuration
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Initial delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries (pre-jitter)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (> 1)
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomized in either direction (0..=1)
    pub jitter_factor: f64,
    /// HTTP status codes considered retryable
    pub retryable_status_codes: HashSet<u16>,
    /// Transport error codes considered retryable
    pub retryable_error_codes: HashSet<String>,
    /// Custom predicate; when set, wins over status/code matching
    pub should_retry: Option<RetryPredicate>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter_factor", &self.jitter_factor)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("retryable_error_codes", &self.retryable_error_codes)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            retryable_error_codes: ["timeout", "connection_refused", "connection_reset", "dns_failure"]
                .into_iter()
                .map(String::from)
                .collect(),
            should_retry: None,
        }
    }
}

impl RetryConfig {
    /// Config for fast retries (transient network blips)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            jitter_factor: 0.1,
            ..Self::default()
        }
    }

    /// Config for slow retries (downstream outage recovery)
    #[must_use]
    pub fn slow() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            ..Self::default()
        }
    }

    /// Decide whether an error is retryable under this config.
    ///
    /// The custom predicate wins when configured; otherwise an error is
    /// retryable iff it carries a status in `retryable_status_codes` or a
    /// transport code in `retryable_error_codes`. 4xx application errors and
    /// cancellations never match either set.
    pub fn is_retryable(&self, error: &Error) -> bool {
        if let Some(predicate) = &self.should_retry {
            return predicate(error);
        }

        match error.category() {
            ErrorCategory::Permanent | ErrorCategory::CircuitBreaker | ErrorCategory::Aborted => {
                return false;
            }
            ErrorCategory::Transient => {}
        }

        if let Some(status) = error.status_code() {
            return self.retryable_status_codes.contains(&status);
        }
        if let Some(code) = error.code() {
            return self.retryable_error_codes.contains(code);
        }
        // Transient transport errors without a recognized code or status are
        // not retried unless the custom predicate says otherwise.
        false
    }

    /// Exponential backoff delay before jitter: min(max_delay, base * mult^attempt)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponential_ms = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_ms = exponential_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Apply bounded random jitter: delay * (1 + U(-jitter, +jitter)), clamped
    /// to [0, max_delay * (1 + jitter)]. Decorrelates simultaneous retries
    /// from independent callers hitting the same downstream outage.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();
        let deviation = rng.gen_range(-self.jitter_factor..=self.jitter_factor);
        let jittered_ms = (delay.as_millis() as f64 * (1.0 + deviation)).max(0.0);
        let ceiling_ms = self.max_delay.as_millis() as f64 * (1.0 + self.jitter_factor);
        Duration::from_millis(jittered_ms.min(ceiling_ms) as u64)
    }
}

/// Context handed to the action on every attempt and to the retry callbacks
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt index; 0 is the first try
    pub attempt: u32,
    /// Elapsed time since the first attempt started
    pub elapsed: Duration,
    /// Most recent error, if any attempt has failed yet
    pub last_error: Option<Arc<Error>>,
}

/// Payload for the `on_retry` callback, fired before the backoff sleep
pub struct RetryEvent<'a> {
    /// Attempt that just failed (0-based)
    pub attempt: u32,
    /// The error that triggered the retry
    pub error: &'a Error,
    /// Delay that will be slept before the next attempt
    pub next_delay: Duration,
}

/// Payload for the `on_give_up` callback
pub struct GiveUpEvent<'a> {
    /// Total attempts made, including the initial one
    pub total_attempts: u32,
    /// The terminal error, propagated unchanged to the caller
    pub error: &'a Error,
}

type RetryCallback = Box<dyn for<'a> Fn(&RetryEvent<'a>) + Send + Sync>;
type GiveUpCallback = Box<dyn for<'a> Fn(&GiveUpEvent<'a>) + Send + Sync>;

/// Per-call options: observation hooks and cancellation
#[derive(Default)]
pub struct RetryOptions {
    pub on_retry: Option<RetryCallback>,
    pub on_give_up: Option<GiveUpCallback>,
    pub cancel: Option<CancellationToken>,
}

impl RetryOptions {
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn on_retry(mut self, callback: impl for<'a> Fn(&RetryEvent<'a>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_give_up(
        mut self,
        callback: impl for<'a> Fn(&GiveUpEvent<'a>) + Send + Sync + 'static,
    ) -> Self {
        self.on_give_up = Some(Box::new(callback));
        self
    }
}

/// Cumulative statistics for one handler instance.
///
/// Owned exclusively by the handler and mutated only by its own executions;
/// atomic increments keep the counters consistent under concurrent calls.
#[derive(Debug, Default)]
struct RetryCounters {
    total_attempts: AtomicU64,
    successful_attempts: AtomicU64,
    failed_attempts: AtomicU64,
    total_retries: AtomicU64,
}

/// Snapshot of a handler's cumulative retry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RetryStatistics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub total_retries: u64,
}

/// Executes actions under a retry policy with exponential backoff and jitter
pub struct RetryHandler {
    config: RetryConfig,
    counters: RetryCounters,
}

impl RetryHandler {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            counters: RetryCounters::default(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Snapshot of cumulative statistics; never automatically cleared.
    pub fn statistics(&self) -> RetryStatistics {
        RetryStatistics {
            total_attempts: self.counters.total_attempts.load(Ordering::Relaxed),
            successful_attempts: self.counters.successful_attempts.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
            total_retries: self.counters.total_retries.load(Ordering::Relaxed),
        }
    }

    /// Execute `action` under the retry policy.
    ///
    /// Attempt 0 runs immediately. Failed attempts are retried while the
    /// error is retryable and retries remain, sleeping the jittered backoff
    /// delay in between; the sleep is cancellable through the options token.
    /// The terminal error is propagated unchanged.
    pub async fn execute<T, F, Fut>(&self, mut action: F, options: &RetryOptions) -> Result<T>
    where
        F: FnMut(&RetryContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(token) = &options.cancel {
            if token.is_cancelled() {
                // Zero attempts ran, so no execution counter moves; otherwise
                // failed executions could outnumber total attempts.
                debug!("Retry execution aborted before first attempt");
                return Err(Error::Aborted);
            }
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut last_error: Option<Arc<Error>> = None;

        loop {
            let context = RetryContext {
                attempt,
                elapsed: started.elapsed(),
                last_error: last_error.clone(),
            };

            self.counters.total_attempts.fetch_add(1, Ordering::Relaxed);
            match action(&context).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Attempt succeeded after retries");
                    }
                    self.counters
                        .successful_attempts
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(error) => {
                    let retryable = self.config.is_retryable(&error);
                    if !retryable || attempt >= self.config.max_retries {
                        if retryable {
                            warn!(
                                attempt,
                                error = %error,
                                "Retries exhausted, giving up"
                            );
                        } else {
                            debug!(error = %error, "Non-retryable error, giving up");
                        }
                        if let Some(callback) = &options.on_give_up {
                            callback(&GiveUpEvent {
                                total_attempts: attempt + 1,
                                error: &error,
                            });
                        }
                        self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                        return Err(error);
                    }

                    let delay = self.config.apply_jitter(self.config.backoff_delay(attempt));
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, scheduling retry"
                    );
                    if let Some(callback) = &options.on_retry {
                        callback(&RetryEvent {
                            attempt,
                            error: &error,
                            next_delay: delay,
                        });
                    }

                    last_error = Some(Arc::new(error));
                    self.counters.total_retries.fetch_add(1, Ordering::Relaxed);

                    if let Some(token) = &options.cancel {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!("Retry delay cancelled, aborting");
                                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                                return Err(Error::Aborted);
                            }
                            _ = sleep(delay) => {}
                        }
                    } else {
                        sleep(delay).await;
                    }

                    attempt += 1;
                }
            }
        }
    }
}
