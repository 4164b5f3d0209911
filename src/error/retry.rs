/// Retry with exponential backoff
///
/// Runs an async operation until it succeeds or the strategy gives up, waiting
/// `min(base * multiplier^(k-1), cap)` before the k-th retry. Attempts are strictly
/// sequential and the final error is always returned in classified form.
use super::classification::{ClassifiedError, ErrorClassifier, Failure};
use std::future::Future;
use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default number of retries after the initial attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default growth factor between consecutive delays
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Delay before retry number `retry` (1-based): `min(base * multiplier^(retry-1), cap)`
pub fn backoff_delay(base: Duration, cap: Duration, multiplier: f64, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay_ms = base.as_millis() as f64 * multiplier.powi(exponent);
    let capped_ms = delay_ms.min(cap.as_millis() as f64).max(0.0);
    Duration::from_millis(capped_ms as u64)
}

/// Retry strategy trait
pub trait RetryStrategy: Send + Sync {
    /// Whether another attempt should follow `retries_done` failed retries
    fn should_retry(&self, retries_done: u32, error: &ClassifiedError) -> bool;

    /// Delay before retry number `retry` (1-based)
    fn next_delay(&self, retry: u32) -> Duration;

    /// Maximum number of retries after the initial attempt
    fn max_retries(&self) -> u32;
}

/// Exponential backoff retry strategy with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (default: 1s)
    base_delay: Duration,

    /// Maximum delay cap (default: 30s)
    max_delay: Duration,

    /// Maximum retries after the initial attempt
    max_retries: u32,

    /// Growth factor (default: 2)
    multiplier: f64,

    /// Jitter factor (0.0 - 1.0), off by default so delays follow the formula exactly
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_factor: 0.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Spread delays by ± `jitter_factor` of their value
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// 3 retries, 1s base, 30s cap
    pub fn standard() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES)
    }

    fn calculate_delay(&self, retry: u32) -> Duration {
        let capped = backoff_delay(self.base_delay, self.max_delay, self.multiplier, retry);
        if self.jitter_factor == 0.0 {
            return capped;
        }

        let capped_ms = capped.as_millis() as f64;
        let jitter_range = capped_ms * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        Duration::from_millis((capped_ms + jitter).max(0.0) as u64)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn should_retry(&self, retries_done: u32, _error: &ClassifiedError) -> bool {
        retries_done < self.max_retries
    }

    fn next_delay(&self, retry: u32) -> Duration {
        self.calculate_delay(retry)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Never retry
#[derive(Debug, Clone, Copy)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn should_retry(&self, _retries_done: u32, _error: &ClassifiedError) -> bool {
        false
    }

    fn next_delay(&self, _retry: u32) -> Duration {
        Duration::from_secs(0)
    }

    fn max_retries(&self) -> u32 {
        0
    }
}

/// Wraps a strategy so non-retryable errors stop immediately
#[derive(Debug, Clone)]
pub struct RetryableOnly<S>(pub S);

impl<S: RetryStrategy> RetryStrategy for RetryableOnly<S> {
    fn should_retry(&self, retries_done: u32, error: &ClassifiedError) -> bool {
        error.is_retryable() && self.0.should_retry(retries_done, error)
    }

    fn next_delay(&self, retry: u32) -> Duration {
        self.0.next_delay(retry)
    }

    fn max_retries(&self) -> u32 {
        self.0.max_retries()
    }
}

/// Drives an operation through a retry strategy
pub struct RetryController<S> {
    strategy: S,
    classifier: ErrorClassifier,
}

impl<S: RetryStrategy> RetryController<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Run `operation` until it succeeds or the strategy stops retrying
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let mut retries_done = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if retries_done > 0 {
                        tracing::info!(attempt = retries_done + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let classified = self.classifier.classify(error);

                    if !self.strategy.should_retry(retries_done, &classified) {
                        tracing::warn!(
                            attempts = retries_done + 1,
                            kind = %classified.kind(),
                            error = %classified,
                            "Giving up after final attempt"
                        );
                        return Err(classified);
                    }

                    retries_done += 1;
                    let delay = self.strategy.next_delay(retries_done);
                    tracing::info!(
                        retry = retries_done,
                        max_retries = self.strategy.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        kind = %classified.kind(),
                        "Retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Retry `operation` up to `max_retries` times with exponential backoff from `base_delay`
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Failure>,
{
    RetryController::new(ExponentialBackoff::new(
        base_delay,
        DEFAULT_MAX_DELAY,
        max_retries,
    ))
    .run(operation)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classification::ErrorKind;
    use crate::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 5);

        assert_eq!(backoff.next_delay(1).as_millis(), 100);
        assert_eq!(backoff.next_delay(2).as_millis(), 200);
        assert_eq!(backoff.next_delay(3).as_millis(), 400);
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 10);

        // Should cap at max_delay (1000ms)
        assert_eq!(backoff.next_delay(10).as_millis(), 1000);
        assert_eq!(backoff.next_delay(u32::MAX).as_millis(), 1000);
    }

    #[test]
    fn test_exponential_backoff_jitter() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 5)
                .with_jitter(0.5);

        let delays: Vec<_> = (0..10).map(|_| backoff.next_delay(2).as_millis()).collect();
        assert!(delays.iter().all(|d| (100..=300).contains(d)));
        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "Jitter should produce varied delays");
    }

    #[test]
    fn test_custom_multiplier() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 5)
            .with_multiplier(3.0);
        assert_eq!(backoff.next_delay(3).as_millis(), 900);
    }

    #[test]
    fn test_retryable_only_stops_on_validation() {
        let strategy = RetryableOnly(ExponentialBackoff::standard());
        assert!(!strategy.should_retry(0, &ClassifiedError::validation("bad")));
        assert!(strategy.should_retry(0, &ClassifiedError::network("down")));
        assert!(!strategy.should_retry(3, &ClassifiedError::network("down")));
    }

    #[test]
    fn test_no_retry_strategy() {
        let strategy = NoRetry;
        assert!(!strategy.should_retry(0, &ClassifiedError::network("down")));
        assert_eq!(strategy.max_retries(), 0);
        assert_eq!(strategy.next_delay(1), Duration::from_secs(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = retry_with_backoff(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClientError::Validation("still broken".to_string()))
                }
            },
            3,
            Duration::from_millis(10),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "Validation failed: still broken");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_kth_attempt_stops() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 {
                        Err(anyhow::anyhow!("network down"))
                    } else {
                        Ok(n)
                    }
                }
            },
            5,
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff(
            || async { Err::<(), _>("fetch failed") },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert!(result.is_err());
        // 100 + 200 + 400
        assert!(start.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let _ = retry_with_backoff(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("boom")
                }
            },
            0,
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_with_retryable_only() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let controller = RetryController::new(RetryableOnly(ExponentialBackoff::standard()));

        let result: Result<(), _> = controller
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClientError::Payment("declined".to_string()))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Payment);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
