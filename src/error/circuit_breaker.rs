/// Circuit breaker pattern - stop calling a dependency that keeps failing
///
/// States:
/// - Closed: Normal operation, calls pass through and failures are counted
/// - Open: Threshold reached, calls fail fast until the cooldown has elapsed
/// - HalfOpen: One trial call decides between Closed and Open
use super::classification::{ClassifiedError, ErrorClassifier, Failure};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default failures before opening
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before a trial call
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Too many failures, fail fast
    Open,

    /// Testing if the dependency recovered
    HalfOpen,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,

    /// A HalfOpen trial call is running
    trial_in_flight: bool,
}

/// Circuit breaker guarding one dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Number of failures before opening circuit
    failure_threshold: u32,

    /// Time to wait before allowing a trial call
    cooldown: Duration,

    classifier: ErrorClassifier,

    inner: Mutex<Inner>,
}

/// Outcome of the pre-call state check
enum Admission {
    Closed,
    Trial,
}

/// Held while a HalfOpen trial call runs.
///
/// If the trial future is dropped before an outcome is recorded, the circuit
/// goes back to Open with a fresh cooldown instead of staying HalfOpen.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl TrialGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker opening after `failure_threshold` failures (at least 1)
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            classifier: ErrorClassifier::new(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Execute `operation` under breaker protection
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let mut trial = match self.admit()? {
            Admission::Closed => None,
            Admission::Trial => Some(TrialGuard {
                breaker: self,
                armed: true,
            }),
        };

        let result = operation().await;
        if let Some(guard) = trial.as_mut() {
            guard.disarm();
        }

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                let classified = self.classifier.classify(error);
                self.record_failure(trial.is_some());
                Err(classified)
            }
        }
    }

    fn admit(&self) -> Result<Admission, ClassifiedError> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Closed),
            CircuitState::Open => {
                let opened_at = inner.last_failure_time.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(
                        failures = inner.failure_count,
                        "Circuit breaker transitioning to HalfOpen"
                    );
                    Ok(Admission::Trial)
                } else {
                    Err(Self::open_error(elapsed, self.cooldown - elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    let elapsed = inner
                        .last_failure_time
                        .map(|t| t.elapsed())
                        .unwrap_or_default();
                    Err(Self::open_error(elapsed, Duration::ZERO))
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn open_error(elapsed: Duration, remaining: Duration) -> ClassifiedError {
        // Whole milliseconds keep humantime output short
        let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
        ClassifiedError::network(format!(
            "Circuit breaker is open - failing fast (opened {} ago)",
            humantime::format_duration(elapsed)
        ))
        .with_context("circuit_open", true)
        .with_context("retry_after_ms", remaining.as_millis() as u64)
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure_time = None;
                inner.trial_in_flight = false;
                tracing::info!("Circuit breaker CLOSED after successful trial call");
            }
            CircuitState::Open => {
                // A call admitted while Closed finished after the circuit opened
                tracing::debug!("Success recorded while circuit was OPEN - ignoring");
            }
        }
    }

    fn record_failure(&self, was_trial: bool) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_failure_time = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.failure_count,
                        threshold = self.failure_threshold,
                        "Circuit breaker OPENED"
                    );
                }
            }
            CircuitState::HalfOpen if was_trial => {
                inner.state = CircuitState::Open;
                inner.last_failure_time = Some(Instant::now());
                inner.trial_in_flight = false;
                tracing::warn!("Circuit breaker REOPENED after failed trial call");
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                // Late failure of a call admitted before the circuit opened
            }
        }
    }

    /// Trial call dropped before finishing; treated like a failed trial
    fn abandon_trial(&self) {
        // Runs from Drop, so a poisoned lock must not panic
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.state = CircuitState::Open;
            inner.last_failure_time = Some(Instant::now());
            inner.trial_in_flight = false;
            tracing::warn!("Circuit breaker REOPENED after trial call was abandoned");
        }
    }

    /// Current state and failure count; never changes the breaker
    pub fn state(&self) -> CircuitSnapshot {
        let inner = self.inner.lock().unwrap();
        CircuitSnapshot {
            state: inner.state,
            failures: inner.failure_count,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state().state == CircuitState::Open
    }

    /// Reset circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.trial_in_flight = false;
        tracing::info!("Circuit breaker manually reset to CLOSED");
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}
