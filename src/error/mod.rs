/// Error recovery system for the upload client
///
/// This module provides the client-side resilience framework:
/// - Error classification into a typed taxonomy
/// - User-safe messages per error kind
/// - Bounded, persisted error log
/// - Pluggable recovery strategies
/// - Retry with exponential backoff
/// - Circuit breaker pattern
///
/// # Architecture
///
/// ```text
/// ┌─────────────────────────────────────────┐
/// │   UploadController / any async caller   │
/// └────────────────┬────────────────────────┘
///                  │
///      ┌───────────┴───────────┬──────────────────┐
///      ↓                       ↓                  ↓
/// ┌──────────────┐     ┌───────────────┐  ┌───────────────┐
/// │ Retry +      │     │ Classification│  │   Recovery    │
/// │ CircuitBreaker│    │ + UserMessage │  │   Registry    │
/// └──────────────┘     └───────┬───────┘  └───────────────┘
///                              ↓
///                      ┌───────────────┐
///                      │  ErrorLogger  │
///                      │ (KeyValueStore)│
///                      └───────────────┘
/// ```
///
/// # Usage Example
///
/// ```rust,ignore
/// use upload_resilience::error::{retry_with_backoff, user_friendly_message, CircuitBreaker};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
/// let orders = retry_with_backoff(
///     || breaker.execute(|| api.fetch_orders()),
///     3,
///     Duration::from_millis(1000),
/// )
/// .await;
///
/// if let Err(error) = orders {
///     logger.log_error(&error, "orders");
///     show_toast(&user_friendly_message(&error));
/// }
/// ```

pub mod circuit_breaker;
pub mod classification;
pub mod logger;
pub mod recovery;
pub mod retry;
pub mod storage;
pub mod user_message;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use classification::{classify_error, ClassifiedError, ErrorClassifier, ErrorKind, Failure, Severity};
pub use logger::{generate_error_id, ErrorLogEntry, ErrorLogger, MAX_LOG_ENTRIES};
pub use recovery::{
    FnStrategy, ManualActionRequired, NoopHooks, RecoveryHooks, RecoveryStrategy,
    RecoveryStrategyRegistry,
};
pub use retry::{
    backoff_delay, retry_with_backoff, ExponentialBackoff, NoRetry, RetryController,
    RetryStrategy, RetryableOnly,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use user_message::{user_friendly_message, NetworkCondition};
