/// Bounded, persisted error log
///
/// Every classified error handed to [`ErrorLogger::log_error`] is emitted as a
/// `tracing` event on a severity-appropriate level and appended to a JSON log
/// kept in a [`KeyValueStore`]. The log holds at most `max_entries` records and
/// evicts the oldest first. Persistence problems never reach the caller.
use super::classification::{ClassifiedError, ErrorKind, Severity};
use super::storage::{KeyValueStore, MemoryStore, StorageError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Hard cap on persisted entries
pub const MAX_LOG_ENTRIES: usize = 50;

/// Storage key of the persisted log
pub const ERROR_LOG_KEY: &str = "upload_resilience.error_log";

const ID_PREFIX: &str = "err";
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Persisted projection of a classified error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    /// Log record id (`err-<millis>-<suffix>`)
    pub error_id: String,

    /// Id of the classified error
    pub id: String,

    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Caller-supplied label (e.g. "upload", "checkout")
    pub context: String,

    #[serde(default)]
    pub additional_context: HashMap<String, Value>,
}

impl ErrorLogEntry {
    fn project(
        error_id: String,
        error: &ClassifiedError,
        context: &str,
        additional_context: HashMap<String, Value>,
    ) -> Self {
        let mut merged = error.context().clone();
        merged.extend(additional_context);

        Self {
            error_id,
            id: error.id().to_string(),
            kind: error.kind(),
            severity: error.severity(),
            message: error.message().to_string(),
            retryable: error.is_retryable(),
            timestamp: error.timestamp(),
            stack_trace: error.stack_trace().map(str::to_string),
            context: context.to_string(),
            additional_context: merged,
        }
    }
}

/// Generate a log record id: lowercase prefix, unix millis, base36 suffix.
///
/// The suffix starts with a process-wide sequence number so ids stay unique
/// even when many are generated within the same millisecond.
pub fn generate_error_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut rng = rand::thread_rng();
    let random: String = (0..5)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();

    format!("{}-{}-{}{}", ID_PREFIX, millis, to_base36(sequence), random)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ID_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Error logger with bounded persisted history
pub struct ErrorLogger {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_entries: usize,

    /// Serializes the read-modify-write of the persisted log
    write_lock: Mutex<()>,
}

impl ErrorLogger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: ERROR_LOG_KEY.to_string(),
            max_entries: MAX_LOG_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    /// Logger backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Lower the entry cap (clamped to `1..=MAX_LOG_ENTRIES`)
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.clamp(1, MAX_LOG_ENTRIES);
        self
    }

    /// Use a different storage key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Log a classified error, returning the generated record id
    pub fn log_error(&self, error: &ClassifiedError, context: &str) -> String {
        self.log_error_with(error, context, HashMap::new())
    }

    /// Log a classified error with extra structured context
    pub fn log_error_with(
        &self,
        error: &ClassifiedError,
        context: &str,
        additional_context: HashMap<String, Value>,
    ) -> String {
        let error_id = generate_error_id();
        self.emit(&error_id, error, context);

        let entry = ErrorLogEntry::project(error_id.clone(), error, context, additional_context);
        if let Err(e) = self.append(entry) {
            tracing::warn!(
                error_id = %error_id,
                key = %self.key,
                error = %e,
                "Failed to persist error log entry"
            );
        }

        error_id
    }

    fn emit(&self, error_id: &str, error: &ClassifiedError, context: &str) {
        match error.severity() {
            Severity::Critical | Severity::High => tracing::error!(
                error_id = %error_id,
                kind = %error.kind(),
                severity = %error.severity(),
                retryable = error.is_retryable(),
                context = %context,
                stack_trace = ?error.stack_trace(),
                "{}",
                error.message()
            ),
            Severity::Medium => tracing::warn!(
                error_id = %error_id,
                kind = %error.kind(),
                severity = %error.severity(),
                retryable = error.is_retryable(),
                context = %context,
                "{}",
                error.message()
            ),
            Severity::Low => tracing::info!(
                error_id = %error_id,
                kind = %error.kind(),
                severity = %error.severity(),
                context = %context,
                "{}",
                error.message()
            ),
        }
    }

    fn append(&self, entry: ErrorLogEntry) -> Result<(), LogPersistError> {
        // The lock guards no data, so a poisoned one is still usable
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(LogPersistError::Corrupt(e)) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding unreadable error log");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        // Evict before appending so the log never exceeds the cap
        while entries.len() >= self.max_entries {
            entries.remove(0);
        }
        entries.push(entry);

        let serialized = serde_json::to_string(&entries)?;
        self.store.set_item(&self.key, &serialized)?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<ErrorLogEntry>, LogPersistError> {
        match self.store.get_item(&self.key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Persisted entries, oldest first. Unreadable logs yield an empty list.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read error log");
                Vec::new()
            }
        }
    }

    /// Drop the persisted log
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.store.remove_item(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "Failed to clear error log");
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LogPersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("error log is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}
