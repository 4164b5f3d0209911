/// Error classification for the client resilience layer
///
/// Every failure that crosses a component boundary is turned into a
/// [`ClassifiedError`] here. The classification decides the error kind, its
/// severity and whether automatic retries are allowed, which in turn drives the
/// retry controller, the circuit breaker, the recovery registry and the
/// user-facing message.
use crate::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Message used when nothing at all was thrown (`undefined`, JSON `null`)
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// HTTP statuses that indicate a connectivity or capacity problem rather than a
/// rejected request. Status 0 is what a browser reports for a blocked request.
pub const NETWORK_STATUSES: [u16; 9] = [0, 408, 429, 502, 503, 504, 522, 523, 524];

const NETWORK_TOKENS: [&str; 10] = [
    "network",
    "connection",
    "timeout",
    "timed out",
    "fetch failed",
    "offline",
    "enotfound",
    "econnrefused",
    "econnreset",
    "etimedout",
];

const AUTH_TOKENS: [&str; 6] = [
    "unauthorized",
    "unauthenticated",
    "token expired",
    "session expired",
    "forbidden",
    "authentication",
];

const VALIDATION_TOKENS: [&str; 4] = ["validation", "invalid", "required", "must be"];

const PAYMENT_TOKENS: [&str; 3] = ["payment", "card declined", "insufficient funds"];

/// Kind of failure, the primary axis of the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connectivity problems, gateway errors, rate limiting, timeouts
    Network,

    /// Input rejected by the client or the backend
    Validation,

    /// Missing, expired or rejected credentials
    Authentication,

    /// File transfer failures
    Upload,

    /// Payment declined or not processed
    Payment,

    /// Backend failure that is not a connectivity problem
    Server,

    /// Request the backend considers malformed or not allowed
    Client,

    /// Anything the classifier could not recognise
    Unknown,
}

impl ErrorKind {
    /// Get human-readable description of the kind
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Connectivity problem that may resolve on retry",
            ErrorKind::Validation => "Input rejected, needs correction",
            ErrorKind::Authentication => "Credentials missing or expired",
            ErrorKind::Upload => "File transfer failed",
            ErrorKind::Payment => "Payment could not be processed",
            ErrorKind::Server => "Backend failure",
            ErrorKind::Client => "Request rejected by the backend",
            ErrorKind::Unknown => "Unrecognised failure",
        }
    }

    /// Severity assigned when the constructor is not told otherwise
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::Validation => Severity::Low,
            ErrorKind::Authentication | ErrorKind::Payment | ErrorKind::Server => Severity::High,
            ErrorKind::Network | ErrorKind::Upload | ErrorKind::Client | ErrorKind::Unknown => {
                Severity::Medium
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "Network"),
            ErrorKind::Validation => write!(f, "Validation"),
            ErrorKind::Authentication => write!(f, "Authentication"),
            ErrorKind::Upload => write!(f, "Upload"),
            ErrorKind::Payment => write!(f, "Payment"),
            ErrorKind::Server => write!(f, "Server"),
            ErrorKind::Client => write!(f, "Client"),
            ErrorKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Severity of a failure, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A failure after classification.
///
/// Values are immutable once built: the builder methods consume `self`, and
/// `retryable` is decided by the kind constructor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    id: String,
    kind: ErrorKind,
    severity: Severity,
    message: String,
    retryable: bool,
    cause: Option<Arc<anyhow::Error>>,
    context: HashMap<String, Value>,
    timestamp: DateTime<Utc>,
    stack_trace: Option<String>,
}

impl ClassifiedError {
    fn build(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            retryable,
            cause: None,
            context: HashMap::new(),
            timestamp: Utc::now(),
            stack_trace: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Network, message, true)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Validation, message, false)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Authentication, message, true)
    }

    /// Upload failures carry their own retryability
    pub fn upload(message: impl Into<String>, retryable: bool) -> Self {
        Self::build(ErrorKind::Upload, message, retryable)
    }

    pub fn payment(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Payment, message, false)
    }

    /// Payment failure the gateway reported as safe to retry
    pub fn payment_with_retry(message: impl Into<String>, retryable: bool) -> Self {
        Self::build(ErrorKind::Payment, message, retryable)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Server, message, false)
    }

    /// Server failure the backend reported as safe to retry
    pub fn server_with_retry(message: impl Into<String>, retryable: bool) -> Self {
        Self::build(ErrorKind::Server, message, retryable)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Client, message, false)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Unknown, message, false)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// HTTP status recorded during classification, if any
    pub fn status(&self) -> Option<u16> {
        self.context
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }
}

/// Anything that can reach the classification boundary.
///
/// Error-like values travel as [`anyhow::Error`] so their source chain is kept;
/// everything else that a collaborator may hand back (plain strings, numbers,
/// JSON bodies, `null`) travels as a JSON value.
#[derive(Debug)]
pub enum Failure {
    Error(anyhow::Error),
    Value(Value),
    Undefined,
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Error(err)
    }
}

impl From<ClientError> for Failure {
    fn from(err: ClientError) -> Self {
        Failure::Error(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Failure::Error(anyhow::Error::new(err))
    }
}

impl From<ClassifiedError> for Failure {
    fn from(err: ClassifiedError) -> Self {
        Failure::Error(anyhow::Error::new(err))
    }
}

impl From<Value> for Failure {
    fn from(value: Value) -> Self {
        Failure::Value(value)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::Value(Value::String(message))
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Failure::Value(Value::String(message.to_string()))
    }
}

impl<T: Into<Failure>> From<Option<T>> for Failure {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Failure::Undefined)
    }
}

/// Intermediate verdict before the error value is assembled
#[derive(Debug, Clone, Copy)]
struct Verdict {
    kind: ErrorKind,
    retryable: bool,
    severity: Option<Severity>,
    status: Option<u16>,
}

impl Verdict {
    fn of(kind: ErrorKind) -> Self {
        let retryable = matches!(
            kind,
            ErrorKind::Network | ErrorKind::Authentication | ErrorKind::Upload
        );
        Self {
            kind,
            retryable,
            severity: None,
            status: None,
        }
    }

    fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    fn into_error(self, message: String) -> ClassifiedError {
        // Network and Authentication are always retryable, Validation and Client never
        let retryable = match self.kind {
            ErrorKind::Network | ErrorKind::Authentication => true,
            ErrorKind::Validation | ErrorKind::Client | ErrorKind::Unknown => false,
            ErrorKind::Upload | ErrorKind::Payment | ErrorKind::Server => self.retryable,
        };
        let mut error = ClassifiedError::build(self.kind, message, retryable);
        if let Some(severity) = self.severity {
            error = error.with_severity(severity);
        }
        if let Some(status) = self.status {
            error = error.with_context("status", status);
        }
        error
    }
}

/// Error classifier - maps arbitrary failures onto the taxonomy
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    /// Extra lowercase substrings treated as network indicators
    extra_network_tokens: Vec<String>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat messages containing `token` as network failures
    pub fn with_network_token(mut self, token: impl Into<String>) -> Self {
        self.extra_network_tokens
            .push(token.into().to_ascii_lowercase());
        self
    }

    /// Classify any failure. Never panics and always returns a complete error.
    pub fn classify(&self, failure: impl Into<Failure>) -> ClassifiedError {
        match failure.into() {
            Failure::Undefined => ClassifiedError::unknown(UNKNOWN_ERROR_MESSAGE),
            Failure::Value(value) => self.classify_value(value),
            Failure::Error(err) => self.classify_dynamic(err),
        }
    }

    fn classify_dynamic(&self, err: anyhow::Error) -> ClassifiedError {
        if let Some(classified) = err.downcast_ref::<ClassifiedError>() {
            return classified.clone();
        }

        let message = err.to_string();
        let chain = format!("{:#}", err);

        let verdict = if let Some(client) = err.downcast_ref::<ClientError>() {
            self.classify_client_error(client, &chain)
        } else if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            self.classify_io_error(io_err)
                .unwrap_or_else(|| self.classify_message(&chain))
        } else {
            self.classify_message(&chain)
        };

        let stack_trace = format!("{:?}", err);
        verdict
            .into_error(message)
            .with_stack_trace(stack_trace)
            .with_cause(err)
    }

    fn classify_client_error(&self, error: &ClientError, chain: &str) -> Verdict {
        match error {
            ClientError::Network(_) | ClientError::Timeout(_) => Verdict::of(ErrorKind::Network),
            ClientError::Http { status, .. } => self.classify_status(*status),
            ClientError::Validation(_) => Verdict::of(ErrorKind::Validation),
            ClientError::Authentication(_) => Verdict::of(ErrorKind::Authentication),
            ClientError::Upload { retryable, .. } => {
                Verdict::of(ErrorKind::Upload).with_retryable(*retryable)
            }
            ClientError::Payment(_) => Verdict::of(ErrorKind::Payment),
            ClientError::Server(_) => Verdict::of(ErrorKind::Server),
            ClientError::Cancelled => Verdict::of(ErrorKind::Upload)
                .with_retryable(false)
                .with_severity(Severity::Low),
            ClientError::Io(io_err) => self
                .classify_io_error(io_err)
                .unwrap_or_else(|| self.classify_message(chain)),
        }
    }

    /// Map I/O error kinds that clearly indicate a dead connection
    fn classify_io_error(&self, io_err: &std::io::Error) -> Option<Verdict> {
        use std::io::ErrorKind as IoKind;

        match io_err.kind() {
            IoKind::ConnectionRefused
            | IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::NotConnected
            | IoKind::AddrNotAvailable
            | IoKind::BrokenPipe
            | IoKind::TimedOut => Some(Verdict::of(ErrorKind::Network)),
            _ => None,
        }
    }

    /// Map an HTTP status onto a kind
    pub fn kind_for_status(&self, status: u16) -> ErrorKind {
        self.classify_status(status).kind
    }

    fn classify_status(&self, status: u16) -> Verdict {
        let kind = if NETWORK_STATUSES.contains(&status) {
            ErrorKind::Network
        } else {
            match status {
                401 | 403 => ErrorKind::Authentication,
                400 | 422 => ErrorKind::Validation,
                402 => ErrorKind::Payment,
                500..=599 => ErrorKind::Server,
                400..=499 => ErrorKind::Client,
                _ => ErrorKind::Unknown,
            }
        };
        Verdict::of(kind).with_status(status)
    }

    fn classify_message(&self, text: &str) -> Verdict {
        let lower = text.to_lowercase();
        let contains_any = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));

        if contains_any(&NETWORK_TOKENS)
            || self
                .extra_network_tokens
                .iter()
                .any(|t| lower.contains(t.as_str()))
        {
            Verdict::of(ErrorKind::Network)
        } else if contains_any(&AUTH_TOKENS) {
            Verdict::of(ErrorKind::Authentication)
        } else if contains_any(&VALIDATION_TOKENS) {
            Verdict::of(ErrorKind::Validation)
        } else if contains_any(&PAYMENT_TOKENS) {
            Verdict::of(ErrorKind::Payment)
        } else if lower.contains("upload") {
            Verdict::of(ErrorKind::Upload)
        } else {
            Verdict::of(ErrorKind::Unknown)
        }
    }

    fn classify_value(&self, value: Value) -> ClassifiedError {
        match value {
            Value::Null => ClassifiedError::unknown(UNKNOWN_ERROR_MESSAGE),
            Value::String(message) => {
                let verdict = self.classify_message(&message);
                verdict.into_error(message)
            }
            Value::Object(map) => {
                let message = ["message", "error", "detail"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(map.clone()).to_string());

                let status = ["status", "statusCode"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_u64))
                    .and_then(|s| u16::try_from(s).ok());

                let validation_shaped = ["errors", "fieldErrors", "field"]
                    .iter()
                    .any(|key| map.contains_key(*key));

                let verdict = match status {
                    Some(status) => self.classify_status(status),
                    None if validation_shaped => Verdict::of(ErrorKind::Validation),
                    None => self.classify_message(&message),
                };
                verdict.into_error(message)
            }
            // Numbers, booleans and arrays carry no reliable signal
            other => ClassifiedError::unknown(other.to_string()),
        }
    }
}

/// Classify with the default classifier
pub fn classify_error(candidate: impl Into<Failure>) -> ClassifiedError {
    ErrorClassifier::new().classify(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retryable_follows_kind() {
        assert!(ClassifiedError::network("x").is_retryable());
        assert!(ClassifiedError::authentication("x").is_retryable());
        assert!(!ClassifiedError::validation("x").is_retryable());
        assert!(!ClassifiedError::payment("x").is_retryable());
        assert!(!ClassifiedError::server("x").is_retryable());
        assert!(!ClassifiedError::client("x").is_retryable());
        assert!(!ClassifiedError::unknown("x").is_retryable());
        assert!(ClassifiedError::upload("x", true).is_retryable());
        assert!(!ClassifiedError::upload("x", false).is_retryable());
        assert!(ClassifiedError::server_with_retry("x", true).is_retryable());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_classify_undefined_and_null() {
        let classified = classify_error(Failure::Undefined);
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.severity(), Severity::Medium);
        assert_eq!(classified.message(), UNKNOWN_ERROR_MESSAGE);

        let classified = classify_error(Value::Null);
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.message(), UNKNOWN_ERROR_MESSAGE);

        let classified = classify_error(None::<String>);
        assert_eq!(classified.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_primitives_are_stringified() {
        let classified = classify_error(json!(42));
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.message(), "42");

        let classified = classify_error(json!(true));
        assert_eq!(classified.message(), "true");
    }

    #[test]
    fn test_classify_network_messages() {
        for message in [
            "Network request failed",
            "fetch failed",
            "getaddrinfo ENOTFOUND api.example.com",
            "connect ECONNREFUSED 127.0.0.1:443",
            "Request timeout after 30s",
        ] {
            let classified = classify_error(anyhow::anyhow!("{}", message));
            assert_eq!(classified.kind(), ErrorKind::Network, "{}", message);
            assert!(classified.is_retryable());
        }
    }

    #[test]
    fn test_classify_network_statuses() {
        for status in NETWORK_STATUSES {
            let classified = classify_error(ClientError::Http {
                status,
                message: "gateway".to_string(),
            });
            assert_eq!(classified.kind(), ErrorKind::Network, "status {}", status);
            assert!(classified.is_retryable());
            assert_eq!(classified.status(), Some(status));
        }
    }

    #[test]
    fn test_classify_status_table() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.kind_for_status(401), ErrorKind::Authentication);
        assert_eq!(classifier.kind_for_status(403), ErrorKind::Authentication);
        assert_eq!(classifier.kind_for_status(400), ErrorKind::Validation);
        assert_eq!(classifier.kind_for_status(422), ErrorKind::Validation);
        assert_eq!(classifier.kind_for_status(402), ErrorKind::Payment);
        assert_eq!(classifier.kind_for_status(500), ErrorKind::Server);
        assert_eq!(classifier.kind_for_status(404), ErrorKind::Client);
        assert_eq!(classifier.kind_for_status(503), ErrorKind::Network);
    }

    #[test]
    fn test_classify_validation_shaped_object() {
        let classified = classify_error(json!({
            "message": "Please fix the form",
            "errors": {"email": "required"}
        }));
        assert_eq!(classified.kind(), ErrorKind::Validation);
        assert!(!classified.is_retryable());
        assert_eq!(classified.message(), "Please fix the form");
    }

    #[test]
    fn test_classify_object_with_status() {
        let classified = classify_error(json!({"statusCode": 502, "error": "Bad Gateway"}));
        assert_eq!(classified.kind(), ErrorKind::Network);
        assert_eq!(classified.message(), "Bad Gateway");
    }

    #[test]
    fn test_classify_typed_client_errors() {
        let classified = classify_error(ClientError::Upload {
            message: "chunk rejected".to_string(),
            retryable: false,
        });
        assert_eq!(classified.kind(), ErrorKind::Upload);
        assert!(!classified.is_retryable());

        let classified = classify_error(ClientError::Cancelled);
        assert_eq!(classified.kind(), ErrorKind::Upload);
        assert_eq!(classified.severity(), Severity::Low);
        assert_eq!(classified.message(), "Upload cancelled");
    }

    #[test]
    fn test_classify_io_errors() {
        let classified = classify_error(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(classified.kind(), ErrorKind::Network);

        let classified = classify_error(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(classified.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_keeps_source_chain() {
        let err = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::Other, "socket"))
            .context("connection dropped while sending");
        let classified = classify_error(err);
        assert_eq!(classified.kind(), ErrorKind::Network);
        assert!(classified.cause().is_some());
        assert!(classified.stack_trace().unwrap().contains("socket"));
    }

    #[test]
    fn test_classify_is_idempotent_for_classified_errors() {
        let original = ClassifiedError::payment("card declined");
        let reclassified = classify_error(original.clone());
        assert_eq!(reclassified.id(), original.id());
        assert_eq!(reclassified.kind(), ErrorKind::Payment);
    }

    #[test]
    fn test_long_message_preserved() {
        let long = "x".repeat(100_000);
        let classified = classify_error(long.clone());
        assert_eq!(classified.message().len(), long.len());
    }

    #[test]
    fn test_extra_network_token() {
        let classifier = ErrorClassifier::new().with_network_token("EAI_AGAIN");
        let classified = classifier.classify("getaddrinfo eai_again host");
        assert_eq!(classified.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = classify_error("boom");
        let b = classify_error("boom");
        assert_ne!(a.id(), b.id());
    }
}
