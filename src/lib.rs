// Allow complex types where needed for callback and strategy registries
#![allow(clippy::type_complexity)]

pub mod config;
pub mod context;
pub mod error;
pub mod ui;
pub mod upload;

// Re-export the main entry points for convenience
pub use config::{ClientConfig, ConfigError};
pub use context::ResilienceContext;
pub use error::{classify_error, user_friendly_message, ClassifiedError, ErrorKind, Severity};
pub use upload::{UploadController, UploadFile, UploadSession, UploadStatus};

use thiserror::Error;

/// Typed failures raised by the client itself or by its transports
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Upload failed: {message}")]
    Upload { message: String, retryable: bool },

    #[error("Payment failed: {0}")]
    Payment(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Upload cancelled")]
    Cancelled,
}

pub type ClientResult<T> = Result<T, ClientError>;
