use super::file::UploadFile;
use super::transfer::UploadResponse;
use crate::error::ClassifiedError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Idle,
    Validating,
    Uploading,
    /// Waiting out a backoff delay before the next attempt
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl UploadStatus {
    /// True while a transfer or a backoff wait is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            UploadStatus::Validating | UploadStatus::Uploading | UploadStatus::Retrying
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Succeeded | UploadStatus::Failed | UploadStatus::Cancelled
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Validating => "validating",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Retrying => "retrying",
            UploadStatus::Succeeded => "succeeded",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// How a manual retry treats the attempt counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Start over with a fresh retry budget
    #[default]
    Restart,
    /// Keep the attempt counter and its backoff progression
    Continue,
}

/// Snapshot of the observable upload state
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub file: Option<UploadFile>,
    pub validation_errors: Vec<String>,
    pub status: UploadStatus,
    /// 0..=100, never decreases within an attempt
    pub progress_percent: u8,
    /// Number of retries performed so far
    pub attempt: u32,
    pub last_error: Option<ClassifiedError>,
    pub response: Option<UploadResponse>,
}

impl UploadSession {
    pub fn is_uploading(&self) -> bool {
        self.status.is_active()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.message())
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self {
            file: None,
            validation_errors: Vec::new(),
            status: UploadStatus::Idle,
            progress_percent: 0,
            attempt: 0,
            last_error: None,
            response: None,
        }
    }
}
