/// Client configuration
///
/// Settings are layered: built-in defaults, then an optional TOML/JSON/YAML file,
/// then environment variables such as `UPLOAD_RESILIENCE__UPLOAD__MAX_RETRIES=5`.
use crate::upload::RetryMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "UPLOAD_RESILIENCE";

/// Upper bound accepted for `upload.max_retries`
pub const MAX_CONFIGURABLE_RETRIES: u32 = 10;

const MB: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file in bytes
    pub max_file_size: u64,

    /// Smallest file considered non-empty (a PDF header is 8 bytes)
    pub min_file_size: u64,

    pub accepted_mime_types: Vec<String>,

    /// Automatic retries after the first attempt
    pub max_retries: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Whether a manual retry restarts or continues the attempt counter
    pub retry_mode: RetryMode,
}

impl UploadConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Size limit formatted in megabytes, without a trailing `.0`
    pub fn max_file_size_mb(&self) -> String {
        format_megabytes(self.max_file_size)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * MB,
            min_file_size: 8,
            accepted_mime_types: vec!["application/pdf".to_string()],
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            retry_mode: RetryMode::Restart,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Disable to send every transfer straight to the transport
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Persisted error log cap (at most 50)
    pub max_entries: usize,

    /// Directory of the persisted error log; in-memory when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::error::MAX_LOG_ENTRIES,
            storage_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub upload: UploadConfig,
    pub circuit: CircuitConfig,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load defaults, then `path` (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the upload controller cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let upload = &self.upload;

        if upload.accepted_mime_types.is_empty() {
            return Err(ConfigError::Invalid(
                "upload.accepted_mime_types must not be empty".to_string(),
            ));
        }
        if upload.max_file_size == 0 || upload.min_file_size > upload.max_file_size {
            return Err(ConfigError::Invalid(format!(
                "upload.min_file_size ({}) must not exceed upload.max_file_size ({})",
                upload.min_file_size, upload.max_file_size
            )));
        }
        if upload.max_retries > MAX_CONFIGURABLE_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "upload.max_retries must be at most {}",
                MAX_CONFIGURABLE_RETRIES
            )));
        }
        if upload.base_delay_ms > upload.max_delay_ms {
            return Err(ConfigError::Invalid(
                "upload.base_delay_ms must not exceed upload.max_delay_ms".to_string(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.logging.max_entries == 0 || self.logging.max_entries > crate::error::MAX_LOG_ENTRIES
        {
            return Err(ConfigError::Invalid(format!(
                "logging.max_entries must be between 1 and {}",
                crate::error::MAX_LOG_ENTRIES
            )));
        }

        Ok(())
    }

    /// Configured storage dir, falling back to the platform data dir
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.logging.storage_dir.clone().or_else(default_storage_dir)
    }
}

/// Platform data directory for the persisted error log
pub fn default_storage_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "pdf2csv", "upload-resilience")
        .map(|dirs| dirs.data_dir().join("errors"))
}

/// Format a byte count in MB: `10485760` → `"10"`, `1572864` → `"1.5"`
pub fn format_megabytes(bytes: u64) -> String {
    if bytes % MB == 0 {
        (bytes / MB).to_string()
    } else {
        let formatted = format!("{:.1}", bytes as f64 / MB as f64);
        formatted.trim_end_matches(".0").to_string()
    }
}
