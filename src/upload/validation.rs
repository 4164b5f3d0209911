use super::file::UploadFile;
use crate::config::{format_megabytes, UploadConfig};
use thiserror::Error;

/// First failed pre-upload check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Only {allowed} files are allowed")]
    UnsupportedType { allowed: String, mime_type: String },

    #[error("File size exceeds the {limit_mb}MB limit")]
    TooLarge { size: u64, limit_mb: String },

    #[error("File is empty")]
    Empty,

    #[error("File must have a name")]
    MissingName,
}

/// Check type, size and name, stopping at the first failure
pub fn validate_file(file: &UploadFile, config: &UploadConfig) -> Result<(), ValidationError> {
    if !config
        .accepted_mime_types
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(&file.mime_type))
    {
        return Err(ValidationError::UnsupportedType {
            allowed: allowed_label(&config.accepted_mime_types),
            mime_type: file.mime_type.clone(),
        });
    }

    let size = file.size();
    if size > config.max_file_size {
        return Err(ValidationError::TooLarge {
            size,
            limit_mb: format_megabytes(config.max_file_size),
        });
    }

    if size < config.min_file_size.max(1) {
        return Err(ValidationError::Empty);
    }

    if file.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }

    Ok(())
}

fn allowed_label(accepted: &[String]) -> String {
    accepted
        .iter()
        .map(|mime| match mime.as_str() {
            "application/pdf" => "PDF".to_string(),
            "text/csv" => "CSV".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" or ")
}
