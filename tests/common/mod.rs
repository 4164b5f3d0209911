//! Common test utilities and mock infrastructure
//!
//! This module provides shared functionality for integration tests including:
//! - Scripted transports with per-call outcomes
//! - Callback recorders
//! - File fixtures
#![allow(dead_code)]

pub mod mock_transfer;
pub mod recorder;

use upload_resilience::upload::UploadFile;

/// A PDF-typed file of `size` bytes
pub fn pdf(name: &str, size: usize) -> UploadFile {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.resize(size, b'0');
    UploadFile::new(name, "application/pdf", data)
}
