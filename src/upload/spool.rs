use super::file::UploadFile;
use super::transfer::{ProgressSink, Transfer, TransferResponse, UploadResponse};
use crate::ClientError;
use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Transport that "uploads" into a local spool directory.
///
/// Used by the CLI and the tests. Failures can be injected with
/// [`SpoolTransfer::with_injected_failures`].
pub struct SpoolTransfer {
    dir: PathBuf,
    chunk_size: usize,
    failures_left: AtomicU32,
}

impl SpoolTransfer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail the next `count` transfers with a connection reset
    pub fn with_injected_failures(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    async fn spool(&self, file: &UploadFile, progress: ProgressSink) -> anyhow::Result<TransferResponse> {
        if self.take_injected_failure() {
            return Err(ClientError::Network("connection reset by peer".to_string()).into());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create spool dir {}", self.dir.display()))?;

        let order_id = uuid::Uuid::new_v4().to_string();
        let target = self.dir.join(format!("{}-{}", order_id, sanitize(&file.name)));
        let mut out = tokio::fs::File::create(&target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;

        let total = file.size();
        let mut sent = 0u64;
        for chunk in file.data.chunks(self.chunk_size) {
            out.write_all(chunk).await?;
            sent += chunk.len() as u64;
            progress.report_bytes(sent, total);
            tokio::task::yield_now().await;
        }
        out.flush().await?;

        tracing::debug!(order_id = %order_id, path = %target.display(), bytes = sent, "Spooled upload");

        Ok(TransferResponse::accepted(UploadResponse {
            order_id,
            status: "pending".to_string(),
            filename: file.name.clone(),
            file_size: total,
            progress: 100.0,
        }))
    }
}

impl Transfer for SpoolTransfer {
    fn transfer<'a>(
        &'a self,
        file: &'a UploadFile,
        progress: ProgressSink,
    ) -> BoxFuture<'a, anyhow::Result<TransferResponse>> {
        self.spool(file, progress).boxed()
    }
}

/// Keep a file name safe to use as a path component
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned.to_string()
    }
}
