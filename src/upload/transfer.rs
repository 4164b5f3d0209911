/// Transport abstraction for uploads
///
/// A [`Transfer`] sends one file and reports progress through a [`ProgressSink`].
/// Transport failures come back as `Err`; a server that answered but refused the
/// file comes back as `Ok` with `success: false`.
use super::file::UploadFile;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Order created by the server for an accepted upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(alias = "order_id")]
    pub order_id: String,
    pub status: String,
    #[serde(alias = "file_name")]
    pub filename: String,
    #[serde(alias = "file_size")]
    pub file_size: u64,
    #[serde(default)]
    pub progress: f64,
}

/// Envelope returned by a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<UploadResponse>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransferResponse {
    pub fn accepted(data: UploadResponse) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Progress callback handed to a transport
#[derive(Clone)]
pub struct ProgressSink {
    report: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressSink {
    pub fn new(report: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// Sink that drops every report
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Report a percentage, clamped to 100
    pub fn report(&self, percent: u32) {
        (self.report)(percent.min(100) as u8);
    }

    /// Report `sent` of `total` bytes
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.min(total) as f64 / total as f64 * 100.0).round() as u32;
        self.report(percent);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// Sends a file to the server
pub trait Transfer: Send + Sync {
    fn transfer<'a>(
        &'a self,
        file: &'a UploadFile,
        progress: ProgressSink,
    ) -> BoxFuture<'a, anyhow::Result<TransferResponse>>;
}

/// Adapter turning a closure into a [`Transfer`]
pub struct FnTransfer<F> {
    call: F,
}

impl<F> FnTransfer<F>
where
    F: Fn(UploadFile, ProgressSink) -> BoxFuture<'static, anyhow::Result<TransferResponse>>
        + Send
        + Sync,
{
    pub fn new(call: F) -> Self {
        Self { call }
    }
}

impl<F> Transfer for FnTransfer<F>
where
    F: Fn(UploadFile, ProgressSink) -> BoxFuture<'static, anyhow::Result<TransferResponse>>
        + Send
        + Sync,
{
    fn transfer<'a>(
        &'a self,
        file: &'a UploadFile,
        progress: ProgressSink,
    ) -> BoxFuture<'a, anyhow::Result<TransferResponse>> {
        (self.call)(file.clone(), progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;

    #[test]
    fn test_response_accepts_both_casings() {
        let camel: UploadResponse = serde_json::from_str(
            r#"{"orderId":"o-1","status":"pending","filename":"a.pdf","fileSize":1024,"progress":100}"#,
        )
        .unwrap();
        let snake: UploadResponse = serde_json::from_str(
            r#"{"order_id":"o-1","status":"pending","file_name":"a.pdf","file_size":1024}"#,
        )
        .unwrap();

        assert_eq!(camel.order_id, snake.order_id);
        assert_eq!(camel.filename, snake.filename);
        assert_eq!(camel.file_size, 1024);
        assert_eq!(snake.progress, 0.0);
    }

    #[test]
    fn test_rejected_envelope() {
        let envelope: TransferResponse =
            serde_json::from_str(r#"{"success":false,"error":"Server busy"}"#).unwrap();
        assert_eq!(envelope, TransferResponse::rejected("Server busy"));
    }

    #[test]
    fn test_progress_sink_clamps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let sink = ProgressSink::new(move |p| recorder.lock().unwrap().push(p));

        sink.report(40);
        sink.report(250);
        sink.report_bytes(512, 1024);
        sink.report_bytes(10, 0);

        assert_eq!(*seen.lock().unwrap(), vec![40, 100, 50]);
    }

    #[tokio::test]
    async fn test_fn_transfer() {
        let transfer = FnTransfer::new(|file: UploadFile, progress: ProgressSink| {
            async move {
                progress.report(100);
                Ok::<_, anyhow::Error>(TransferResponse::accepted(UploadResponse {
                    order_id: "o-2".into(),
                    status: "pending".into(),
                    filename: file.name.clone(),
                    file_size: file.size(),
                    progress: 100.0,
                }))
            }
            .boxed()
        });

        let file = UploadFile::new("a.pdf", "application/pdf", vec![b'%'; 16]);
        let response = transfer.transfer(&file, ProgressSink::discard()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap().file_size, 16);
    }
}
