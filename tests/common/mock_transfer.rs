/// Scripted transport for upload tests
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use upload_resilience::upload::{
    ProgressSink, Transfer, TransferResponse, UploadFile, UploadResponse,
};
use upload_resilience::ClientError;

/// What one transfer call does
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Report the given percentages, then accept the file
    Accept(Vec<u32>),
    /// Answer with `success: false` and this message
    Reject(String),
    /// Fail at the transport level
    NetworkError(String),
    /// Fail with an HTTP status
    Status(u16),
    /// Report progress, then never finish
    Hang(Vec<u32>),
}

/// Transport that plays back a script of outcomes, one per call.
///
/// Once the script runs out, the fallback outcome repeats.
pub struct ScriptedTransfer {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedTransfer {
    pub fn new(script: Vec<Outcome>, fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::new(Vec::new(), outcome)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn order_for(file: &UploadFile) -> UploadResponse {
    UploadResponse {
        order_id: format!("order-{}", file.name),
        status: "pending".to_string(),
        filename: file.name.clone(),
        file_size: file.size(),
        progress: 100.0,
    }
}

impl Transfer for ScriptedTransfer {
    fn transfer<'a>(
        &'a self,
        file: &'a UploadFile,
        progress: ProgressSink,
    ) -> BoxFuture<'a, anyhow::Result<TransferResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.next_outcome();
        let latency = self.latency;

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let result: anyhow::Result<TransferResponse> = match outcome {
                Outcome::Accept(steps) => {
                    for step in steps {
                        progress.report(step);
                    }
                    Ok(TransferResponse::accepted(order_for(file)))
                }
                Outcome::Reject(message) => Ok(TransferResponse::rejected(message)),
                Outcome::NetworkError(message) => Err(ClientError::Network(message).into()),
                Outcome::Status(status) => Err(ClientError::Http {
                    status,
                    message: format!("HTTP status {}", status),
                }
                .into()),
                Outcome::Hang(steps) => {
                    for step in steps {
                        progress.report(step);
                    }
                    futures::future::pending().await
                }
            };
            result
        }
        .boxed()
    }
}
