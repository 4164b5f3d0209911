use super::file::UploadFile;
use super::session::{RetryMode, UploadSession, UploadStatus};
use super::transfer::{ProgressSink, Transfer, TransferResponse, UploadResponse};
use super::validation::validate_file;
use crate::config::UploadConfig;
use crate::error::{
    backoff_delay, user_friendly_message, CircuitBreaker, ClassifiedError, ErrorClassifier,
    ErrorKind, ErrorLogger, Severity,
};
use crate::error::retry::DEFAULT_MULTIPLIER;
use crate::ClientError;
use futures::future::{AbortHandle, Abortable, Aborted};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub const CANCELLED_MESSAGE: &str = "Upload cancelled";
pub const NO_FILE_TO_RETRY_MESSAGE: &str = "No file to retry";

/// Notifications fired as an upload progresses
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    on_progress: Option<Arc<dyn Fn(u8) + Send + Sync>>,
    on_success: Option<Arc<dyn Fn(&UploadResponse) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl UploadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&UploadResponse) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Receives the user-facing message, never the raw error text
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn progress(&self, percent: u8) {
        if let Some(f) = &self.on_progress {
            f(percent);
        }
    }

    fn success(&self, response: &UploadResponse) {
        if let Some(f) = &self.on_success {
            f(response);
        }
    }

    fn error(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }
}

pub struct UploadControllerBuilder {
    config: UploadConfig,
    transfer: Arc<dyn Transfer>,
    callbacks: UploadCallbacks,
    logger: Option<Arc<ErrorLogger>>,
    breaker: Option<Arc<CircuitBreaker>>,
    classifier: ErrorClassifier,
}

impl UploadControllerBuilder {
    pub fn with_callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_logger(mut self, logger: Arc<ErrorLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.config.retry_mode = mode;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> UploadController {
        UploadController {
            inner: Arc::new(Inner {
                config: self.config,
                transfer: self.transfer,
                callbacks: self.callbacks,
                logger: self.logger,
                breaker: self.breaker,
                classifier: self.classifier,
                state: Mutex::new(State::default()),
            }),
        }
    }
}

/// Drives one upload session: validation, transfer, retries, cancellation.
///
/// Clones share the same session. Uploads run on the tokio runtime, so
/// [`UploadController::upload_file`] must be called from within one.
#[derive(Clone)]
pub struct UploadController {
    inner: Arc<Inner>,
}

struct Inner {
    config: UploadConfig,
    transfer: Arc<dyn Transfer>,
    callbacks: UploadCallbacks,
    logger: Option<Arc<ErrorLogger>>,
    breaker: Option<Arc<CircuitBreaker>>,
    classifier: ErrorClassifier,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    session: UploadSession,
    /// Bumped whenever a new lifecycle starts or the current one is abandoned
    generation: u64,
    task: Option<AbortHandle>,
}

/// Completion handle of a started upload
pub struct UploadHandle {
    join: Option<JoinHandle<Result<(), Aborted>>>,
    controller: UploadController,
}

impl UploadHandle {
    /// Wait for the lifecycle to settle and return the session at that point
    pub async fn wait(self) -> UploadSession {
        if let Some(join) = self.join {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "Upload task ended abnormally");
            }
        }
        self.controller.session()
    }
}

impl UploadController {
    pub fn new(config: UploadConfig, transfer: Arc<dyn Transfer>) -> Self {
        Self::builder(config, transfer).build()
    }

    pub fn builder(config: UploadConfig, transfer: Arc<dyn Transfer>) -> UploadControllerBuilder {
        UploadControllerBuilder {
            config,
            transfer,
            callbacks: UploadCallbacks::default(),
            logger: None,
            breaker: None,
            classifier: ErrorClassifier::default(),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    /// Snapshot of the current session
    pub fn session(&self) -> UploadSession {
        self.inner.state.lock().unwrap().session.clone()
    }

    /// Validate and start uploading `file`, superseding any running upload
    pub fn upload_file(&self, file: UploadFile) -> UploadHandle {
        self.start(file, 0)
    }

    /// Abort the running upload. Leaves the session cancelled even when idle.
    pub fn cancel_upload(&self) {
        let was_running = {
            let mut state = self.inner.state.lock().unwrap();
            let was_running = match state.task.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            };
            state.generation += 1;

            let session = &mut state.session;
            session.status = UploadStatus::Cancelled;
            session.progress_percent = 0;
            session.response = None;
            session.last_error = Some(
                ClassifiedError::upload(CANCELLED_MESSAGE, false).with_severity(Severity::Low),
            );
            was_running
        };

        tracing::info!(was_running, "Upload cancelled");
    }

    /// Re-run the stored file. Returns `None` when nothing was ever selected.
    pub fn retry_upload(&self) -> Option<UploadHandle> {
        let (file, attempt) = {
            let mut state = self.inner.state.lock().unwrap();
            match state.session.file.clone() {
                Some(file) => (file, state.session.attempt),
                None => {
                    state.session.last_error = Some(
                        ClassifiedError::client(NO_FILE_TO_RETRY_MESSAGE)
                            .with_severity(Severity::Low),
                    );
                    return None;
                }
            }
        };

        let start_attempt = match self.inner.config.retry_mode {
            RetryMode::Restart => 0,
            RetryMode::Continue => attempt,
        };
        tracing::info!(file = %file.name, start_attempt, "Manual upload retry");

        Some(self.start(file, start_attempt))
    }

    /// Abort anything in flight and return to the initial session
    pub fn reset(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(handle) = state.task.take() {
            handle.abort();
        }
        state.generation += 1;
        state.session = UploadSession::default();
    }

    fn start(&self, file: UploadFile, start_attempt: u32) -> UploadHandle {
        let validation = validate_file(&file, &self.inner.config);

        let mut state = self.inner.state.lock().unwrap();
        if let Some(previous) = state.task.take() {
            previous.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        state.session = UploadSession {
            file: Some(file.clone()),
            status: UploadStatus::Validating,
            attempt: start_attempt,
            ..UploadSession::default()
        };

        if let Err(invalid) = validation {
            let message = invalid.to_string();
            let error = ClassifiedError::validation(message.clone())
                .with_context("file", file.name.clone())
                .with_context("size", file.size());

            state.session.status = UploadStatus::Idle;
            state.session.validation_errors = vec![message];
            state.session.last_error = Some(error.clone());
            drop(state);

            tracing::info!(file = %file.name, reason = %invalid, "Upload rejected by validation");
            self.inner.log(&error, start_attempt);
            self.inner.callbacks.error(&user_friendly_message(&error));

            return UploadHandle {
                join: None,
                controller: self.clone(),
            };
        }

        state.session.status = UploadStatus::Uploading;
        let (abort_handle, registration) = AbortHandle::new_pair();
        state.task = Some(abort_handle);
        drop(state);

        let lifecycle = Arc::clone(&self.inner).run(file, generation, start_attempt);
        let join = tokio::spawn(Abortable::new(lifecycle, registration));

        UploadHandle {
            join: Some(join),
            controller: self.clone(),
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>, file: UploadFile, generation: u64, mut attempt: u32) {
        loop {
            let started = self.update(generation, |state| {
                state.session.status = UploadStatus::Uploading;
                state.session.progress_percent = 0;
                state.session.attempt = attempt;
            });
            if !started {
                return;
            }

            tracing::debug!(file = %file.name, attempt, "Starting upload attempt");
            let sink = self.progress_sink(generation);

            let error = match self.transfer_once(&file, sink).await {
                Ok(response) => {
                    let applied = self.update(generation, |state| {
                        state.task = None;
                        let session = &mut state.session;
                        session.status = UploadStatus::Succeeded;
                        session.progress_percent = 100;
                        session.attempt = 0;
                        session.last_error = None;
                        session.response = Some(response.clone());
                    });
                    if applied {
                        tracing::info!(
                            file = %file.name,
                            order_id = %response.order_id,
                            "Upload succeeded"
                        );
                        self.callbacks.success(&response);
                    }
                    return;
                }
                Err(error) => error,
            };

            self.log(&error, attempt);

            if attempt < self.config.max_retries && error.is_retryable() {
                attempt += 1;
                let delay = backoff_delay(
                    self.config.base_delay(),
                    self.config.max_delay(),
                    DEFAULT_MULTIPLIER,
                    attempt,
                );

                let waiting = self.update(generation, |state| {
                    state.session.status = UploadStatus::Retrying;
                    state.session.attempt = attempt;
                    state.session.last_error = Some(error.clone());
                });
                if !waiting {
                    return;
                }

                tracing::warn!(
                    file = %file.name,
                    retry = attempt,
                    max_retries = self.config.max_retries,
                    delay = %humantime::format_duration(delay),
                    error = %error,
                    "Upload attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = user_friendly_message(&error);
            let applied = self.update(generation, |state| {
                state.task = None;
                let session = &mut state.session;
                session.status = UploadStatus::Failed;
                session.progress_percent = 0;
                session.response = None;
                session.last_error = Some(error.clone());
            });
            if applied {
                tracing::error!(
                    file = %file.name,
                    attempt,
                    kind = %error.kind(),
                    error = %error,
                    "Upload failed"
                );
                self.callbacks.error(&message);
            }
            return;
        }
    }

    async fn transfer_once(
        &self,
        file: &UploadFile,
        sink: ProgressSink,
    ) -> Result<UploadResponse, ClassifiedError> {
        let attempt = move || {
            let sink = sink.clone();
            async move {
                let response = self.transfer.transfer(file, sink).await?;
                self.accept(response)
            }
        };

        match &self.breaker {
            Some(breaker) => breaker.execute(attempt).await,
            None => attempt().await.map_err(|e| self.classifier.classify(e)),
        }
    }

    /// Turn a transport envelope into a response or a failure
    fn accept(&self, response: TransferResponse) -> anyhow::Result<UploadResponse> {
        if response.success {
            return response.data.ok_or_else(|| {
                ClientError::Upload {
                    message: "response did not include order details".to_string(),
                    retryable: false,
                }
                .into()
            });
        }

        let message = response
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Upload failed".to_string());

        let specific = self.classifier.classify(message.as_str());
        if matches!(specific.kind(), ErrorKind::Unknown | ErrorKind::Upload) {
            Err(ClientError::Upload {
                message,
                retryable: true,
            }
            .into())
        } else {
            Err(specific.into())
        }
    }

    fn progress_sink(self: &Arc<Self>, generation: u64) -> ProgressSink {
        let inner = Arc::clone(self);
        ProgressSink::new(move |percent| {
            let applied = inner.update(generation, |state| {
                let session = &mut state.session;
                if session.status == UploadStatus::Uploading {
                    session.progress_percent = session.progress_percent.max(percent);
                }
            });
            if applied {
                inner.callbacks.progress(percent);
            }
        })
    }

    /// Apply `f` only if no newer lifecycle has started since `generation`
    fn update(&self, generation: u64, f: impl FnOnce(&mut State)) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            return false;
        }
        f(&mut state);
        true
    }

    fn log(&self, error: &ClassifiedError, attempt: u32) {
        if let Some(logger) = &self.logger {
            let mut context = HashMap::new();
            context.insert("attempt".to_string(), Value::from(attempt));
            logger.log_error_with(error, "upload", context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::transfer::FnTransfer;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pdf(size: usize) -> UploadFile {
        UploadFile::new("statement.pdf", "application/pdf", vec![b'%'; size])
    }

    fn accepted(file: &UploadFile) -> TransferResponse {
        TransferResponse::accepted(UploadResponse {
            order_id: "order-1".into(),
            status: "pending".into(),
            filename: file.name.clone(),
            file_size: file.size(),
            progress: 100.0,
        })
    }

    #[tokio::test]
    async fn test_success_path() {
        let transfer = Arc::new(FnTransfer::new(|file: UploadFile, progress: ProgressSink| {
            async move {
                for p in [10, 60, 100] {
                    progress.report(p);
                }
                Ok::<_, anyhow::Error>(accepted(&file))
            }
            .boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        let session = controller.upload_file(pdf(2048)).wait().await;
        assert_eq!(session.status, UploadStatus::Succeeded);
        assert_eq!(session.progress_percent, 100);
        assert_eq!(session.attempt, 0);
        assert!(session.last_error.is_none());
        assert_eq!(session.response.unwrap().order_id, "order-1");
    }

    #[tokio::test]
    async fn test_validation_failure_never_calls_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transfer = Arc::new(FnTransfer::new(move |file: UploadFile, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(accepted(&file)) }.boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        let session = controller.upload_file(pdf(5)).wait().await;
        assert_eq!(session.status, UploadStatus::Idle);
        assert_eq!(session.validation_errors, vec!["File is empty".to_string()]);
        assert_eq!(session.last_error.unwrap().kind(), ErrorKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_response_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transfer = Arc::new(FnTransfer::new(move |file: UploadFile, _| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let response = if call == 0 {
                    TransferResponse::rejected("Server busy")
                } else {
                    accepted(&file)
                };
                Ok::<_, anyhow::Error>(response)
            }
            .boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        let session = controller.upload_file(pdf(64)).wait().await;
        assert_eq!(session.status, UploadStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transfer = Arc::new(FnTransfer::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<TransferResponse, _>(anyhow::Error::from(ClientError::Http {
                    status: 422,
                    message: "Unprocessable Entity".into(),
                }))
            }
            .boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        let session = controller.upload_file(pdf(64)).wait().await;
        assert_eq!(session.status, UploadStatus::Failed);
        assert_eq!(session.last_error.unwrap().kind(), ErrorKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_without_file() {
        let transfer = Arc::new(FnTransfer::new(|file: UploadFile, _| {
            async move { Ok::<_, anyhow::Error>(accepted(&file)) }.boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        assert!(controller.retry_upload().is_none());
        assert_eq!(controller.session().error_message(), Some(NO_FILE_TO_RETRY_MESSAGE));
        assert_eq!(controller.session().status, UploadStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_progress_is_ignored_after_cancel() {
        let transfer = Arc::new(FnTransfer::new(|file: UploadFile, progress: ProgressSink| {
            async move {
                progress.report(30);
                tokio::time::sleep(Duration::from_secs(5)).await;
                progress.report(90);
                Ok::<_, anyhow::Error>(accepted(&file))
            }
            .boxed()
        }));
        let controller = UploadController::new(UploadConfig::default(), transfer);

        let handle = controller.upload_file(pdf(64));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.session().progress_percent, 30);

        controller.cancel_upload();
        let session = handle.wait().await;
        assert_eq!(session.status, UploadStatus::Cancelled);
        assert_eq!(session.progress_percent, 0);
        assert_eq!(session.error_message(), Some(CANCELLED_MESSAGE));
    }
}
