/// Process-wide resilience services
///
/// One [`ResilienceContext`] owns the error logger, the recovery registry and
/// the circuit breaker guarding the upload endpoint. Construct one explicitly
/// and pass it around, or use the global instance.
use crate::config::ClientConfig;
use crate::error::{
    CircuitBreaker, ClassifiedError, ErrorClassifier, ErrorLogger, Failure, FileStore,
    KeyValueStore, MemoryStore, NoopHooks, RecoveryHooks, RecoveryStrategyRegistry,
};
use crate::upload::{Transfer, UploadCallbacks, UploadController};
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref GLOBAL_CONTEXT: Mutex<Option<Arc<ResilienceContext>>> = Mutex::new(None);
}

pub struct ResilienceContext {
    config: ClientConfig,
    classifier: ErrorClassifier,
    logger: Arc<ErrorLogger>,
    registry: Arc<RecoveryStrategyRegistry>,
    upload_breaker: Arc<CircuitBreaker>,
}

impl ResilienceContext {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        hooks: Arc<dyn RecoveryHooks>,
    ) -> Self {
        let logger = ErrorLogger::new(store).with_max_entries(config.logging.max_entries);
        let upload_breaker =
            CircuitBreaker::new(config.circuit.failure_threshold, config.circuit.cooldown());

        Self {
            classifier: ErrorClassifier::new(),
            logger: Arc::new(logger),
            registry: Arc::new(RecoveryStrategyRegistry::with_defaults(hooks)),
            upload_breaker: Arc::new(upload_breaker),
            config,
        }
    }

    /// Context whose error log lives only in memory
    pub fn in_memory(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(NoopHooks))
    }

    /// Context persisting its error log under the configured storage dir
    pub fn persistent(config: ClientConfig, hooks: Arc<dyn RecoveryHooks>) -> Self {
        match config.storage_dir() {
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "Persisting error log");
                Self::new(config, Arc::new(FileStore::new(dir)), hooks)
            }
            None => {
                tracing::warn!("No storage directory available, error log kept in memory");
                Self::new(config, Arc::new(MemoryStore::new()), hooks)
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn logger(&self) -> &Arc<ErrorLogger> {
        &self.logger
    }

    pub fn registry(&self) -> &Arc<RecoveryStrategyRegistry> {
        &self.registry
    }

    pub fn upload_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.upload_breaker
    }

    /// Classify a failure and record it in the error log
    pub fn report(&self, failure: impl Into<Failure>, context: &str) -> ClassifiedError {
        let error = self.classifier.classify(failure);
        self.logger.log_error(&error, context);
        error
    }

    /// Upload controller wired to this context's logger and breaker
    pub fn upload_controller(
        &self,
        transfer: Arc<dyn Transfer>,
        callbacks: UploadCallbacks,
    ) -> UploadController {
        let mut builder = UploadController::builder(self.config.upload.clone(), transfer)
            .with_callbacks(callbacks)
            .with_logger(Arc::clone(&self.logger))
            .with_classifier(self.classifier.clone());

        if self.config.circuit.enabled {
            builder = builder.with_circuit_breaker(Arc::clone(&self.upload_breaker));
        }

        builder.build()
    }

    /// Install `context` as the global instance.
    ///
    /// Fails with the existing instance if one was already installed or
    /// lazily created by [`ResilienceContext::global`].
    pub fn install_global(
        context: ResilienceContext,
    ) -> Result<Arc<ResilienceContext>, Arc<ResilienceContext>> {
        let mut global = GLOBAL_CONTEXT.lock().unwrap();
        match global.as_ref() {
            Some(existing) => Err(Arc::clone(existing)),
            None => {
                let context = Arc::new(context);
                *global = Some(Arc::clone(&context));
                Ok(context)
            }
        }
    }

    /// The global instance, created in memory with default settings on first use
    pub fn global() -> Arc<ResilienceContext> {
        let mut global = GLOBAL_CONTEXT.lock().unwrap();
        Arc::clone(
            global.get_or_insert_with(|| Arc::new(Self::in_memory(ClientConfig::default()))),
        )
    }

    /// Drop the global instance so the next access starts fresh
    #[doc(hidden)]
    pub fn reset_global_for_tests() {
        *GLOBAL_CONTEXT.lock().unwrap() = None;
    }
}
