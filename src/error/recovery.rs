/// Recovery strategy registry - "can this be fixed, and how"
///
/// Strategies are tried in registration order. The first one whose `recover`
/// succeeds wins; failing strategies are logged and skipped, so
/// [`RecoveryStrategyRegistry::attempt_recovery`] always resolves to a plain bool.
use super::classification::{ClassifiedError, ErrorKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Pause used by the built-in "retry" strategies before reporting success
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_millis(1000);

/// Returned by strategies that only describe a manual remediation
#[derive(Error, Debug, Clone)]
#[error("Manual action required: {0}")]
pub struct ManualActionRequired(pub String);

/// A predicate plus an action able to repair a class of errors
pub trait RecoveryStrategy: Send + Sync {
    fn can_recover(&self, error: &ClassifiedError) -> bool;

    fn recover<'a>(&'a self, error: &'a ClassifiedError) -> BoxFuture<'a, anyhow::Result<()>>;

    fn description(&self) -> &str;
}

type Predicate = dyn Fn(&ClassifiedError) -> bool + Send + Sync;
type Action = dyn Fn(ClassifiedError) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Strategy assembled from closures
pub struct FnStrategy {
    description: String,
    predicate: Box<Predicate>,
    action: Box<Action>,
}

impl FnStrategy {
    pub fn new<P, A>(description: impl Into<String>, predicate: P, action: A) -> Self
    where
        P: Fn(&ClassifiedError) -> bool + Send + Sync + 'static,
        A: Fn(ClassifiedError) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
            action: Box::new(action),
        }
    }

    /// Strategy for `kind` whose recovery is left to the user
    pub fn manual(kind: ErrorKind, description: impl Into<String>) -> Self {
        let description = description.into();
        let reason = description.clone();
        Self::new(
            description,
            move |error| error.kind() == kind,
            move |_| {
                let reason = reason.clone();
                async move { Err::<(), anyhow::Error>(ManualActionRequired(reason).into()) }.boxed()
            },
        )
    }
}

impl RecoveryStrategy for FnStrategy {
    fn can_recover(&self, error: &ClassifiedError) -> bool {
        (self.predicate)(error)
    }

    fn recover<'a>(&'a self, error: &'a ClassifiedError) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.action)(error.clone())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Host application actions the built-in strategies rely on
pub trait RecoveryHooks: Send + Sync {
    /// Reload the current view
    fn reload(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Exchange the refresh token for a new access token
    fn refresh_session(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Send the user to the sign-in flow
    fn redirect_to_login(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Drop the selected file and any upload state
    fn clear_upload(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Hooks that succeed without doing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl RecoveryHooks for NoopHooks {
    fn reload(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn refresh_session(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn redirect_to_login(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn clear_upload(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }
}

/// Which hook a built-in strategy calls
#[derive(Debug, Clone, Copy)]
enum HookAction {
    Reload,
    RefreshSession,
    RedirectToLogin,
    ClearUpload,
}

/// Built-in strategy backed by a [`RecoveryHooks`] call
struct HookStrategy {
    kind: ErrorKind,
    action: HookAction,
    description: &'static str,
    hooks: Arc<dyn RecoveryHooks>,
}

impl RecoveryStrategy for HookStrategy {
    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.kind() == self.kind
    }

    fn recover<'a>(&'a self, _error: &'a ClassifiedError) -> BoxFuture<'a, anyhow::Result<()>> {
        match self.action {
            HookAction::Reload => self.hooks.reload(),
            HookAction::RefreshSession => self.hooks.refresh_session(),
            HookAction::RedirectToLogin => self.hooks.redirect_to_login(),
            HookAction::ClearUpload => self.hooks.clear_upload(),
        }
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Built-in strategy that waits and then lets the caller try again
struct WaitAndRetry {
    kind: ErrorKind,
    delay: Duration,
    description: &'static str,
}

impl RecoveryStrategy for WaitAndRetry {
    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.kind() == self.kind && error.is_retryable()
    }

    fn recover<'a>(&'a self, _error: &'a ClassifiedError) -> BoxFuture<'a, anyhow::Result<()>> {
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        .boxed()
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Ordered set of recovery strategies
#[derive(Default)]
pub struct RecoveryStrategyRegistry {
    strategies: RwLock<Vec<Arc<dyn RecoveryStrategy>>>,
}

impl RecoveryStrategyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies, retry pauses of [`DEFAULT_RECOVERY_DELAY`]
    pub fn with_defaults(hooks: Arc<dyn RecoveryHooks>) -> Self {
        Self::with_defaults_and_delay(hooks, DEFAULT_RECOVERY_DELAY)
    }

    pub fn with_defaults_and_delay(hooks: Arc<dyn RecoveryHooks>, retry_delay: Duration) -> Self {
        let registry = Self::new();

        registry.add_strategy(WaitAndRetry {
            kind: ErrorKind::Network,
            delay: retry_delay,
            description: "Retry the request once the connection is back",
        });
        registry.add_strategy(HookStrategy {
            kind: ErrorKind::Network,
            action: HookAction::Reload,
            description: "Refresh the page",
            hooks: Arc::clone(&hooks),
        });
        registry.add_strategy(HookStrategy {
            kind: ErrorKind::Authentication,
            action: HookAction::RefreshSession,
            description: "Refresh the session token",
            hooks: Arc::clone(&hooks),
        });
        registry.add_strategy(HookStrategy {
            kind: ErrorKind::Authentication,
            action: HookAction::RedirectToLogin,
            description: "Sign in again",
            hooks: Arc::clone(&hooks),
        });
        registry.add_strategy(WaitAndRetry {
            kind: ErrorKind::Upload,
            delay: retry_delay,
            description: "Retry the upload",
        });
        registry.add_strategy(HookStrategy {
            kind: ErrorKind::Upload,
            action: HookAction::ClearUpload,
            description: "Clear the upload and choose the file again",
            hooks,
        });
        registry.add_strategy(FnStrategy::manual(
            ErrorKind::Validation,
            "Correct the highlighted fields and submit again",
        ));
        registry.add_strategy(FnStrategy::manual(
            ErrorKind::Payment,
            "Contact support about this payment",
        ));
        registry.add_strategy(FnStrategy::manual(
            ErrorKind::Server,
            "Contact support if the problem continues",
        ));

        registry
    }

    /// Append a strategy; it is consulted after all earlier ones
    pub fn add_strategy(&self, strategy: impl RecoveryStrategy + 'static) {
        self.add_shared(Arc::new(strategy));
    }

    pub fn add_shared(&self, strategy: Arc<dyn RecoveryStrategy>) {
        let mut strategies = self.strategies.write().unwrap();
        strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strategies able to handle `error`, in registration order
    pub fn recovery_options(&self, error: &ClassifiedError) -> Vec<Arc<dyn RecoveryStrategy>> {
        let strategies = self.strategies.read().unwrap();
        strategies
            .iter()
            .filter(|s| s.can_recover(error))
            .cloned()
            .collect()
    }

    /// Try applicable strategies in order until one succeeds
    pub async fn attempt_recovery(&self, error: &ClassifiedError) -> bool {
        // Snapshot first so no lock is held across await points
        let options = self.recovery_options(error);

        for strategy in options {
            match strategy.recover(error).await {
                Ok(()) => {
                    tracing::info!(
                        kind = %error.kind(),
                        strategy = strategy.description(),
                        "Recovery succeeded"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %error.kind(),
                        strategy = strategy.description(),
                        error = %e,
                        "Recovery strategy failed, trying next"
                    );
                }
            }
        }

        tracing::debug!(kind = %error.kind(), "No recovery strategy succeeded");
        false
    }
}
