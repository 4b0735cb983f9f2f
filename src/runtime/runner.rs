use crate::{FeeSource, RefreshConfig, RefreshController, RefreshHandle};
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the refresh controller lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner<S: FeeSource> {
    controller: RefreshController<S>,
    shutdown: CancellationToken,
    handle: Option<RefreshHandle>,
}

impl<S: FeeSource> Runner<S> {
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates
    /// through the controller (driver, fetch tasks, timers, metrics reporter).
    pub fn new(config: RefreshConfig, source: S) -> Self {
        let shutdown = CancellationToken::new();
        let controller = RefreshController::with_cancellation_token(config, source, shutdown.clone());
        Self {
            controller,
            shutdown,
            handle: None,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn controller(&self) -> &RefreshController<S> {
        &self.controller
    }

    /// Starts the controller, issuing the initial `Load` when configured to.
    /// Returns the running handle if already started.
    pub async fn start(&mut self) -> Result<RefreshHandle> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        let handle = self.controller.start().await?;
        if self.controller.config().load_on_start() {
            handle.load().await?;
        }
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Stops the controller gracefully by cancelling the root token.
    pub async fn stop(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }

        self.shutdown.cancel();
        let result = self.controller.stop().await;
        self.handle = None;
        self.reinitialize_shutdown_token();
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.controller.replace_shutdown_root(self.shutdown.clone());
    }
}
