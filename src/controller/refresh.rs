use super::handle::RefreshHandle;
use super::lifecycle::{LifecycleHandles, LifecycleSpawnParams};
use crate::runtime::config::RefreshConfig;
use crate::runtime::telemetry::Telemetry;
use crate::source::FeeSource;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Owns one fee refresh cycle: a fresh context per run, the driver task
/// serializing its events, and the timers it arms.
pub struct RefreshController<S: FeeSource> {
    config: RefreshConfig,
    source: Arc<S>,
    shutdown_root: CancellationToken,
    telemetry: Arc<Telemetry>,
    lifecycle: Option<LifecycleHandles>,
    handle: Option<RefreshHandle>,
}

impl<S: FeeSource> RefreshController<S> {
    /// Creates a controller with its own root cancellation token.
    pub fn new(config: RefreshConfig, source: S) -> Self {
        Self::with_cancellation_token(config, source, CancellationToken::new())
    }

    /// Creates a controller whose runs are derived from `shutdown_token`, so
    /// cancelling it stops the driver and every timer it armed.
    pub fn with_cancellation_token(
        config: RefreshConfig,
        source: S,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            source: Arc::new(source),
            shutdown_root: shutdown_token,
            telemetry: Arc::new(Telemetry::default()),
            lifecycle: None,
            handle: None,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Handle to the current run, if any.
    pub fn handle(&self) -> Option<RefreshHandle> {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_some()
    }

    /// Replaces the root shutdown token used to derive per-run cancellation tokens.
    /// This must only be called while the controller is stopped.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.is_running(),
            "shutdown token should not change while the controller is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Spawns the driver in `Idle` with a fresh context. No fetch happens
    /// until a `Load` arrives.
    pub async fn start(&mut self) -> Result<RefreshHandle> {
        if self.is_running() {
            bail!("refresh controller already running");
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "RefreshConfig should have been validated at construction time"
        );

        if self.shutdown_root.is_cancelled() {
            bail!("refresh controller shutdown token already cancelled");
        }

        tracing::info!(
            endpoint = %self.config.endpoint(),
            max_retries = self.config.max_retries(),
            poll_interval_ms =
                u64::try_from(self.config.poll_interval().as_millis()).unwrap_or(u64::MAX),
            ticks_per_refresh = self.config.poll_schedule().ticks_per_refresh(),
            "starting fee refresh controller"
        );

        let source: Arc<dyn FeeSource> = self.source.clone();
        let (lifecycle, handle) = LifecycleHandles::spawn(LifecycleSpawnParams {
            shutdown_root: &self.shutdown_root,
            config: &self.config,
            source,
            telemetry: self.telemetry.clone(),
        });

        self.lifecycle = Some(lifecycle);
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Stops the current run: cancels timers and any in-flight fetch, then
    /// joins the driver and metrics tasks.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(lifecycle) = self.lifecycle.take() else {
            return Ok(());
        };

        tracing::info!("stopping fee refresh controller");
        self.handle = None;

        lifecycle
            .shutdown()
            .await
            .context("fee refresh controller did not stop cleanly")
    }
}
