//! Run-scoped wiring for `RefreshController`: the driver task, the metrics
//! reporter, and the token that stops both.

use super::driver::{Driver, DriverParams};
use super::handle::RefreshHandle;
use crate::runtime::config::RefreshConfig;
use crate::runtime::telemetry::{self, Telemetry};
use crate::source::FeeSource;
use crate::state::RefreshMachine;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    pub run_token: CancellationToken,
    driver_handle: Option<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
}

pub(crate) struct LifecycleSpawnParams<'a> {
    pub shutdown_root: &'a CancellationToken,
    pub config: &'a RefreshConfig,
    pub source: Arc<dyn FeeSource>,
    pub telemetry: Arc<Telemetry>,
}

impl LifecycleHandles {
    pub(crate) fn spawn(params: LifecycleSpawnParams<'_>) -> (Self, RefreshHandle) {
        let LifecycleSpawnParams {
            shutdown_root,
            config,
            source,
            telemetry,
        } = params;

        let run_token = shutdown_root.child_token();
        let machine = RefreshMachine::new(
            config.endpoint().clone(),
            config.retry_backoff(),
            config.poll_schedule(),
        );
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity());
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let driver = Driver::new(DriverParams {
            machine,
            source,
            events_tx: events_tx.clone(),
            snapshot_tx,
            telemetry: telemetry.clone(),
            run_token: run_token.clone(),
            fetch_timeout: config.fetch_timeout(),
        });
        let driver_handle = driver.spawn(events_rx);
        let metrics_handle = telemetry::spawn_metrics_reporter(
            telemetry,
            snapshot_rx.clone(),
            run_token.clone(),
            config.metrics_interval(),
        );

        let handles = Self {
            run_token,
            driver_handle: Some(driver_handle),
            metrics_handle: Some(metrics_handle),
        };

        (handles, RefreshHandle::new(events_tx, snapshot_rx))
    }

    pub(crate) async fn shutdown(mut self) -> Result<()> {
        self.run_token.cancel();

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        if let Some(handle) = self.driver_handle.take() {
            handle.await.context("fee refresh driver task failed")?;
        }

        Ok(())
    }
}
