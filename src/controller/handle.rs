use super::driver::{DriverMessage, DriverSender};
use crate::source::Endpoint;
use crate::state::{Event, RefreshSnapshot};
use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;

/// Cloneable entry point into a running refresh controller.
///
/// Events are queued behind whatever the controller is processing; the
/// snapshot reflects the state after the last fully processed event.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    events_tx: DriverSender,
    snapshots: watch::Receiver<RefreshSnapshot>,
}

impl RefreshHandle {
    pub(crate) fn new(events_tx: DriverSender, snapshots: watch::Receiver<RefreshSnapshot>) -> Self {
        Self {
            events_tx,
            snapshots,
        }
    }

    /// Requests a fetch now, superseding any fetch or retry in progress.
    pub async fn load(&self) -> Result<()> {
        self.submit(Event::Load).await
    }

    /// Switches the endpoint used by the next fetch. Does not fetch by itself.
    pub async fn change_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        self.submit(Event::EndpointChanged(endpoint)).await
    }

    /// Delivers one poll tick by hand. The controller's own ticker normally
    /// produces these while polling.
    pub async fn tick(&self) -> Result<()> {
        self.submit(Event::Tick).await
    }

    pub fn snapshot(&self) -> RefreshSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<RefreshSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`, checking the
    /// current one first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&RefreshSnapshot) -> bool,
    ) -> Result<RefreshSnapshot> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .context("refresh controller stopped while waiting for snapshot")?;
        Ok(snapshot.clone())
    }

    async fn submit(&self, event: Event) -> Result<()> {
        self.events_tx
            .send(DriverMessage::Event(event))
            .await
            .map_err(|_| anyhow!("refresh controller is not running"))
    }
}
