//! One-shot and periodic timers backed by tokio tasks. Each timer hangs off a
//! parent [`CancellationToken`], so cancelling the controller's run token tears
//! down every timer it armed.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to an armed timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Timer {
    /// Runs `fire` once after `delay` unless cancelled first.
    pub fn after<F, Fut>(parent: &CancellationToken, delay: Duration, fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = time::sleep(delay) => fire().await,
            }
        });

        Self { token, handle }
    }

    /// Runs `fire` every `period`, starting one period from now. The timer
    /// stops when cancelled or when `fire` returns `false`.
    pub fn every<F, Fut>(parent: &CancellationToken, period: Duration, mut fire: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = parent.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !fire().await {
                            break;
                        }
                    }
                }
            }
        });

        Self { token, handle }
    }

}

impl Drop for Timer {
    fn drop(&mut self) {
        self.token.cancel();
        // A callback already awaiting a send is stopped too.
        self.handle.abort();
    }
}
