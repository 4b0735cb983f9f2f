use crate::state::RefreshSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Counters describing how the refresh cycle has behaved so far.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetches_started: AtomicU64,
    fetch_successes: AtomicU64,
    fetch_failures: AtomicU64,
    retries_scheduled: AtomicU64,
    retries_exhausted: AtomicU64,
    ticks: AtomicU64,
    forced_refreshes: AtomicU64,
    stale_deliveries: AtomicU64,
}

impl Telemetry {
    pub fn record_fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_success(&self) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_refresh(&self) {
        self.forced_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_delivery(&self) {
        self.stale_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            forced_refreshes: self.forced_refreshes.load(Ordering::Relaxed),
            stale_deliveries: self.stale_deliveries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetches_started: u64,
    pub fetch_successes: u64,
    pub fetch_failures: u64,
    pub retries_scheduled: u64,
    pub retries_exhausted: u64,
    pub ticks: u64,
    pub forced_refreshes: u64,
    pub stale_deliveries: u64,
}

/// Spawns a background task that periodically logs refresh counters next to
/// the latest published state.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    snapshots: watch::Receiver<RefreshSnapshot>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "feewatch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let counters = telemetry.snapshot();
                    let (phase, fastest_fee) = {
                        let state = snapshots.borrow();
                        (state.phase, state.fees().last_value().map(|fees| fees.fastest_fee))
                    };

                    tracing::info!(
                        target: "feewatch::metrics",
                        phase = %phase,
                        fastest_fee = ?fastest_fee,
                        fetches = counters.fetches_started,
                        successes = counters.fetch_successes,
                        failures = counters.fetch_failures,
                        retries = counters.retries_scheduled,
                        exhausted = counters.retries_exhausted,
                        forced_refreshes = counters.forced_refreshes,
                        stale = counters.stale_deliveries,
                        "refresh metrics snapshot"
                    );
                }
            }
        }
    })
}
