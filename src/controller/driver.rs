//! Serialized event loop that owns the [`RefreshMachine`] and realizes its
//! effects: fetch tasks, the poll ticker, and the retry timer.
//!
//! Everything that can change the machine arrives through one mpsc channel:
//! caller events, fetch completions, and timer deliveries. Fetch completions
//! carry the attempt id they were issued with, timer deliveries carry the id of
//! the timer that produced them, and anything that no longer matches is
//! dropped.

use super::timer::Timer;
use crate::runtime::telemetry::Telemetry;
use crate::source::{Endpoint, FeeSource, FetchError};
use crate::state::{AttemptId, Effect, Event, Phase, RefreshMachine, RefreshSnapshot, StepOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

pub(crate) type TimerId = u64;

#[derive(Debug)]
pub(crate) enum DriverMessage {
    Event(Event),
    PollTick { timer: TimerId },
    RetryDue { timer: TimerId },
}

pub(crate) type DriverSender = mpsc::Sender<DriverMessage>;
pub(crate) type DriverReceiver = mpsc::Receiver<DriverMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Poll,
    Retry,
}

struct ArmedTimer {
    id: TimerId,
    kind: TimerKind,
    _timer: Timer,
}

struct InFlightFetch {
    attempt: AttemptId,
    handle: JoinHandle<()>,
}

pub(crate) struct DriverParams {
    pub machine: RefreshMachine,
    pub source: Arc<dyn FeeSource>,
    pub events_tx: DriverSender,
    pub snapshot_tx: watch::Sender<RefreshSnapshot>,
    pub telemetry: Arc<Telemetry>,
    pub run_token: CancellationToken,
    pub fetch_timeout: Duration,
}

pub(crate) struct Driver {
    machine: RefreshMachine,
    source: Arc<dyn FeeSource>,
    events_tx: DriverSender,
    snapshot_tx: watch::Sender<RefreshSnapshot>,
    telemetry: Arc<Telemetry>,
    run_token: CancellationToken,
    fetch_timeout: Duration,
    armed: Option<ArmedTimer>,
    in_flight: Option<InFlightFetch>,
    next_timer_id: TimerId,
}

impl Driver {
    pub(crate) fn new(params: DriverParams) -> Self {
        let DriverParams {
            machine,
            source,
            events_tx,
            snapshot_tx,
            telemetry,
            run_token,
            fetch_timeout,
        } = params;

        Self {
            machine,
            source,
            events_tx,
            snapshot_tx,
            telemetry,
            run_token,
            fetch_timeout,
            armed: None,
            in_flight: None,
            next_timer_id: 0,
        }
    }

    pub(crate) fn spawn(self, events_rx: DriverReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(events_rx))
    }

    async fn run(mut self, mut events_rx: DriverReceiver) {
        self.publish();
        tracing::info!(endpoint = %self.machine.context().endpoint, "fee refresh driver started");

        loop {
            tokio::select! {
                biased;
                _ = self.run_token.cancelled() => {
                    break;
                }
                message = events_rx.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        tracing::debug!("driver event channel closed");
                        break;
                    }
                },
            }
        }

        self.armed = None;
        if let Some(fetch) = self.in_flight.take() {
            fetch.handle.abort();
        }
        tracing::info!(phase = %self.machine.phase(), "fee refresh driver stopped");
    }

    fn dispatch(&mut self, message: DriverMessage) {
        let event = match message {
            DriverMessage::Event(event) => event,
            DriverMessage::PollTick { timer } => {
                if !self.is_armed(timer, TimerKind::Poll) {
                    self.drop_stale_timer(timer, TimerKind::Poll);
                    return;
                }
                Event::Tick
            }
            DriverMessage::RetryDue { timer } => {
                if !self.is_armed(timer, TimerKind::Retry) {
                    self.drop_stale_timer(timer, TimerKind::Retry);
                    return;
                }
                Event::RetryElapsed
            }
        };

        self.apply(event);
    }

    fn apply(&mut self, event: Event) {
        let settled = match &event {
            Event::FetchSettled { attempt, outcome } => Some((
                *attempt,
                outcome.as_ref().err().map(ToString::to_string),
            )),
            _ => None,
        };
        let is_tick = matches!(event, Event::Tick);

        let step = self.machine.handle(event);
        let phase = self.machine.phase();

        match step.outcome {
            StepOutcome::Applied => {}
            StepOutcome::Ignored => {
                tracing::trace!(phase = %phase, "event ignored in current phase");
            }
            StepOutcome::Stale => {
                self.telemetry.record_stale_delivery();
                if let Some((attempt, _)) = settled {
                    tracing::debug!(
                        attempt,
                        current_attempt = self.machine.current_attempt(),
                        "dropping result of superseded fetch"
                    );
                } else {
                    tracing::debug!(phase = %phase, "dropping stale retry wake-up");
                }
            }
        }

        if step.outcome == StepOutcome::Applied {
            if let Some((attempt, failure)) = settled {
                self.finish_fetch(attempt, failure, phase);
            }
            if is_tick {
                self.telemetry.record_tick();
                if phase == Phase::FetchInFlight {
                    self.telemetry.record_forced_refresh();
                    tracing::debug!("poll span reached; forcing fee refresh");
                } else {
                    tracing::trace!(ticks = self.machine.context().ticks, "poll tick");
                }
            }
        }

        if step.previous != phase {
            tracing::debug!(from = %step.previous, to = %phase, "refresh phase changed");
        }

        for effect in step.effects {
            self.realize(effect);
        }

        self.publish();
    }

    fn finish_fetch(&mut self, attempt: AttemptId, failure: Option<String>, phase: Phase) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|fetch| fetch.attempt == attempt)
        {
            self.in_flight = None;
        }

        let context = self.machine.context();
        match failure {
            None => {
                self.telemetry.record_fetch_success();
                tracing::debug!(attempt, endpoint = %context.endpoint, "fee snapshot refreshed");
            }
            Some(error) if phase == Phase::RetryPending => {
                self.telemetry.record_fetch_failure();
                tracing::warn!(
                    attempt,
                    retries = context.retries,
                    endpoint = %context.endpoint,
                    error = %error,
                    "fee fetch failed; retrying"
                );
            }
            Some(error) => {
                self.telemetry.record_fetch_failure();
                self.telemetry.record_retries_exhausted();
                tracing::error!(
                    attempt,
                    retries = context.retries,
                    endpoint = %context.endpoint,
                    error = %error,
                    "fee fetch exhausted retries"
                );
            }
        }
    }

    fn realize(&mut self, effect: Effect) {
        match effect {
            Effect::Fetch { attempt, endpoint } => self.spawn_fetch(attempt, endpoint),
            Effect::StartPolling { interval } => {
                let id = self.next_timer_id();
                let events_tx = self.events_tx.clone();
                let timer = Timer::every(&self.run_token, interval, move || {
                    let events_tx = events_tx.clone();
                    async move {
                        events_tx
                            .send(DriverMessage::PollTick { timer: id })
                            .await
                            .is_ok()
                    }
                });
                self.arm(id, TimerKind::Poll, timer);
            }
            Effect::StopPolling => self.disarm(TimerKind::Poll),
            Effect::ScheduleRetry { retry, delay } => {
                let id = self.next_timer_id();
                let events_tx = self.events_tx.clone();
                let timer = Timer::after(&self.run_token, delay, move || async move {
                    if events_tx
                        .send(DriverMessage::RetryDue { timer: id })
                        .await
                        .is_err()
                    {
                        tracing::trace!(timer = id, "driver gone before retry fired");
                    }
                });
                self.telemetry.record_retry_scheduled();
                tracing::debug!(
                    retry,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retry scheduled"
                );
                self.arm(id, TimerKind::Retry, timer);
            }
            Effect::CancelRetry => self.disarm(TimerKind::Retry),
        }
    }

    fn spawn_fetch(&mut self, attempt: AttemptId, endpoint: Endpoint) {
        if let Some(previous) = self.in_flight.take() {
            previous.handle.abort();
            tracing::debug!(
                superseded = previous.attempt,
                attempt,
                "aborting superseded fee fetch"
            );
        }

        self.telemetry.record_fetch_started();
        tracing::debug!(attempt, endpoint = %endpoint, "fetching fee snapshot");

        let source = self.source.clone();
        let events_tx = self.events_tx.clone();
        let fetch_timeout = self.fetch_timeout;
        let handle = tokio::spawn(async move {
            let outcome = match time::timeout(fetch_timeout, source.fetch_fees(&endpoint)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::timeout(endpoint.clone(), fetch_timeout)),
            };

            let message = DriverMessage::Event(Event::FetchSettled { attempt, outcome });
            if events_tx.send(message).await.is_err() {
                tracing::trace!(attempt, "driver gone before fetch settled");
            }
        });

        self.in_flight = Some(InFlightFetch { attempt, handle });
    }

    fn arm(&mut self, id: TimerId, kind: TimerKind, timer: Timer) {
        debug_assert!(
            self.armed.is_none(),
            "a timer must be disarmed before another is armed"
        );
        self.armed = Some(ArmedTimer {
            id,
            kind,
            _timer: timer,
        });
    }

    fn disarm(&mut self, kind: TimerKind) {
        if self.armed.as_ref().is_some_and(|armed| armed.kind == kind) {
            // Dropping the handle cancels the timer task.
            self.armed = None;
        }
    }

    fn is_armed(&self, id: TimerId, kind: TimerKind) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|armed| armed.id == id && armed.kind == kind)
    }

    fn drop_stale_timer(&self, id: TimerId, kind: TimerKind) {
        self.telemetry.record_stale_delivery();
        tracing::debug!(timer = id, kind = ?kind, "dropping delivery from cancelled timer");
    }

    fn next_timer_id(&mut self) -> TimerId {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.machine.snapshot());
    }
}
