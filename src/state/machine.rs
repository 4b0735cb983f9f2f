//! Pure transition logic for the fee refresh cycle.
//!
//! [`RefreshMachine::handle`] consumes one [`Event`], mutates the context, and
//! returns the [`Effect`]s the driver has to realize (start a fetch, arm or
//! disarm a timer). Nothing here touches the clock or spawns tasks, so every
//! transition can be exercised synchronously.

use super::backoff::{PollSchedule, RetryBackoff, RetryDisposition};
use super::context::{Context, FeesValue, Phase, RefreshSnapshot};
use crate::source::{Endpoint, Fees, FetchError};
use std::mem;
use std::time::Duration;

/// Monotonic tag of a fetch invocation.
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Load,
    Tick,
    EndpointChanged(Endpoint),
    FetchSettled {
        attempt: AttemptId,
        outcome: Result<Fees, FetchError>,
    },
    RetryElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch {
        attempt: AttemptId,
        endpoint: Endpoint,
    },
    StartPolling {
        interval: Duration,
    },
    StopPolling,
    ScheduleRetry {
        retry: u32,
        delay: Duration,
    },
    CancelRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The event has no meaning in the current phase.
    Ignored,
    /// A fetch result or retry wake-up that no longer matches the machine.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub previous: Phase,
    pub outcome: StepOutcome,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone)]
pub struct RefreshMachine {
    phase: Phase,
    context: Context,
    backoff: RetryBackoff,
    schedule: PollSchedule,
    attempt: AttemptId,
}

impl RefreshMachine {
    pub fn new(endpoint: Endpoint, backoff: RetryBackoff, schedule: PollSchedule) -> Self {
        Self {
            phase: Phase::Idle,
            context: Context::new(endpoint),
            backoff,
            schedule,
            attempt: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Attempt id of the most recently issued fetch, `0` before the first one.
    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn snapshot(&self) -> RefreshSnapshot {
        RefreshSnapshot {
            phase: self.phase,
            context: self.context.clone(),
        }
    }

    pub fn handle(&mut self, event: Event) -> Step {
        let previous = self.phase;
        let mut effects = Vec::new();

        let outcome = match event {
            Event::Load => {
                self.begin_load(&mut effects);
                StepOutcome::Applied
            }
            Event::Tick => self.on_tick(&mut effects),
            Event::EndpointChanged(endpoint) => {
                self.context.endpoint = endpoint;
                StepOutcome::Applied
            }
            Event::FetchSettled { attempt, outcome } => {
                self.on_fetch_settled(attempt, outcome, &mut effects)
            }
            Event::RetryElapsed => {
                if self.phase != Phase::RetryPending {
                    StepOutcome::Stale
                } else {
                    self.enter(Phase::FetchInFlight, &mut effects);
                    StepOutcome::Applied
                }
            }
        };

        Step {
            previous,
            outcome,
            effects,
        }
    }

    fn begin_load(&mut self, effects: &mut Vec<Effect>) {
        // A superseded attempt or pending retry already holds `Loading`; keep
        // whatever value it retained.
        if !self.context.fees.is_loading() {
            self.context.fees = self.take_fees().to_loading();
        }
        self.context.retries = 0;
        self.context.ticks = 0;
        self.enter(Phase::FetchInFlight, effects);
    }

    fn on_tick(&mut self, effects: &mut Vec<Effect>) -> StepOutcome {
        if self.phase != Phase::Polling {
            return StepOutcome::Ignored;
        }

        if self.schedule.span_reached(self.context.ticks) {
            self.context.fees = self.take_fees().to_loading();
            self.context.ticks = 0;
            self.enter(Phase::FetchInFlight, effects);
        } else {
            self.context.ticks += 1;
        }

        StepOutcome::Applied
    }

    fn on_fetch_settled(
        &mut self,
        attempt: AttemptId,
        outcome: Result<Fees, FetchError>,
        effects: &mut Vec<Effect>,
    ) -> StepOutcome {
        if self.phase != Phase::FetchInFlight || attempt != self.attempt {
            return StepOutcome::Stale;
        }

        match outcome {
            Ok(fees) => {
                self.context.fees = FeesValue::succeed(fees);
                self.context.retries = 0;
                self.context.ticks = 0;
                self.enter(Phase::Polling, effects);
            }
            Err(error) => match self.backoff.next(self.context.retries) {
                RetryDisposition::Retry { retry, .. } => {
                    self.context.retries = retry;
                    self.enter(Phase::RetryPending, effects);
                }
                RetryDisposition::Exhausted => {
                    self.context.fees = FeesValue::fail(error);
                    self.enter(Phase::Idle, effects);
                }
            },
        }

        StepOutcome::Applied
    }

    fn enter(&mut self, next: Phase, effects: &mut Vec<Effect>) {
        if self.phase != next {
            match self.phase {
                Phase::Polling => effects.push(Effect::StopPolling),
                Phase::RetryPending => effects.push(Effect::CancelRetry),
                Phase::Idle | Phase::FetchInFlight => {}
            }
        }

        match next {
            Phase::FetchInFlight => {
                self.attempt += 1;
                effects.push(Effect::Fetch {
                    attempt: self.attempt,
                    endpoint: self.context.endpoint.clone(),
                });
            }
            Phase::Polling => effects.push(Effect::StartPolling {
                interval: self.schedule.interval,
            }),
            Phase::RetryPending => {
                let retry = self.context.retries;
                effects.push(Effect::ScheduleRetry {
                    retry,
                    delay: self.backoff.delay_for(retry),
                });
            }
            Phase::Idle => {}
        }

        self.phase = next;
    }

    fn take_fees(&mut self) -> FeesValue {
        mem::take(&mut self.context.fees)
    }
}
