use super::async_value::AsyncValue;
use crate::source::{Endpoint, Fees, FetchError};
use std::fmt;

pub type FeesValue = AsyncValue<Fees, FetchError>;

/// States of the refresh machine. None of them is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Polling,
    FetchInFlight,
    RetryPending,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Polling => "polling",
            Phase::FetchInFlight => "fetch_in_flight",
            Phase::RetryPending => "retry_pending",
        };
        f.write_str(name)
    }
}

/// Mutable state owned by the refresh machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub endpoint: Endpoint,
    pub fees: FeesValue,
    /// Poll intervals elapsed since the machine entered `Polling`.
    pub ticks: u32,
    pub retries: u32,
}

impl Context {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            fees: AsyncValue::initial(),
            ticks: 0,
            retries: 0,
        }
    }
}

/// Point-in-time view published to observers after every processed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSnapshot {
    pub phase: Phase,
    pub context: Context,
}

impl RefreshSnapshot {
    pub fn fees(&self) -> &FeesValue {
        &self.context.fees
    }
}
