use std::time::Duration;

/// Linear retry schedule: the Nth retry waits `N × step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub max_retries: u32,
    pub step: Duration,
}

impl RetryBackoff {
    pub fn new(max_retries: u32, step: Duration) -> Self {
        Self { max_retries, step }
    }

    /// Decides what to do after a failure given how many retries were already spent.
    pub fn next(&self, retries_spent: u32) -> RetryDisposition {
        if retries_spent >= self.max_retries {
            return RetryDisposition::Exhausted;
        }

        let retry = retries_spent + 1;
        RetryDisposition::Retry {
            retry,
            delay: self.delay_for(retry),
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry { retry: u32, delay: Duration },
    Exhausted,
}

/// Tick accounting for the polling phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_span: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_span: Duration) -> Self {
        Self { interval, max_span }
    }

    /// Whether the tick that would bring the count to `ticks + 1` reaches the span.
    pub fn span_reached(&self, ticks: u32) -> bool {
        let elapsed = self.interval.saturating_mul(ticks.saturating_add(1));
        elapsed >= self.max_span
    }

    /// Number of ticks delivered in `Polling` before a refresh is forced.
    pub fn ticks_per_refresh(&self) -> u32 {
        if self.interval.is_zero() {
            return if self.max_span.is_zero() { 1 } else { u32::MAX };
        }
        let ticks = self.max_span.as_nanos().div_ceil(self.interval.as_nanos());
        u32::try_from(ticks.max(1)).unwrap_or(u32::MAX)
    }
}
