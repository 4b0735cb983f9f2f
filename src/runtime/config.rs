use crate::runtime::telemetry;
use crate::source::Endpoint;
use crate::state::{PollSchedule, RetryBackoff};
use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_POLL_SPAN: Duration = Duration::from_millis(3_000);
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_millis(1_000);
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Runtime configuration for the fee refresh controller.
///
/// All instances must be constructed via [`RefreshConfig::builder`] or [`RefreshConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    endpoint: Endpoint,
    max_retries: u32,
    poll_interval: Duration,
    max_poll_span: Duration,
    retry_step: Duration,
    fetch_timeout: Duration,
    metrics_interval: Duration,
    event_capacity: usize,
    load_on_start: bool,
}

pub struct RefreshConfigParams {
    pub endpoint: Endpoint,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub max_poll_span: Duration,
    pub retry_step: Duration,
    pub fetch_timeout: Duration,
    pub metrics_interval: Duration,
    pub event_capacity: usize,
    pub load_on_start: bool,
}

impl RefreshConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> RefreshConfigBuilder {
        RefreshConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: RefreshConfigParams) -> Result<Self> {
        let RefreshConfigParams {
            endpoint,
            max_retries,
            poll_interval,
            max_poll_span,
            retry_step,
            fetch_timeout,
            metrics_interval,
            event_capacity,
            load_on_start,
        } = params;

        let config = Self {
            endpoint,
            max_retries,
            poll_interval,
            max_poll_span,
            retry_step,
            fetch_timeout,
            metrics_interval,
            event_capacity,
            load_on_start,
        };

        config.validate()?;
        Ok(config)
    }

    /// Endpoint the controller starts with.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Retries allowed after the first failed fetch before the failure surfaces.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Longest time a successful snapshot is kept before a refresh is forced.
    pub fn max_poll_span(&self) -> Duration {
        self.max_poll_span
    }

    /// Backoff unit; the Nth retry waits N times this.
    pub fn retry_step(&self) -> Duration {
        self.retry_step
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Whether the runner issues a `Load` right after starting the controller.
    pub fn load_on_start(&self) -> bool {
        self.load_on_start
    }

    pub fn retry_backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.max_retries, self.retry_step)
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.max_poll_span)
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.max_poll_span < self.poll_interval {
            bail!(
                "max_poll_span ({}ms) must be at least poll_interval ({}ms)",
                self.max_poll_span.as_millis(),
                self.poll_interval.as_millis(),
            );
        }

        if self.retry_step.is_zero() {
            bail!("retry_step must be greater than 0");
        }

        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.event_capacity == 0 {
            bail!("event_capacity must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RefreshConfigBuilder {
    endpoint: Option<Endpoint>,
    max_retries: Option<u32>,
    poll_interval: Option<Duration>,
    max_poll_span: Option<Duration>,
    retry_step: Option<Duration>,
    fetch_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    event_capacity: Option<usize>,
    load_on_start: Option<bool>,
}

impl RefreshConfigBuilder {
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_poll_span(mut self, span: Duration) -> Self {
        self.max_poll_span = Some(span);
        self
    }

    pub fn retry_step(mut self, step: Duration) -> Self {
        self.retry_step = Some(step);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    pub fn load_on_start(mut self, load: bool) -> Self {
        self.load_on_start = Some(load);
        self
    }

    pub fn build(self) -> Result<RefreshConfig> {
        let params = RefreshConfigParams {
            endpoint: self.endpoint.unwrap_or_default(),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            max_poll_span: self.max_poll_span.unwrap_or(DEFAULT_MAX_POLL_SPAN),
            retry_step: self.retry_step.unwrap_or(DEFAULT_RETRY_STEP),
            fetch_timeout: self
                .fetch_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            event_capacity: self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
            load_on_start: self.load_on_start.unwrap_or(true),
        };

        RefreshConfig::new(params)
    }
}
