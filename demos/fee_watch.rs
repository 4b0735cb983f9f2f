use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use feewatch::{
    source_fn, AsyncValue, Endpoint, Fees, FetchError, FetchErrorKind, RefreshConfig,
    RefreshSnapshot, Runner,
};
use tokio::time::sleep;

const DEFAULT_ENDPOINT: &str = "mempool";
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_POLL_SPAN_MS: u64 = 3_000;
const DEFAULT_RETRY_STEP_MS: u64 = 1_000;
const DEFAULT_FAIL_EVERY: u64 = 3;
const DEFAULT_LATENCY_MS: u64 = 150;
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let config = args.to_refresh_config()?;
    println!(
        "Watching fees from {} (poll every {:?}, refresh after {:?}, {} retries)",
        config.endpoint(),
        config.poll_interval(),
        config.max_poll_span(),
        config.max_retries()
    );

    let source = simulated_source(args.fail_every, Duration::from_millis(args.latency_ms));
    let mut runner = Runner::new(config, source);
    let handle = runner.start().await?;

    let mut snapshots = handle.subscribe();
    let printer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            print_snapshot(&snapshot);
        }
    });

    let result = runner.run_until_ctrl_c().await;
    printer.abort();

    let stats = runner.controller().telemetry().snapshot();
    println!(
        "Fetched {} snapshots ({} failures, {} retries, {} forced refreshes)",
        stats.fetch_successes, stats.fetch_failures, stats.retries_scheduled, stats.forced_refreshes
    );
    result
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    feewatch::init_tracing();
}

fn print_snapshot(snapshot: &RefreshSnapshot) {
    let context = &snapshot.context;
    let fees = match &context.fees {
        AsyncValue::NotAsked => "not requested".to_string(),
        AsyncValue::Loading(None) => "loading".to_string(),
        AsyncValue::Loading(Some(fees)) => format!("refreshing (last {})", describe(fees)),
        AsyncValue::Success(fees) => describe(fees),
        AsyncValue::Failed(err) => format!("failed: {err}"),
    };
    println!(
        "[{:>14}] {} ticks={} retries={} {}",
        snapshot.phase.to_string(),
        context.endpoint,
        context.ticks,
        context.retries,
        fees
    );
}

fn describe(fees: &Fees) -> String {
    format!(
        "fastest={} half_hour={} hour={} economy={} minimum={} sat/vB",
        fees.fastest_fee, fees.half_hour_fee, fees.hour_fee, fees.economy_fee, fees.minimum_fee
    )
}

/// Answers with a drifting fee payload and fails every `fail_every`-th call.
fn simulated_source(
    fail_every: u64,
    latency: Duration,
) -> impl feewatch::FeeSource {
    let calls = Arc::new(AtomicU64::new(0));
    source_fn(move |endpoint: Endpoint| {
        let call = calls.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            sleep(latency).await;
            if fail_every > 0 && call % fail_every == 0 {
                return Err(FetchError::transport(
                    endpoint,
                    anyhow::anyhow!("simulated upstream outage on call {call}"),
                ));
            }

            let base = 10 + call % 7;
            let body = serde_json::json!({
                "fastestFee": base + 6,
                "halfHourFee": base + 4,
                "hourFee": base + 2,
                "economyFee": base,
                "minimumFee": 1,
            });
            let bytes = serde_json::to_vec(&body).map_err(|err| {
                FetchError::new(FetchErrorKind::Decode, endpoint.clone(), err.into())
            })?;
            Fees::from_json(&endpoint, &bytes)
        }
    })
}

struct ExampleArgs {
    endpoint: String,
    max_retries: u32,
    poll_interval_ms: u64,
    max_poll_span_ms: u64,
    retry_step_ms: u64,
    fail_every: u64,
    latency_ms: u64,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let endpoint = read_env_or_default("FEEWATCH_ENDPOINT", DEFAULT_ENDPOINT);
        let max_retries = parse_env_with_default::<u32>("FEEWATCH_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let poll_interval_ms =
            parse_env_with_default::<u64>("FEEWATCH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let max_poll_span_ms =
            parse_env_with_default::<u64>("FEEWATCH_MAX_POLL_SPAN_MS", DEFAULT_MAX_POLL_SPAN_MS)?;
        let retry_step_ms =
            parse_env_with_default::<u64>("FEEWATCH_RETRY_STEP_MS", DEFAULT_RETRY_STEP_MS)?;
        let fail_every = parse_env_with_default::<u64>("FEEWATCH_FAIL_EVERY", DEFAULT_FAIL_EVERY)?;
        let latency_ms = parse_env_with_default::<u64>("FEEWATCH_LATENCY_MS", DEFAULT_LATENCY_MS)?;

        ensure!(
            poll_interval_ms > 0,
            "FEEWATCH_POLL_INTERVAL_MS must be greater than 0"
        );
        ensure!(
            retry_step_ms > 0,
            "FEEWATCH_RETRY_STEP_MS must be greater than 0"
        );

        Ok(Self {
            endpoint,
            max_retries,
            poll_interval_ms,
            max_poll_span_ms,
            retry_step_ms,
            fail_every,
            latency_ms,
        })
    }

    fn to_refresh_config(&self) -> Result<RefreshConfig> {
        RefreshConfig::builder()
            .endpoint(Endpoint::new(&self.endpoint)?)
            .max_retries(self.max_retries)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .max_poll_span(Duration::from_millis(self.max_poll_span_ms))
            .retry_step(Duration::from_millis(self.retry_step_ms))
            .build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
