use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::support::{
    helpers::{default_config, fees, init_tracing, manual_tick_builder, wait_for_phase, wait_until},
    scripted_source::{Scripted, ScriptedSource},
};
use anyhow::Result;
use feewatch::{AsyncValue, Endpoint, FetchErrorKind, Phase, RefreshController, RefreshSnapshot};
use tokio::time::{sleep, Instant};

fn record_snapshots(handle: &feewatch::RefreshHandle) -> Arc<Mutex<Vec<RefreshSnapshot>>> {
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    let mut snapshots = handle.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            sink.lock().expect("recorder poisoned").push(snapshot);
        }
    });
    recorded
}

#[tokio::test(start_paused = true)]
async fn load_resolves_into_polling() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(12))]);
    let mut controller = RefreshController::new(default_config(), source.clone());
    let handle = controller.start().await?;

    assert_eq!(handle.snapshot().phase, Phase::Idle);
    handle.load().await?;
    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;

    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(12)));
    assert_eq!(snapshot.context.retries, 0);
    assert_eq!(snapshot.context.ticks, 0);
    assert_eq!(source.calls(), vec![Endpoint::default()]);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_backs_off_linearly() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([
        Scripted::fail("connection refused"),
        Scripted::fail("connection reset"),
        Scripted::ok(fees(20)),
    ]);
    let mut controller = RefreshController::new(default_config(), source.clone());
    let handle = controller.start().await?;
    let recorded = record_snapshots(&handle);

    let started = Instant::now();
    handle.load().await?;
    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;

    assert!(
        started.elapsed() >= Duration::from_millis(3_000),
        "retries should wait 1s then 2s, took {:?}",
        started.elapsed()
    );
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(20)));
    assert_eq!(snapshot.context.retries, 0);
    assert_eq!(source.call_count(), 3);

    let pending: Vec<u32> = recorded
        .lock()
        .expect("recorder poisoned")
        .iter()
        .filter(|snapshot| snapshot.phase == Phase::RetryPending)
        .map(|snapshot| snapshot.context.retries)
        .collect();
    assert_eq!(pending, vec![1, 2]);

    let telemetry = controller.telemetry().snapshot();
    assert_eq!(telemetry.retries_scheduled, 2);
    assert_eq!(telemetry.fetch_failures, 2);
    assert_eq!(telemetry.fetch_successes, 1);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_failure_until_next_load() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([
        Scripted::fail("503"),
        Scripted::fail("503"),
        Scripted::fail("503"),
    ]);
    let mut controller = RefreshController::new(default_config(), source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    let snapshot = wait_until(&handle, |snapshot| {
        snapshot.phase == Phase::Idle && snapshot.context.fees.is_failed()
    })
    .await?;
    let error = snapshot.context.fees.error().expect("failure should surface");
    assert_eq!(error.kind(), FetchErrorKind::Transport);
    assert_eq!(source.call_count(), 3);

    // No polling or retry restarts on its own.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(handle.snapshot().phase, Phase::Idle);
    assert_eq!(source.call_count(), 3);

    source.push([Scripted::ok(fees(6))]);
    handle.load().await?;
    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(6)));
    assert_eq!(snapshot.context.retries, 0);
    assert_eq!(controller.telemetry().snapshot().retries_exhausted, 1);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ticker_forces_refresh_after_poll_span() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([
        Scripted::ok(fees(7)),
        Scripted::ok(fees(9)).after(Duration::from_millis(500)),
    ]);
    let mut controller = RefreshController::new(default_config(), source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::Polling).await?;
    let polling_since = Instant::now();

    let snapshot = wait_for_phase(&handle, Phase::FetchInFlight).await?;
    let waited = polling_since.elapsed();
    assert!(
        waited >= Duration::from_millis(3_000) && waited < Duration::from_millis(4_000),
        "refresh should be forced on the third tick, waited {waited:?}"
    );
    assert_eq!(snapshot.context.ticks, 0);
    assert_eq!(snapshot.context.fees, AsyncValue::Loading(Some(fees(7))));

    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(9)));

    let telemetry = controller.telemetry().snapshot();
    assert_eq!(telemetry.forced_refreshes, 1);
    assert_eq!(telemetry.ticks, 3);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn injected_ticks_count_towards_poll_span() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([
        Scripted::ok(fees(3)),
        Scripted::ok(fees(4)).after(Duration::from_secs(1)),
    ]);
    let config = manual_tick_builder().build()?;
    let mut controller = RefreshController::new(config, source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::Polling).await?;

    handle.tick().await?;
    wait_until(&handle, |snapshot| snapshot.context.ticks == 1).await?;
    handle.tick().await?;
    let snapshot = wait_until(&handle, |snapshot| snapshot.context.ticks == 2).await?;
    assert_eq!(snapshot.phase, Phase::Polling);

    handle.tick().await?;
    let snapshot = wait_for_phase(&handle, Phase::FetchInFlight).await?;
    assert_eq!(snapshot.context.ticks, 0);
    assert_eq!(snapshot.context.fees.last_value(), Some(&fees(3)));

    // Ticks are ignored while the refresh is in flight.
    handle.tick().await?;
    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(4)));
    assert_eq!(snapshot.context.ticks, 0);
    assert_eq!(source.call_count(), 2);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn load_supersedes_in_flight_fetch() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([
        Scripted::ok(fees(1)),
        Scripted::ok(fees(50)).after(Duration::from_secs(10)),
        Scripted::ok(fees(2)).after(Duration::from_millis(100)),
    ]);
    let config = manual_tick_builder().build()?;
    let mut controller = RefreshController::new(config, source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::Polling).await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::FetchInFlight).await?;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.call_count(), 2);
    handle.load().await?;

    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(2)));

    // The superseded attempt would have answered by now.
    sleep(Duration::from_secs(20)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Polling);
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(2)));
    assert_eq!(source.call_count(), 3);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn load_during_backoff_cancels_pending_retry() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::fail("timeout"), Scripted::ok(fees(5))]);
    let config = manual_tick_builder().build()?;
    let mut controller = RefreshController::new(config, source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::RetryPending).await?;
    handle.load().await?;

    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(5)));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(source.call_count(), 2, "cancelled retry must not fetch");
    assert_eq!(handle.snapshot().phase, Phase::Polling);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn endpoint_change_applies_to_scheduled_retry() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::fail("dns"), Scripted::ok(fees(11))]);
    let mut controller = RefreshController::new(default_config(), source.clone());
    let handle = controller.start().await?;

    handle.load().await?;
    wait_for_phase(&handle, Phase::RetryPending).await?;

    let blockstream = Endpoint::new("blockstream")?;
    handle.change_endpoint(blockstream.clone()).await?;
    let snapshot = wait_until(&handle, |snapshot| snapshot.context.endpoint == blockstream).await?;
    assert_eq!(snapshot.phase, Phase::RetryPending);

    wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(source.calls(), vec![Endpoint::default(), blockstream]);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(1)).after(Duration::from_secs(60))]);
    let config = manual_tick_builder()
        .max_retries(0)
        .fetch_timeout(Duration::from_secs(2))
        .build()?;
    let mut controller = RefreshController::new(config, source);
    let handle = controller.start().await?;

    handle.load().await?;
    let snapshot = wait_until(&handle, |snapshot| snapshot.context.fees.is_failed()).await?;
    assert_eq!(snapshot.phase, Phase::Idle);
    let error = snapshot.context.fees.error().expect("timeout should surface");
    assert_eq!(error.kind(), FetchErrorKind::Timeout);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn independent_controllers_do_not_share_timers() -> Result<()> {
    init_tracing();
    let first_source = ScriptedSource::new([Scripted::ok(fees(1))]);
    let second_source = ScriptedSource::new([Scripted::ok(fees(2))]);
    let mut first = RefreshController::new(default_config(), first_source);
    let mut second = RefreshController::new(manual_tick_builder().build()?, second_source.clone());

    let first_handle = first.start().await?;
    let second_handle = second.start().await?;
    first_handle.load().await?;
    second_handle.load().await?;
    wait_for_phase(&first_handle, Phase::Polling).await?;
    wait_for_phase(&second_handle, Phase::Polling).await?;

    first.stop().await?;
    sleep(Duration::from_secs(10)).await;

    let snapshot = second_handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Polling);
    assert_eq!(snapshot.context.ticks, 0);
    assert_eq!(second_source.call_count(), 1);

    second.stop().await?;
    Ok(())
}
