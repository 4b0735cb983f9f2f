use std::time::Duration;

use crate::support::{
    helpers::{fees, init_tracing, manual_tick_builder, wait_for_phase},
    scripted_source::{Scripted, ScriptedSource},
};
use anyhow::Result;
use feewatch::{AsyncValue, Phase, Runner};
use tokio::time::{sleep, timeout};

#[tokio::test(start_paused = true)]
async fn runner_start_issues_initial_load() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(8))]);
    let mut runner = Runner::new(manual_tick_builder().build()?, source.clone());

    let handle = runner.start().await?;
    let snapshot = wait_for_phase(&handle, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(8)));

    // Starting again hands back the running controller.
    let again = runner.start().await?;
    assert_eq!(again.snapshot().phase, Phase::Polling);
    assert_eq!(source.call_count(), 1);

    runner.stop().await?;
    assert!(!runner.controller().is_running());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn runner_without_initial_load_stays_idle() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(8))]);
    let config = manual_tick_builder().load_on_start(false).build()?;
    let mut runner = Runner::new(config, source.clone());

    let handle = runner.start().await?;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.snapshot().phase, Phase::Idle);
    assert!(handle.snapshot().context.fees.is_not_asked());
    assert_eq!(source.call_count(), 0);

    runner.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn runner_restarts_after_stop() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(8)), Scripted::ok(fees(9))]);
    let mut runner = Runner::new(manual_tick_builder().build()?, source.clone());

    let first = runner.start().await?;
    wait_for_phase(&first, Phase::Polling).await?;
    runner.stop().await?;
    assert!(first.load().await.is_err());

    let second = runner.start().await?;
    let snapshot = wait_for_phase(&second, Phase::Polling).await?;
    assert_eq!(snapshot.context.fees, AsyncValue::Success(fees(9)));
    assert_eq!(source.call_count(), 2);

    runner.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_until_ctrl_c_returns_on_cancellation() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new([Scripted::ok(fees(8))]);
    let mut runner = Runner::new(manual_tick_builder().build()?, source);
    let token = runner.cancellation_token();

    tokio::spawn(async move {
        sleep(Duration::from_secs(2)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(30), runner.run_until_ctrl_c()).await??;
    assert!(!runner.controller().is_running());
    Ok(())
}
