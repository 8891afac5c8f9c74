use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::app::AppContext;

pub mod backfill;
pub mod tick;

pub const LIVE_TICK_LOOP: &str = "live_tick";

type LoopFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type LoopFn = fn(AppContext) -> LoopFuture;

/// Spawn the scheduler loops and return their join handles.
pub fn spawn_all(ctx: AppContext) -> Vec<JoinHandle<()>> {
    let intervals = ctx.config.sample_intervals.clone();

    vec![spawn_loop(
        ctx,
        LIVE_TICK_LOOP,
        intervals.live_tick,
        Duration::from_secs(10),
        poll_live_tick,
    )]
}

/// Run the historical backfill once, detached from the tick schedule.
pub fn spawn_backfill(ctx: AppContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        match backfill::run(&ctx).await {
            Ok(written) => {
                info!(written, "historical backfill finished");
                ctx.state.record_loop_success("backfill").await;
            }
            Err(err) => {
                error!(error = ?err, "historical backfill failed");
                ctx.state
                    .record_loop_failure("backfill", err.to_string())
                    .await;
            }
        }
    })
}

fn spawn_loop(
    ctx: AppContext,
    loop_name: &'static str,
    interval: Duration,
    budget: Duration,
    poll_fn: LoopFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            loop_name,
            interval = ?interval,
            budget = ?budget,
            "starting scheduler loop"
        );

        // tokio::time::interval() completes the first tick immediately, so the
        // population gets fresh samples at startup instead of one period later.
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = poll_once(ctx.clone(), loop_name, budget, poll_fn).await {
                error!(loop_name, error = ?err, "scheduler loop iteration failed");
            }
        }
    })
}

async fn poll_once(
    ctx: AppContext,
    loop_name: &'static str,
    budget: Duration,
    poll_fn: LoopFn,
) -> Result<()> {
    let start = Instant::now();
    match poll_fn(ctx.clone()).await {
        Ok(_) => {
            let elapsed = start.elapsed();
            ctx.metrics.observe_duration(loop_name, elapsed);
            if elapsed > budget {
                warn!(
                    loop_name,
                    elapsed = ?elapsed,
                    budget = ?budget,
                    "loop exceeded budget"
                );
            }
            ctx.metrics.record_success(loop_name, true);
            ctx.state.record_loop_success(loop_name).await;
            Ok(())
        }
        Err(err) => {
            ctx.metrics.record_success(loop_name, false);
            ctx.metrics.inc_error(loop_name);
            ctx.state
                .record_loop_failure(loop_name, err.to_string())
                .await;
            Err(err)
        }
    }
}

fn poll_live_tick(ctx: AppContext) -> LoopFuture {
    Box::pin(async move { tick::run(&ctx).await })
}
