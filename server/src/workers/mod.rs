//! Periodic tick workers. Each runs in its own task at a fixed interval,
//! never overlaps itself, survives panics in an iteration, and observes the
//! shutdown signal between iterations.

pub mod flusher;
pub mod health;
pub mod spawns;
pub mod spells;
pub mod territory;
pub mod walker;
pub mod world_time;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::ServerContext;
use crate::error::Result;

/// Shutdown-aware periodic loop shared by every worker. A tick that fires
/// while the previous iteration still runs is skipped, never overlapped; a
/// panicking or failing iteration is logged and the worker continues.
pub fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    ctx: ServerContext,
    iteration: F,
) -> JoinHandle<()>
where
    F: Fn(ServerContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = AssertUnwindSafe(iteration(ctx.clone()))
                        .catch_unwind()
                        .await;

                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => log::error!("{name} tick failed: {err}"),
                        Err(_) => log::error!("{name} tick panicked; worker continues"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("{name} worker stopping");
                        break;
                    }
                }
            }
        }
    })
}

pub struct WorkerSet {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    /// Signals every worker and waits for the current iterations to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Starts the full worker set: walker, health, spells, world-time,
/// territory, collectable sweep and the last-active flusher.
pub fn spawn_all(ctx: &ServerContext) -> WorkerSet {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticks = &ctx.config.ticks;

    let handles = vec![
        run_periodic(
            "walker",
            Duration::from_secs(ticks.walker_secs),
            shutdown_rx.clone(),
            ctx.clone(),
            |ctx| async move { walker::run_tick(&ctx).await },
        ),
        run_periodic(
            "health",
            Duration::from_secs(ticks.health_secs),
            shutdown_rx.clone(),
            ctx.clone(),
            |ctx| async move { health::run_tick(&ctx).await },
        ),
        run_periodic(
            "spells",
            Duration::from_secs(ticks.spells_secs),
            shutdown_rx.clone(),
            ctx.clone(),
            |ctx| async move { spells::run_tick(&ctx).await },
        ),
        world_time::spawn(ctx.clone(), shutdown_rx.clone()),
        territory::spawn(ctx.clone(), shutdown_rx.clone()),
        run_periodic(
            "spawns",
            Duration::from_secs(ticks.spawns_secs),
            shutdown_rx.clone(),
            ctx.clone(),
            |ctx| async move { spawns::run_tick(&ctx).await },
        ),
        run_periodic(
            "flusher",
            Duration::from_secs(ticks.flush_secs),
            shutdown_rx,
            ctx.clone(),
            |ctx| async move { flusher::run_tick(&ctx).await },
        ),
    ];

    WorkerSet {
        shutdown_tx,
        handles,
    }
}
