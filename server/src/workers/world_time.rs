//! The ingame clock: one tick-second span (150s real) is one ingame hour.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use protocol::ServerEvent;

use crate::auth_token::now_epoch;
use crate::context::ServerContext;
use crate::error::Result;

/// Ingame (hour, minute) for a wall clock instant.
pub fn compute_ingame_time(started_at: i64, tick_seconds: i64, now: i64) -> (u8, u8) {
    let tick_seconds = tick_seconds.max(1);
    let elapsed = (now - started_at).max(0);

    let hour = ((elapsed / tick_seconds) % 24) as u8;
    let minute = ((elapsed % tick_seconds) * 60 / tick_seconds) as u8;
    (hour, minute)
}

pub fn spawn(ctx: ServerContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(ctx.config.ticks.world_time_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_persisted = (u8::MAX, u8::MAX);
        let mut last_persist_at: i64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = run_tick(&ctx, &mut last_persisted, &mut last_persist_at).await {
                        log::error!("world-time tick failed: {err}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("world-time worker stopping");
                        break;
                    }
                }
            }
        }
    })
}

async fn run_tick(
    ctx: &ServerContext,
    last_persisted: &mut (u8, u8),
    last_persist_at: &mut i64,
) -> Result<()> {
    let now = now_epoch();
    let row = ctx.db.server_time().get_or_init(now).await?;
    let (hour, minute) = compute_ingame_time(row.started_at, row.tick_seconds, now);

    let minute_changed = (hour, minute) != *last_persisted;
    let deadline_passed = now - *last_persist_at >= 300;
    if minute_changed || deadline_passed {
        ctx.db
            .server_time()
            .update_clock(hour as i32, minute as i32)
            .await?;
        *last_persisted = (hour, minute);
        *last_persist_at = now;
    }

    let cached = ctx.cache.cached_ingame_time().await;
    if cached != Some((hour, minute)) {
        ctx.cache.cache_ingame_time(hour, minute).await;
        ctx.bus.broadcast_all(ServerEvent::TimeUpdate {
            ingame_hour: hour,
            ingame_minute: minute,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_midnight() {
        assert_eq!(compute_ingame_time(1_000, 150, 1_000), (0, 0));
    }

    #[test]
    fn one_tick_second_span_is_one_ingame_hour() {
        assert_eq!(compute_ingame_time(0, 150, 150), (1, 0));
        assert_eq!(compute_ingame_time(0, 150, 150 * 23), (23, 0));
        // Hour 24 wraps back to midnight.
        assert_eq!(compute_ingame_time(0, 150, 150 * 24), (0, 0));
    }

    #[test]
    fn minutes_interpolate_within_the_hour() {
        // Half a tick span is half an ingame hour.
        assert_eq!(compute_ingame_time(0, 150, 75), (0, 30));
        assert_eq!(compute_ingame_time(0, 150, 149), (0, 59));
    }

    #[test]
    fn clock_never_runs_backwards_from_a_skewed_start() {
        assert_eq!(compute_ingame_time(5_000, 150, 1_000), (0, 0));
    }
}
