//! Collectable sweep: stale or abandoned `collecting` locks revert to
//! `available`, and collected spawns reappear after their respawn delay.

use protocol::{Point, ServerEvent};

use crate::auth_token::now_epoch;
use crate::cache::collectables::CollectableState;
use crate::context::ServerContext;
use crate::error::Result;

/// Seconds a collecting lock survives without the collector arriving.
pub const COLLECT_TIMEOUT_SECS: i64 = 30;

/// How far the collector may wander before the lock is released.
pub const LEAVE_DISTANCE: f64 = (protocol::GRID_STEP * 3) as f64;

pub async fn run_tick(ctx: &ServerContext) -> Result<()> {
    let now = now_epoch();

    for spawn in ctx.spawns.iter() {
        match ctx.cache.collectable_state(spawn.spawn_id).await {
            CollectableState::Available => {}
            CollectableState::Collecting { user_id, since } => {
                let timed_out = now - since > COLLECT_TIMEOUT_SECS;
                let walked_away = if timed_out {
                    false
                } else {
                    collector_position(ctx, user_id)
                        .await?
                        .map(|position| {
                            crate::geometry::distance(
                                position,
                                Point::new(spawn.x, spawn.y),
                            ) > LEAVE_DISTANCE
                        })
                        .unwrap_or(true)
                };

                if timed_out || walked_away {
                    ctx.cache.reset_collectable(spawn.spawn_id).await;
                    ctx.bus.broadcast_all(ServerEvent::CollectableFailed {
                        spawn_id: spawn.spawn_id,
                    });
                }
            }
            CollectableState::Collected { since } => {
                if now - since >= spawn.respawn_seconds {
                    ctx.cache.reset_collectable(spawn.spawn_id).await;
                }
            }
        }
    }

    Ok(())
}

/// The collector's effective position: the live walker position while
/// walking, the committed player position otherwise.
async fn collector_position(ctx: &ServerContext, user_id: i64) -> Result<Option<Point>> {
    if let Some(walker_id) = ctx.cache.walker_id_for_user(user_id).await {
        if let Some(walker) = ctx.cache.walker_by_id(walker_id).await {
            return Ok(Some(walker.current_position()));
        }
    }

    Ok(ctx
        .db
        .players()
        .find_by_id(user_id)
        .await?
        .map(|row| Point::new(row.x, row.y)))
}
