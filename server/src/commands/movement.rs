//! Movement: authorize the click, interrupt the running walker, compute the
//! path, commit the new walker. The per-user lock keeps the interruption
//! and the new walker from ever being observed half-done.

use protocol::{Point, ServerEvent};

use crate::auth_token::now_epoch;
use crate::cache::walkers::WalkerState;
use crate::commands::AuthedUser;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

pub async fn handle_move(
    ctx: &ServerContext,
    user: &AuthedUser,
    x: i32,
    y: i32,
) -> Result<Option<serde_json::Value>> {
    let realm = user.require_realm()?;
    let goal = Point::new(x, y);

    // Walk permission first: clicks into walls, water or foreign realm
    // ground never touch state.
    if !ctx.pathfinder.can_walk(goal, realm) {
        return Err(GameServerError::Unreachable);
    }

    let _guard = ctx.user_locks.lock(user.user_id).await;
    let now = now_epoch();

    let start = interrupt_active_walker(ctx, user.user_id).await?;
    let start = match start {
        Some(position) => position,
        None => {
            let row = ctx
                .db
                .players()
                .find_by_id(user.user_id)
                .await?
                .ok_or_else(|| GameServerError::NotFound(format!("player {}", user.user_id)))?;
            Point::new(row.x, row.y)
        }
    };

    let path = ctx.pathfinder.find_path(start, goal, realm).await?;

    let row = ctx.db.walkers().insert(user.user_id, &path, now).await?;
    ctx.cache
        .put_walker(&WalkerState {
            walker_id: row.walker_id,
            user_id: user.user_id,
            positions: path.clone(),
            current_index: 0,
            updated_at: now,
        })
        .await;

    ctx.bus.broadcast_all(ServerEvent::MoveStarted {
        user_id: user.user_id,
        path: path.clone(),
    });

    Ok(Some(serde_json::json!({ "path": path })))
}

/// Tears down the user's active walker, if any: cache entry and row go,
/// the position walked so far is written through, and watchers see
/// `walker:completed {interrupted: true}`. Returns the interruption point.
async fn interrupt_active_walker(ctx: &ServerContext, user_id: i64) -> Result<Option<Point>> {
    let Some(walker_id) = ctx.cache.walker_id_for_user(user_id).await else {
        // Cache may have lost it; the row is authoritative for cleanup.
        ctx.db.walkers().delete_for_user(user_id).await?;
        return Ok(None);
    };

    let state = ctx.cache.walker_by_id(walker_id).await;
    ctx.cache.remove_walker(walker_id, user_id).await;
    ctx.db.walkers().delete_for_user(user_id).await?;

    let Some(state) = state else {
        return Ok(None);
    };

    let position = state.current_position();
    ctx.db
        .players()
        .set_position(user_id, position.x, position.y)
        .await?;
    ctx.cache.invalidate_player(user_id).await;

    ctx.bus.broadcast_all(ServerEvent::WalkerCompleted {
        user_id,
        x: position.x,
        y: position.y,
        interrupted: true,
    });

    Ok(Some(position))
}
