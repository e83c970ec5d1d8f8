//! Collectable claims. The claim is a single-key CAS in the cache; the
//! pickup itself happens when the walker tick sees the collector arrive.

use protocol::ServerEvent;

use crate::auth_token::now_epoch;
use crate::commands::AuthedUser;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

pub async fn handle_collect(
    ctx: &ServerContext,
    user: &AuthedUser,
    spawn_id: i64,
) -> Result<Option<serde_json::Value>> {
    let spawn = ctx
        .spawns
        .iter()
        .find(|spawn| spawn.spawn_id == spawn_id)
        .ok_or_else(|| GameServerError::NotFound(format!("spawn {spawn_id}")))?;

    if !ctx
        .cache
        .try_begin_collect(spawn.spawn_id, user.user_id, now_epoch())
        .await
    {
        // Loser of the race: ack error, no broadcast.
        return Err(GameServerError::AlreadyBeingCollected);
    }

    ctx.bus.broadcast_all(ServerEvent::CollectableCollecting {
        spawn_id: spawn.spawn_id,
        user_id: user.user_id,
    });

    Ok(None)
}
