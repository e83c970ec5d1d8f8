//! Drains the buffered last-active timestamps into one batched UPDATE and
//! trims stale presence entries.

use crate::auth_token::now_epoch;
use crate::context::ServerContext;
use crate::error::Result;

/// Presence entries older than this are evicted from the online set.
const ONLINE_EVICT_HORIZON_SECS: i64 = 300;

pub async fn run_tick(ctx: &ServerContext) -> Result<()> {
    let flushed = ctx.cache.flush_last_active(&ctx.db).await;
    if flushed > 0 {
        log::debug!("Flushed {flushed} last-active timestamps");
    }

    let evicted = ctx
        .cache
        .cleanup_online_players(ONLINE_EVICT_HORIZON_SECS, now_epoch())
        .await;
    if evicted > 0 {
        log::debug!("Evicted {evicted} stale presence entries");
    }

    Ok(())
}
