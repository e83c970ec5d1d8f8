//! Spell countdown: one decrement per tick for remaining duration and
//! cooldowns; expiry removes the row, invalidates the owner's walk speed
//! and notifies them.

use protocol::ServerEvent;

use crate::context::ServerContext;
use crate::error::Result;

pub async fn run_tick(ctx: &ServerContext) -> Result<()> {
    let expired = ctx.db.spells().tick_all().await?;

    for spell in expired {
        // A walk-speed buff just fell off; the aggregate must recompute.
        if spell.walk_speed != 0.0 {
            ctx.cache.invalidate_walk_speed(spell.user_id).await;
        }

        ctx.bus.send_to_user(
            spell.user_id,
            ServerEvent::SpellExpired {
                user_id: spell.user_id,
                spell_key: spell.spell_key,
            },
        );
    }

    Ok(())
}
