//! Health regeneration: players (plus active spell effects), territories
//! (only while not contested) and superbosses.

use std::collections::HashMap;

use protocol::{ServerEvent, TerritoryKind};

use crate::auth_token::now_epoch;
use crate::context::ServerContext;
use crate::db::ActiveSpellRow;
use crate::error::Result;

/// Fraction of the maximum regenerated per tick.
pub const PLAYER_HEALTH_REGEN: f64 = 0.01;
pub const PLAYER_MANA_REGEN: f64 = 0.02;
pub const SUPERBOSS_REGEN: f64 = 0.005;

/// Seconds a player must have been seen within to be regenerated.
const ONLINE_THRESHOLD_SECS: i64 = 60;

/// Flat health per tick by territory type.
pub fn territory_regen_rate(kind: TerritoryKind) -> i64 {
    match kind {
        TerritoryKind::Fort => 150,
        TerritoryKind::Castle => 250,
        TerritoryKind::Wall => 100,
    }
}

/// New (health, mana) for one player tick, spell effects included, clamped
/// to `[0, max]`.
pub fn regen_player(
    health: i64,
    max_health: i64,
    mana: i64,
    max_mana: i64,
    spells: &[&ActiveSpellRow],
) -> (i64, i64) {
    let mut health_delta = (max_health as f64 * PLAYER_HEALTH_REGEN) as i64;
    let mut mana_delta = (max_mana as f64 * PLAYER_MANA_REGEN) as i64;

    for spell in spells {
        health_delta += spell.heal_per_tick - spell.damage_per_tick;
        mana_delta += spell.mana_per_tick;
    }

    (
        (health + health_delta).clamp(0, max_health),
        (mana + mana_delta).clamp(0, max_mana),
    )
}

pub async fn run_tick(ctx: &ServerContext) -> Result<()> {
    let now = now_epoch();
    regen_players(ctx, now).await?;
    regen_territories(ctx).await?;
    regen_superbosses(ctx).await?;
    Ok(())
}

async fn regen_players(ctx: &ServerContext, now: i64) -> Result<()> {
    let online = ctx
        .cache
        .get_online_players(&ctx.db, ONLINE_THRESHOLD_SECS, now)
        .await?;
    if online.is_empty() {
        return Ok(());
    }

    let all_spells = ctx.db.spells().all_active().await?;
    let mut by_user: HashMap<i64, Vec<&ActiveSpellRow>> = HashMap::new();
    for spell in &all_spells {
        // Rows lingering only for their cooldown no longer apply effects.
        if spell.remaining > 0 {
            by_user.entry(spell.user_id).or_default().push(spell);
        }
    }

    for player in online {
        let spells = by_user.get(&player.user_id).map(Vec::as_slice).unwrap_or(&[]);
        let (health, mana) = regen_player(
            player.health,
            player.max_health,
            player.mana,
            player.max_mana,
            spells,
        );

        if health == player.health && mana == player.mana {
            continue;
        }

        ctx.db
            .players()
            .set_health_mana(player.user_id, health, mana)
            .await?;

        let mut view = player.clone();
        view.health = health;
        view.mana = mana;
        ctx.cache.cache_player(&view).await;

        ctx.bus.send_to_user(
            player.user_id,
            ServerEvent::PlayerHealth {
                user_id: player.user_id,
                health,
                max_health: player.max_health,
                mana,
                max_mana: player.max_mana,
            },
        );
    }

    Ok(())
}

async fn regen_territories(ctx: &ServerContext) -> Result<()> {
    let territories = ctx.db.territories().all().await?;
    let mut changed = false;

    for territory in &territories {
        if territory.contested {
            // Contested territories never regenerate; the flag clears only
            // once health is fully restored from outside.
            if territory.health >= territory.max_health {
                ctx.db
                    .territories()
                    .update_health(territory.territory_id, territory.health, false, None)
                    .await?;
                changed = true;
            }
            continue;
        }

        if territory.health >= territory.max_health {
            continue;
        }

        let rate = territory_regen_rate(territory.kind()?);
        let health = (territory.health + rate).min(territory.max_health);
        let contested_since = if health >= territory.max_health {
            None
        } else {
            territory.contested_since
        };

        ctx.db
            .territories()
            .update_health(territory.territory_id, health, false, contested_since)
            .await?;
        changed = true;
    }

    if changed {
        ctx.cache.invalidate_territories().await;
        let views = ctx.cache.territories(&ctx.db).await?;
        ctx.bus
            .broadcast_all(ServerEvent::TerritoriesUpdate { territories: views });
    }

    Ok(())
}

async fn regen_superbosses(ctx: &ServerContext) -> Result<()> {
    let bosses = ctx.db.superbosses().all().await?;
    let mut changed = false;

    for boss in &bosses {
        // Dead bosses stay dead; full bosses have nothing to do.
        if boss.health <= 0 || boss.health >= boss.max_health {
            continue;
        }

        let regen = ((boss.max_health as f64 * SUPERBOSS_REGEN) as i64).max(1);
        let health = (boss.health + regen).min(boss.max_health);
        ctx.db.superbosses().update_health(boss.boss_id, health).await?;
        changed = true;
    }

    if changed {
        ctx.cache.invalidate_superbosses().await;
        let views = ctx.cache.superbosses(&ctx.db).await?;
        ctx.bus
            .broadcast_all(ServerEvent::SuperbossesHealth { bosses: views });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spell(heal: i64, mana: i64, damage: i64) -> ActiveSpellRow {
        ActiveSpellRow {
            spell_id: 1,
            user_id: 1,
            spell_key: "test".to_string(),
            duration: 10,
            remaining: 5,
            heal_per_tick: heal,
            mana_per_tick: mana,
            damage_per_tick: damage,
            walk_speed: 0.0,
            cooldown: 0,
        }
    }

    #[test]
    fn regen_clamps_to_max() {
        let (health, mana) = regen_player(9_990, 10_000, 499, 500, &[]);
        assert_eq!(health, 10_000);
        assert_eq!(mana, 500);
    }

    #[test]
    fn spell_effects_apply_per_tick() {
        let heal = spell(50, 20, 0);
        let (health, mana) = regen_player(1_000, 10_000, 100, 500, &[&heal]);
        // 1% of 10_000 = 100 regen + 50 heal; 2% of 500 = 10 + 20 mana.
        assert_eq!(health, 1_150);
        assert_eq!(mana, 130);
    }

    #[test]
    fn damage_over_time_never_drops_below_zero() {
        let poison = spell(0, 0, 10_000);
        let (health, _) = regen_player(50, 10_000, 0, 500, &[&poison]);
        assert_eq!(health, 0);
    }

    #[test]
    fn territory_rates_by_kind() {
        assert_eq!(territory_regen_rate(TerritoryKind::Fort), 150);
        assert_eq!(territory_regen_rate(TerritoryKind::Castle), 250);
        assert_eq!(territory_regen_rate(TerritoryKind::Wall), 100);
    }
}
