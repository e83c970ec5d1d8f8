//! Walker advancement: one waypoint per tick (more under a walk-speed
//! buff), cache-only index writes, relational write-through only on
//! completion.

use protocol::{LogKind, Rarity, ServerEvent};

use crate::auth_token::now_epoch;
use crate::cache::catalog::level_for_xp;
use crate::cache::collectables::CollectableState;
use crate::cache::walkers::WalkerState;
use crate::context::ServerContext;
use crate::error::Result;
use crate::geometry::distance;

/// How close a walker must be to a spawn to pick it up.
pub const COLLECT_RADIUS: f64 = protocol::GRID_STEP as f64;

/// XP granted for picking up a collectable of the given rarity.
pub fn collect_xp(rarity: Rarity) -> i64 {
    match rarity {
        Rarity::Common => 10,
        Rarity::Uncommon => 25,
        Rarity::Rare => 75,
        Rarity::Epic => 200,
        Rarity::Legendary => 500,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerAdvance {
    Stepped,
    Completed,
}

/// Indices advanced per tick for a walk-speed aggregate; always at least 1.
pub fn advance_count(walk_speed: f64) -> usize {
    walk_speed.max(1.0).floor() as usize
}

/// Advances the walker in place, clamped to the final index.
pub fn advance_walker(state: &mut WalkerState, steps: usize) -> WalkerAdvance {
    let last = state.positions.len().saturating_sub(1);
    state.current_index = (state.current_index + steps.max(1)).min(last);

    if state.current_index >= last {
        WalkerAdvance::Completed
    } else {
        WalkerAdvance::Stepped
    }
}

pub async fn run_tick(ctx: &ServerContext) -> Result<()> {
    let walkers = ctx.cache.all_walkers().await;
    if walkers.is_empty() {
        return Ok(());
    }

    let now = now_epoch();
    for mut walker in walkers {
        let speed = ctx
            .cache
            .walk_speed(&ctx.db, walker.user_id)
            .await
            .unwrap_or(1.0);

        match advance_walker(&mut walker, advance_count(speed)) {
            WalkerAdvance::Stepped => {
                walker.updated_at = now;
                ctx.cache.update_walker(&walker).await;

                let position = walker.current_position();
                ctx.bus.broadcast_all(ServerEvent::WalkerStep {
                    user_id: walker.user_id,
                    x: position.x,
                    y: position.y,
                    index: walker.current_index,
                });
            }
            WalkerAdvance::Completed => {
                let position = walker.current_position();

                ctx.cache.remove_walker(walker.walker_id, walker.user_id).await;
                ctx.db.walkers().delete(walker.walker_id).await?;
                ctx.db
                    .players()
                    .set_position(walker.user_id, position.x, position.y)
                    .await?;
                ctx.cache.invalidate_player(walker.user_id).await;

                ctx.bus.broadcast_all(ServerEvent::WalkerCompleted {
                    user_id: walker.user_id,
                    x: position.x,
                    y: position.y,
                    interrupted: false,
                });
            }
        }

        check_collectable_arrival(ctx, &walker, now).await?;
    }

    Ok(())
}

/// If this walker stands on a spawn it holds the collecting lock for,
/// finish the collection: inventory grant, success log, broadcast.
async fn check_collectable_arrival(
    ctx: &ServerContext,
    walker: &WalkerState,
    now: i64,
) -> Result<()> {
    let position = walker.current_position();

    for spawn in ctx.spawns.iter() {
        let spawn_point = protocol::Point::new(spawn.x, spawn.y);
        if distance(position, spawn_point) > COLLECT_RADIUS {
            continue;
        }

        let state = ctx.cache.collectable_state(spawn.spawn_id).await;
        let CollectableState::Collecting { user_id, .. } = state else {
            continue;
        };
        if user_id != walker.user_id {
            continue;
        }

        if !ctx
            .cache
            .try_finish_collect(spawn.spawn_id, walker.user_id, now)
            .await
        {
            continue;
        }

        let Some(item) = ctx
            .cache
            .get_item_by_template(&ctx.db, &spawn.template_key)
            .await?
        else {
            log::warn!(
                "spawn {} references unknown template {}",
                spawn.spawn_id,
                spawn.template_key
            );
            continue;
        };

        ctx.db
            .inventory()
            .add_item(walker.user_id, item.item_id, 1)
            .await?;

        ctx.log_player(
            walker.user_id,
            LogKind::Success,
            &format!("Picked up {}", item.name),
        )
        .await?;

        grant_collect_xp(ctx, walker.user_id, item.rarity).await?;

        ctx.bus.broadcast_all(ServerEvent::CollectableCollected {
            spawn_id: spawn.spawn_id,
            user_id: walker.user_id,
            item_id: item.item_id,
        });
    }

    Ok(())
}

/// XP for the pickup, with a level-up check against the cached thresholds.
async fn grant_collect_xp(ctx: &ServerContext, user_id: i64, rarity: Rarity) -> Result<()> {
    let xp = ctx.db.players().add_xp(user_id, collect_xp(rarity)).await?;

    let table = ctx.cache.level_table().await;
    let level = level_for_xp(&table, xp);

    if let Some(row) = ctx.db.players().find_by_id(user_id).await? {
        if level > row.level {
            ctx.db.players().set_level(user_id, level).await?;
            ctx.cache.invalidate_player(user_id).await;
            ctx.log_player(user_id, LogKind::Success, &format!("Reached level {level}"))
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Point;

    fn walker(len: usize, index: usize) -> WalkerState {
        WalkerState {
            walker_id: 1,
            user_id: 9,
            positions: (0..len).map(|i| Point::new(i as i32 * 32, 0)).collect(),
            current_index: index,
            updated_at: 0,
        }
    }

    #[test]
    fn index_stays_in_bounds_for_any_tick_sequence() {
        let mut state = walker(5, 0);
        for _ in 0..20 {
            advance_walker(&mut state, 1);
            assert!(state.current_index < state.positions.len());
        }
        assert_eq!(state.current_index, 4);
    }

    #[test]
    fn four_waypoint_walk_completes_on_fourth_tick() {
        // Matches the 100→132→164→196→200 shape: 5 waypoints, 4 ticks.
        let mut state = walker(5, 0);

        assert_eq!(advance_walker(&mut state, 1), WalkerAdvance::Stepped);
        assert_eq!(advance_walker(&mut state, 1), WalkerAdvance::Stepped);
        assert_eq!(advance_walker(&mut state, 1), WalkerAdvance::Stepped);
        assert_eq!(advance_walker(&mut state, 1), WalkerAdvance::Completed);
        assert_eq!(state.current_position(), Point::new(128, 0));
    }

    #[test]
    fn speed_multiplier_advances_multiple_indices() {
        let mut state = walker(10, 0);
        assert_eq!(advance_walker(&mut state, advance_count(2.7)), WalkerAdvance::Stepped);
        assert_eq!(state.current_index, 2);

        // A big multiplier clamps to the final index and completes.
        assert_eq!(advance_walker(&mut state, advance_count(50.0)), WalkerAdvance::Completed);
        assert_eq!(state.current_index, 9);
    }

    #[test]
    fn one_element_path_completes_immediately() {
        let mut state = walker(1, 0);
        assert_eq!(advance_walker(&mut state, 1), WalkerAdvance::Completed);
        assert_eq!(state.current_index, 0);
    }

    #[test]
    fn advance_count_floors_and_clamps() {
        assert_eq!(advance_count(0.0), 1);
        assert_eq!(advance_count(1.0), 1);
        assert_eq!(advance_count(1.9), 1);
        assert_eq!(advance_count(3.2), 3);
    }
}
