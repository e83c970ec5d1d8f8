//! Inventory and equipment: slot-checked equips, occupant swaps, consumable
//! use with buff replacement and cooldowns.

use protocol::{EquipSlot, ItemType, ItemView, LogKind, ServerEvent};

use crate::commands::AuthedUser;
use crate::context::ServerContext;
use crate::db::NewSpell;
use crate::error::{GameServerError, Result};

pub async fn handle_equip(
    ctx: &ServerContext,
    user: &AuthedUser,
    inventory_id: i64,
    slot: EquipSlot,
) -> Result<Option<serde_json::Value>> {
    let _guard = ctx.user_locks.lock(user.user_id).await;

    let entry = ctx
        .db
        .inventory()
        .find_entry(inventory_id)
        .await?
        .filter(|entry| entry.user_id == user.user_id)
        .ok_or_else(|| GameServerError::NotFound(format!("inventory entry {inventory_id}")))?;

    let item = ctx
        .cache
        .get_item_by_id(&ctx.db, entry.item_id)
        .await?
        .ok_or_else(|| GameServerError::NotFound(format!("item {}", entry.item_id)))?;

    // The item's declared slot must match the requested one.
    if item.slot != Some(slot) {
        return Err(GameServerError::InvalidCommand(format!(
            "{} does not fit that slot",
            item.name
        )));
    }

    let equipment = ctx.db.equipment().get_or_create(user.user_id).await?;
    let view = equipment.to_view();

    // An entry may occupy at most one slot.
    for (occupied_slot, occupant) in view.occupied() {
        if occupant == inventory_id && occupied_slot != slot {
            return Err(GameServerError::InvalidCommand(
                "item is already equipped".to_string(),
            ));
        }
    }

    // Replacing the slot's reference is the whole swap: the previous
    // occupant's inventory entry never left the inventory table.
    ctx.db
        .equipment()
        .set_slot(user.user_id, slot, Some(inventory_id))
        .await?;

    ctx.cache.invalidate_walk_speed(user.user_id).await;
    send_inventory_refresh(ctx, user.user_id).await?;

    Ok(None)
}

pub async fn handle_unequip(
    ctx: &ServerContext,
    user: &AuthedUser,
    slot: EquipSlot,
) -> Result<Option<serde_json::Value>> {
    let _guard = ctx.user_locks.lock(user.user_id).await;

    ctx.db.equipment().set_slot(user.user_id, slot, None).await?;

    ctx.cache.invalidate_walk_speed(user.user_id).await;
    send_inventory_refresh(ctx, user.user_id).await?;

    Ok(None)
}

pub async fn handle_use(
    ctx: &ServerContext,
    user: &AuthedUser,
    inventory_id: i64,
) -> Result<Option<serde_json::Value>> {
    let _guard = ctx.user_locks.lock(user.user_id).await;

    let entry = ctx
        .db
        .inventory()
        .find_entry(inventory_id)
        .await?
        .filter(|entry| entry.user_id == user.user_id)
        .ok_or_else(|| GameServerError::NotFound(format!("inventory entry {inventory_id}")))?;

    let item = ctx
        .cache
        .get_item_by_id(&ctx.db, entry.item_id)
        .await?
        .ok_or_else(|| GameServerError::NotFound(format!("item {}", entry.item_id)))?;

    if item.item_type != ItemType::Consumable {
        return Err(GameServerError::InvalidCommand(format!(
            "{} is not consumable",
            item.name
        )));
    }

    // Cooldowns key off the template; the active-spells row carries them.
    if let Some(remaining) = ctx
        .db
        .spells()
        .cooldown_remaining(user.user_id, &item.template_key)
        .await?
    {
        log::debug!(
            "user {} tried {} with {remaining}s cooldown left",
            user.user_id,
            item.template_key
        );
        return Err(GameServerError::OnCooldown);
    }

    ctx.db.inventory().consume_one(inventory_id).await?;

    apply_instant_effect(ctx, user.user_id, &item).await?;

    if item.stats.duration > 0 {
        let spell = NewSpell {
            user_id: user.user_id,
            spell_key: item.template_key.clone(),
            duration: item.stats.duration,
            heal_per_tick: item.stats.heal_per_tick,
            mana_per_tick: item.stats.mana_per_tick,
            damage_per_tick: item.stats.damage_per_tick,
            walk_speed: item.stats.walk_speed,
            cooldown: item.stats.cooldown,
        };
        ctx.db.spells().replace(&spell).await?;

        if item.stats.walk_speed != 0.0 {
            ctx.cache.invalidate_walk_speed(user.user_id).await;
        }
    }

    ctx.log_player(
        user.user_id,
        LogKind::Info,
        &format!("Used {}", item.name),
    )
    .await?;
    send_inventory_refresh(ctx, user.user_id).await?;

    Ok(None)
}

/// Flat heal/mana from the item stats, clamped and announced.
async fn apply_instant_effect(ctx: &ServerContext, user_id: i64, item: &ItemView) -> Result<()> {
    if item.stats.heal == 0 && item.stats.mana == 0 {
        return Ok(());
    }

    let Some(row) = ctx.db.players().find_by_id(user_id).await? else {
        return Ok(());
    };

    let health = (row.health + item.stats.heal).clamp(0, row.max_health);
    let mana = (row.mana + item.stats.mana).clamp(0, row.max_mana);

    ctx.db.players().set_health_mana(user_id, health, mana).await?;
    ctx.cache.invalidate_player(user_id).await;

    ctx.bus.send_to_user(
        user_id,
        ServerEvent::PlayerHealth {
            user_id,
            health,
            max_health: row.max_health,
            mana,
            max_mana: row.max_mana,
        },
    );

    Ok(())
}

/// Full inventory + equipment snapshot to the owner's sockets.
pub async fn send_inventory_refresh(ctx: &ServerContext, user_id: i64) -> Result<()> {
    let inventory = ctx
        .db
        .inventory()
        .list_for_user(user_id)
        .await?
        .iter()
        .map(|row| row.to_view())
        .collect();
    let equipment = ctx.db.equipment().get_or_create(user_id).await?.to_view();

    ctx.bus.send_to_user(
        user_id,
        ServerEvent::InventoryRefresh {
            inventory,
            equipment,
        },
    );

    Ok(())
}
