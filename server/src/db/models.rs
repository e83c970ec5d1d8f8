use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use protocol::{
    EquipSlot, EquipmentView, InventoryEntryView, ItemStats, ItemType, ItemView, LogKind, PathData,
    PlayerView, Point, Rarity, Realm, RegionData, RegionKind, SuperbossView, TerritoryKind,
    TerritoryView,
};

use crate::error::{GameServerError, Result};

/// Parses a lowercase keyword column into its protocol enum.
pub fn parse_kw<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| GameServerError::Internal(format!("unknown keyword in database: {raw}")))
}

/// Renders a protocol enum into its lowercase keyword column value.
pub fn kw_string<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerRow {
    pub user_id: i64,
    pub username: String,
    pub realm: Option<String>,
    pub x: i32,
    pub y: i32,
    pub health: i64,
    pub max_health: i64,
    pub mana: i64,
    pub max_mana: i64,
    pub level: i32,
    pub xp: i64,
    pub is_gm: bool,
    pub last_active: i64,
}

impl PlayerRow {
    pub fn realm(&self) -> Option<Realm> {
        self.realm.as_deref().and_then(Realm::parse_name)
    }

    /// View for broadcast payloads; `None` until the player picked a realm.
    pub fn to_view(&self) -> Option<PlayerView> {
        Some(PlayerView {
            user_id: self.user_id,
            username: self.username.clone(),
            realm: self.realm()?,
            x: self.x,
            y: self.y,
            health: self.health,
            max_health: self.max_health,
            mana: self.mana,
            max_mana: self.max_mana,
            level: self.level,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub item_id: i64,
    pub template_key: String,
    pub name: String,
    pub item_type: String,
    pub slot: Option<String>,
    pub stats: Json<ItemStats>,
    pub rarity: String,
}

impl ItemRow {
    pub fn to_view(&self) -> Result<ItemView> {
        let item_type: ItemType = parse_kw(&self.item_type)?;
        let slot: Option<EquipSlot> = match &self.slot {
            Some(raw) => Some(parse_kw(raw)?),
            None => None,
        };
        let rarity: Rarity = parse_kw(&self.rarity)?;

        Ok(ItemView {
            item_id: self.item_id,
            template_key: self.template_key.clone(),
            name: self.name.clone(),
            item_type,
            slot,
            stats: self.stats.0.clone(),
            rarity,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InventoryRow {
    pub inventory_id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i64,
}

impl InventoryRow {
    pub fn to_view(&self) -> InventoryEntryView {
        InventoryEntryView {
            inventory_id: self.inventory_id,
            item_id: self.item_id,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EquipmentRow {
    pub user_id: i64,
    pub head: Option<i64>,
    pub body: Option<i64>,
    pub hands: Option<i64>,
    pub shoulders: Option<i64>,
    pub legs: Option<i64>,
    pub weapon_r: Option<i64>,
    pub weapon_l: Option<i64>,
    pub ring_r: Option<i64>,
    pub ring_l: Option<i64>,
    pub amulet: Option<i64>,
}

impl EquipmentRow {
    pub fn to_view(&self) -> EquipmentView {
        EquipmentView {
            head: self.head,
            body: self.body,
            hands: self.hands,
            shoulders: self.shoulders,
            legs: self.legs,
            weapon_r: self.weapon_r,
            weapon_l: self.weapon_l,
            ring_r: self.ring_r,
            ring_l: self.ring_l,
            amulet: self.amulet,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TerritoryRow {
    pub territory_id: i64,
    pub name: String,
    pub kind: String,
    pub owner_realm: String,
    pub health: i64,
    pub max_health: i64,
    pub x: i32,
    pub y: i32,
    pub contested: bool,
    pub contested_since: Option<i64>,
}

impl TerritoryRow {
    pub fn kind(&self) -> Result<TerritoryKind> {
        parse_kw(&self.kind)
    }

    pub fn to_view(&self) -> Result<TerritoryView> {
        Ok(TerritoryView {
            territory_id: self.territory_id,
            name: self.name.clone(),
            kind: self.kind()?,
            owner_realm: Realm::parse_name(&self.owner_realm).ok_or_else(|| {
                GameServerError::Internal(format!(
                    "territory {} has unknown realm {}",
                    self.territory_id, self.owner_realm
                ))
            })?,
            health: self.health,
            max_health: self.max_health,
            x: self.x,
            y: self.y,
            contested: self.contested,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SuperbossRow {
    pub boss_id: i64,
    pub name: String,
    pub health: i64,
    pub max_health: i64,
    pub x: i32,
    pub y: i32,
}

impl SuperbossRow {
    pub fn to_view(&self) -> SuperbossView {
        SuperbossView {
            boss_id: self.boss_id,
            name: self.name.clone(),
            health: self.health,
            max_health: self.max_health,
            x: self.x,
            y: self.y,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WalkerRow {
    pub walker_id: i64,
    pub user_id: i64,
    pub positions: Json<Vec<(i32, i32)>>,
    pub current_index: i32,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ActiveSpellRow {
    pub spell_id: i64,
    pub user_id: i64,
    pub spell_key: String,
    pub duration: i64,
    pub remaining: i64,
    pub heal_per_tick: i64,
    pub mana_per_tick: i64,
    pub damage_per_tick: i64,
    pub walk_speed: f64,
    pub cooldown: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServerTimeRow {
    pub started_at: i64,
    pub tick_seconds: i64,
    pub ingame_hour: i32,
    pub ingame_minute: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerLogRow {
    pub log_id: i64,
    pub user_id: i64,
    pub message: String,
    pub log_type: String,
    pub created_at: i64,
}

impl PlayerLogRow {
    pub fn log_kind(&self) -> Result<LogKind> {
        parse_kw(&self.log_type)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserSettingsRow {
    pub user_id: i64,
    pub settings: Json<serde_json::Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ShoutboxRow {
    pub entry_id: i64,
    pub username: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct TerritoryCaptureRow {
    pub capture_id: i64,
    pub territory_id: i64,
    pub previous_realm: String,
    pub new_realm: String,
    pub captured_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct RegionRow {
    pub region_id: i64,
    pub name: String,
    pub kind: String,
    pub realm: Option<String>,
    pub points: Json<Vec<(i32, i32)>>,
}

impl RegionRow {
    pub fn to_data(&self) -> Result<RegionData> {
        let kind: RegionKind = parse_kw(&self.kind)?;
        Ok(RegionData {
            region_id: self.region_id,
            name: self.name.clone(),
            kind,
            realm: self.realm.as_deref().and_then(Realm::parse_name),
            points: points_from_pairs(&self.points.0),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PathRow {
    pub path_id: i64,
    pub name: String,
    pub points: Json<Vec<(i32, i32)>>,
}

impl PathRow {
    pub fn to_data(&self) -> PathData {
        PathData {
            path_id: self.path_id,
            name: self.name.clone(),
            points: points_from_pairs(&self.points.0),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CollectableSpawnRow {
    pub spawn_id: i64,
    pub template_key: String,
    pub x: i32,
    pub y: i32,
    pub respawn_seconds: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScreenshotRow {
    pub screenshot_id: i64,
    pub user_id: i64,
    pub title: String,
    pub data: String,
    pub created_at: i64,
}

pub fn points_from_pairs(pairs: &[(i32, i32)]) -> Vec<Point> {
    pairs.iter().map(|(x, y)| Point::new(*x, *y)).collect()
}

pub fn pairs_from_points(points: &[Point]) -> Vec<(i32, i32)> {
    points.iter().map(|p| (p.x, p.y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_roundtrip_for_protocol_enums() {
        assert_eq!(kw_string(&TerritoryKind::Castle), "castle");
        let parsed: TerritoryKind = parse_kw("castle").unwrap();
        assert_eq!(parsed, TerritoryKind::Castle);

        assert_eq!(kw_string(&EquipSlot::WeaponR), "weaponR");
        let parsed: EquipSlot = parse_kw("weaponR").unwrap();
        assert_eq!(parsed, EquipSlot::WeaponR);
    }

    #[test]
    fn unknown_keyword_is_an_internal_error() {
        let result: Result<TerritoryKind> = parse_kw("citadel");
        assert!(matches!(result, Err(GameServerError::Internal(_))));
    }

    #[test]
    fn point_pair_conversion() {
        let points = vec![Point::new(1, 2), Point::new(3, 4)];
        let pairs = pairs_from_points(&points);
        assert_eq!(pairs, vec![(1, 2), (3, 4)]);
        assert_eq!(points_from_pairs(&pairs), points);
    }
}
