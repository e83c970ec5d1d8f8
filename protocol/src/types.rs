//! Payload types shared by commands and events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three exclusive factions a player picks once.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    A,
    B,
    C,
}

impl Realm {
    pub const ALL: [Realm; 3] = [Realm::A, Realm::B, Realm::C];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Realm::A => "a",
            Realm::B => "b",
            Realm::C => "c",
        }
    }

    /// Parses a realm name case-insensitively, as the war-status feed spells
    /// owners however it likes.
    #[must_use]
    pub fn parse_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Realm::A),
            "b" => Some(Realm::B),
            "c" => Some(Realm::C),
            _ => None,
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in game units.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The ten equipment slots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EquipSlot {
    Head,
    Body,
    Hands,
    Shoulders,
    Legs,
    WeaponR,
    WeaponL,
    RingR,
    RingL,
    Amulet,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 10] = [
        EquipSlot::Head,
        EquipSlot::Body,
        EquipSlot::Hands,
        EquipSlot::Shoulders,
        EquipSlot::Legs,
        EquipSlot::WeaponR,
        EquipSlot::WeaponL,
        EquipSlot::RingR,
        EquipSlot::RingL,
        EquipSlot::Amulet,
    ];

    /// Column name of this slot in the equipment row.
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            EquipSlot::Head => "head",
            EquipSlot::Body => "body",
            EquipSlot::Hands => "hands",
            EquipSlot::Shoulders => "shoulders",
            EquipSlot::Legs => "legs",
            EquipSlot::WeaponR => "weapon_r",
            EquipSlot::WeaponL => "weapon_l",
            EquipSlot::RingR => "ring_r",
            EquipSlot::RingL => "ring_l",
            EquipSlot::Amulet => "amulet",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Weapon,
    Armor,
    Consumable,
    Collectable,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Stat block stored on the item template. Absent stats default to zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemStats {
    pub damage: i64,
    pub armor: i64,
    pub walk_speed: f64,
    pub heal: i64,
    pub mana: i64,
    pub heal_per_tick: i64,
    pub mana_per_tick: i64,
    pub damage_per_tick: i64,
    /// Buff duration in seconds, for consumables that start a spell.
    pub duration: i64,
    /// Re-use cooldown in seconds.
    pub cooldown: i64,
}

/// An item template as preloaded into the catalog cache.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item_id: i64,
    pub template_key: String,
    pub name: String,
    pub item_type: ItemType,
    pub slot: Option<EquipSlot>,
    pub stats: ItemStats,
    pub rarity: Rarity,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntryView {
    pub inventory_id: i64,
    pub item_id: i64,
    pub quantity: i64,
}

/// Slot → inventory id mapping; `None` means the slot is empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentView {
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

impl EquipmentView {
    #[must_use]
    pub fn slot(&self, slot: EquipSlot) -> Option<i64> {
        match slot {
            EquipSlot::Head => self.head,
            EquipSlot::Body => self.body,
            EquipSlot::Hands => self.hands,
            EquipSlot::Shoulders => self.shoulders,
            EquipSlot::Legs => self.legs,
            EquipSlot::WeaponR => self.weapon_r,
            EquipSlot::WeaponL => self.weapon_l,
            EquipSlot::RingR => self.ring_r,
            EquipSlot::RingL => self.ring_l,
            EquipSlot::Amulet => self.amulet,
        }
    }

    pub fn set_slot(&mut self, slot: EquipSlot, value: Option<i64>) {
        match slot {
            EquipSlot::Head => self.head = value,
            EquipSlot::Body => self.body = value,
            EquipSlot::Hands => self.hands = value,
            EquipSlot::Shoulders => self.shoulders = value,
            EquipSlot::Legs => self.legs = value,
            EquipSlot::WeaponR => self.weapon_r = value,
            EquipSlot::WeaponL => self.weapon_l = value,
            EquipSlot::RingR => self.ring_r = value,
            EquipSlot::RingL => self.ring_l = value,
            EquipSlot::Amulet => self.amulet = value,
        }
    }

    /// Occupied slots, in declaration order.
    #[must_use]
    pub fn occupied(&self) -> Vec<(EquipSlot, i64)> {
        EquipSlot::ALL
            .iter()
            .filter_map(|slot| self.slot(*slot).map(|id| (*slot, id)))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TerritoryKind {
    Fort,
    Castle,
    Wall,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerritoryView {
    pub territory_id: i64,
    pub name: String,
    pub kind: TerritoryKind,
    pub owner_realm: Realm,
    pub health: i64,
    pub max_health: i64,
    pub x: i32,
    pub y: i32,
    pub contested: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuperbossView {
    pub boss_id: i64,
    pub name: String,
    pub health: i64,
    pub max_health: i64,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub user_id: i64,
    pub username: String,
    pub realm: Realm,
    pub x: i32,
    pub y: i32,
    pub health: i64,
    pub max_health: i64,
    pub mana: i64,
    pub max_mana: i64,
    pub level: i32,
}

/// Player log severity classes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Warning,
    Combat,
    Capture,
}

impl LogKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Success => "success",
            LogKind::Error => "error",
            LogKind::Warning => "warning",
            LogKind::Combat => "combat",
            LogKind::Capture => "capture",
        }
    }
}

/// One shoutbox entry, as cached and broadcast.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShoutboxView {
    pub entry_id: i64,
    pub username: String,
    pub message: String,
    pub timestamp: i64,
}

/// Editor dataset kinds. Walls and water are impassable for everyone;
/// realm regions are impassable for members of the other realms.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Realm,
    Wall,
    Water,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionData {
    pub region_id: i64,
    pub name: String,
    pub kind: RegionKind,
    pub realm: Option<Realm>,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathData {
    pub path_id: i64,
    pub name: String,
    pub points: Vec<Point>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_names_parse_case_insensitively() {
        assert_eq!(Realm::parse_name("B"), Some(Realm::B));
        assert_eq!(Realm::parse_name(" c "), Some(Realm::C));
        assert_eq!(Realm::parse_name(""), None);
        assert_eq!(Realm::parse_name("midgard"), None);
    }

    #[test]
    fn equipment_view_slot_roundtrip() {
        let mut equipment = EquipmentView::default();
        equipment.set_slot(EquipSlot::WeaponR, Some(42));
        equipment.set_slot(EquipSlot::Amulet, Some(7));

        assert_eq!(equipment.slot(EquipSlot::WeaponR), Some(42));
        assert_eq!(equipment.slot(EquipSlot::Head), None);
        assert_eq!(
            equipment.occupied(),
            vec![(EquipSlot::WeaponR, 42), (EquipSlot::Amulet, 7)]
        );
    }

    #[test]
    fn item_stats_absent_fields_default_to_zero() {
        let stats: ItemStats = serde_json::from_str(r#"{"walkSpeed": 0.25}"#).unwrap();
        assert_eq!(stats.walk_speed, 0.25);
        assert_eq!(stats.damage, 0);
        assert_eq!(stats.cooldown, 0);
    }
}
