//! Server → client messages.

use serde::{Deserialize, Serialize};

use crate::types::{
    EquipmentView, InventoryEntryView, LogKind, PathData, Point, Realm, RegionData, SuperbossView,
    TerritoryView,
};

/// Anything the server writes to a socket: an ack for a command that carried
/// an id, or a named event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerFrame {
    Ack(AckFrame),
    Event(ServerEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AckFrame {
    pub ack: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl AckFrame {
    #[must_use]
    pub fn ok(ack: u64, payload: Option<serde_json::Value>) -> Self {
        Self {
            ack,
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(ack: u64, code: &str, message: String) -> Self {
        Self {
            ack,
            ok: false,
            payload: None,
            error: Some(AckError {
                code: code.to_string(),
                message,
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckError {
    pub code: String,
    pub message: String,
}

/// Every event the server emits, keyed by its wire name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "auth:ok")]
    AuthOk {
        #[serde(rename = "userId")]
        user_id: i64,
        username: String,
        realm: Option<Realm>,
    },

    #[serde(rename = "auth:error")]
    AuthError { message: String },

    #[serde(rename = "player:connected")]
    PlayerConnected {
        #[serde(rename = "userId")]
        user_id: i64,
        username: String,
    },

    #[serde(rename = "player:disconnected")]
    PlayerDisconnected {
        #[serde(rename = "userId")]
        user_id: i64,
        username: String,
    },

    #[serde(rename = "move:started")]
    MoveStarted {
        #[serde(rename = "userId")]
        user_id: i64,
        path: Vec<Point>,
    },

    #[serde(rename = "walker:step")]
    WalkerStep {
        #[serde(rename = "userId")]
        user_id: i64,
        x: i32,
        y: i32,
        index: usize,
    },

    #[serde(rename = "walker:completed")]
    WalkerCompleted {
        #[serde(rename = "userId")]
        user_id: i64,
        x: i32,
        y: i32,
        interrupted: bool,
    },

    #[serde(rename = "player:health")]
    PlayerHealth {
        #[serde(rename = "userId")]
        user_id: i64,
        health: i64,
        #[serde(rename = "maxHealth")]
        max_health: i64,
        mana: i64,
        #[serde(rename = "maxMana")]
        max_mana: i64,
    },

    #[serde(rename = "territories:update")]
    TerritoriesUpdate { territories: Vec<TerritoryView> },

    #[serde(rename = "territories:capture")]
    TerritoriesCapture {
        #[serde(rename = "territoryId")]
        territory_id: i64,
        name: String,
        #[serde(rename = "previousRealm")]
        previous_realm: Realm,
        #[serde(rename = "newRealm")]
        new_realm: Realm,
    },

    #[serde(rename = "superbosses:health")]
    SuperbossesHealth { bosses: Vec<SuperbossView> },

    #[serde(rename = "spell:expired")]
    SpellExpired {
        #[serde(rename = "userId")]
        user_id: i64,
        #[serde(rename = "spellKey")]
        spell_key: String,
    },

    #[serde(rename = "time:update")]
    TimeUpdate {
        #[serde(rename = "ingameHour")]
        ingame_hour: u8,
        #[serde(rename = "ingameMinute")]
        ingame_minute: u8,
    },

    #[serde(rename = "collectable:collecting")]
    CollectableCollecting {
        #[serde(rename = "spawnId")]
        spawn_id: i64,
        #[serde(rename = "userId")]
        user_id: i64,
    },

    #[serde(rename = "collectable:collected")]
    CollectableCollected {
        #[serde(rename = "spawnId")]
        spawn_id: i64,
        #[serde(rename = "userId")]
        user_id: i64,
        #[serde(rename = "itemId")]
        item_id: i64,
    },

    #[serde(rename = "collectable:failed")]
    CollectableFailed {
        #[serde(rename = "spawnId")]
        spawn_id: i64,
    },

    #[serde(rename = "inventory:refresh")]
    InventoryRefresh {
        inventory: Vec<InventoryEntryView>,
        equipment: EquipmentView,
    },

    #[serde(rename = "shoutbox:message")]
    ShoutboxMessage {
        #[serde(rename = "entryId")]
        entry_id: i64,
        username: String,
        message: String,
        timestamp: i64,
    },

    #[serde(rename = "log:message")]
    LogMessage {
        #[serde(rename = "logType")]
        log_type: LogKind,
        message: String,
        #[serde(rename = "createdAt")]
        created_at: i64,
    },

    #[serde(rename = "regions:list")]
    RegionsList { regions: Vec<RegionData> },

    #[serde(rename = "paths:list")]
    PathsList { paths: Vec<PathData> },

    /// Delivered once when a slow consumer's queue overflowed and older
    /// entries were dropped; the client should resync.
    #[serde(rename = "backpressure")]
    Backpressure { dropped: u64 },
}

impl ServerEvent {
    /// Wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::AuthOk { .. } => "auth:ok",
            ServerEvent::AuthError { .. } => "auth:error",
            ServerEvent::PlayerConnected { .. } => "player:connected",
            ServerEvent::PlayerDisconnected { .. } => "player:disconnected",
            ServerEvent::MoveStarted { .. } => "move:started",
            ServerEvent::WalkerStep { .. } => "walker:step",
            ServerEvent::WalkerCompleted { .. } => "walker:completed",
            ServerEvent::PlayerHealth { .. } => "player:health",
            ServerEvent::TerritoriesUpdate { .. } => "territories:update",
            ServerEvent::TerritoriesCapture { .. } => "territories:capture",
            ServerEvent::SuperbossesHealth { .. } => "superbosses:health",
            ServerEvent::SpellExpired { .. } => "spell:expired",
            ServerEvent::TimeUpdate { .. } => "time:update",
            ServerEvent::CollectableCollecting { .. } => "collectable:collecting",
            ServerEvent::CollectableCollected { .. } => "collectable:collected",
            ServerEvent::CollectableFailed { .. } => "collectable:failed",
            ServerEvent::InventoryRefresh { .. } => "inventory:refresh",
            ServerEvent::ShoutboxMessage { .. } => "shoutbox:message",
            ServerEvent::LogMessage { .. } => "log:message",
            ServerEvent::RegionsList { .. } => "regions:list",
            ServerEvent::PathsList { .. } => "paths:list",
            ServerEvent::Backpressure { .. } => "backpressure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_completed_serializes_with_wire_name() {
        let event = ServerEvent::WalkerCompleted {
            user_id: 7,
            x: 200,
            y: 100,
            interrupted: true,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "walker:completed");
        assert_eq!(json["payload"]["interrupted"], true);
        assert_eq!(json["payload"]["userId"], 7);
    }

    #[test]
    fn ack_frames_skip_absent_fields() {
        let ok = serde_json::to_value(AckFrame::ok(5, None)).unwrap();
        assert!(ok.get("error").is_none());
        assert!(ok.get("payload").is_none());

        let err = serde_json::to_value(AckFrame::error(6, "unreachable", "no path".into())).unwrap();
        assert_eq!(err["error"]["code"], "unreachable");
        assert_eq!(err["ok"], false);
    }

    #[test]
    fn server_frame_distinguishes_ack_from_event() {
        let frame: ServerFrame = serde_json::from_str(r#"{"ack": 2, "ok": true}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Ack(_)));

        let frame: ServerFrame = serde_json::from_str(
            r#"{"name": "time:update", "payload": {"ingameHour": 4, "ingameMinute": 30}}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            ServerFrame::Event(ServerEvent::TimeUpdate { ingame_hour: 4, ingame_minute: 30 })
        ));
    }
}
