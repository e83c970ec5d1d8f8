//! Client → server messages.

use serde::{Deserialize, Serialize};

use crate::types::{EquipSlot, PathData, RegionData};

/// First frame sent by the client after the socket opens.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handshake {
    pub token: String,
}

/// A command as it appears on the wire. `id` is present when the client
/// wants an ack for this specific request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Every command the dispatcher understands, keyed by its wire name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "payload")]
pub enum ClientCommand {
    #[serde(rename = "move:request")]
    MoveRequest { x: i32, y: i32 },

    #[serde(rename = "inventory:equip")]
    InventoryEquip {
        #[serde(rename = "inventoryId")]
        inventory_id: i64,
        slot: EquipSlot,
    },

    #[serde(rename = "inventory:unequip")]
    InventoryUnequip { slot: EquipSlot },

    #[serde(rename = "inventory:use")]
    InventoryUse {
        #[serde(rename = "inventoryId")]
        inventory_id: i64,
    },

    #[serde(rename = "collectable:collect")]
    CollectableCollect {
        #[serde(rename = "spawnId")]
        spawn_id: i64,
    },

    #[serde(rename = "editor:region:save")]
    EditorRegionSave { region: RegionData },

    #[serde(rename = "editor:region:delete")]
    EditorRegionDelete {
        #[serde(rename = "regionId")]
        region_id: i64,
    },

    #[serde(rename = "editor:path:save")]
    EditorPathSave { path: PathData },

    #[serde(rename = "editor:path:delete")]
    EditorPathDelete {
        #[serde(rename = "pathId")]
        path_id: i64,
    },

    #[serde(rename = "shoutbox:send")]
    ShoutboxSend { message: String },
}

impl ClientCommand {
    /// Wire name of this command, for logging and handler timing.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::MoveRequest { .. } => "move:request",
            ClientCommand::InventoryEquip { .. } => "inventory:equip",
            ClientCommand::InventoryUnequip { .. } => "inventory:unequip",
            ClientCommand::InventoryUse { .. } => "inventory:use",
            ClientCommand::CollectableCollect { .. } => "collectable:collect",
            ClientCommand::EditorRegionSave { .. } => "editor:region:save",
            ClientCommand::EditorRegionDelete { .. } => "editor:region:delete",
            ClientCommand::EditorPathSave { .. } => "editor:path:save",
            ClientCommand::EditorPathDelete { .. } => "editor:path:delete",
            ClientCommand::ShoutboxSend { .. } => "shoutbox:send",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_request_parses_from_wire_json() {
        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"id": 3, "name": "move:request", "payload": {"x": 200, "y": 100}}"#)
                .unwrap();

        assert_eq!(envelope.id, Some(3));
        assert_eq!(envelope.command, ClientCommand::MoveRequest { x: 200, y: 100 });
    }

    #[test]
    fn id_is_optional() {
        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"name": "shoutbox:send", "payload": {"message": "hi"}}"#)
                .unwrap();

        assert_eq!(envelope.id, None);
        assert_eq!(envelope.command.name(), "shoutbox:send");
    }

    #[test]
    fn equip_uses_camel_case_payload_keys() {
        let envelope: ClientEnvelope = serde_json::from_str(
            r#"{"id": 1, "name": "inventory:equip", "payload": {"inventoryId": 9, "slot": "weaponR"}}"#,
        )
        .unwrap();

        assert_eq!(
            envelope.command,
            ClientCommand::InventoryEquip {
                inventory_id: 9,
                slot: crate::types::EquipSlot::WeaponR
            }
        );
    }

    #[test]
    fn unknown_command_name_is_rejected() {
        let result: Result<ClientEnvelope, _> =
            serde_json::from_str(r#"{"name": "admin:shutdown", "payload": {}}"#);
        assert!(result.is_err());
    }
}
