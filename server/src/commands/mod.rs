//! Static command dispatch. Every handler returns a result value the
//! dispatcher renders into an ack; no error escapes onto the socket task.

pub mod collectables;
pub mod editor;
pub mod inventory;
pub mod movement;
pub mod shoutbox;

use std::time::Duration;

use protocol::{AckFrame, ClientCommand, ClientEnvelope, Realm, ServerFrame};

use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

/// Ceiling on a single handler before it is abandoned with an internal ack.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// The verified identity a socket carries after its handshake.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: i64,
    pub username: String,
    pub realm: Option<Realm>,
}

impl AuthedUser {
    /// Realm, or the error every realm-gated handler returns before one is
    /// picked.
    pub fn require_realm(&self) -> Result<Realm> {
        self.realm
            .ok_or_else(|| GameServerError::InvalidCommand("no realm selected".to_string()))
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    ctx: ServerContext,
}

impl CommandDispatcher {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }

    /// Runs the command and returns the ack frame when one was requested.
    pub async fn dispatch(&self, user: &AuthedUser, envelope: ClientEnvelope) -> Option<ServerFrame> {
        let name = envelope.command.name();

        let outcome =
            tokio::time::timeout(HANDLER_TIMEOUT, self.handle(user, envelope.command)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                log::error!("handler {name} for user {} timed out", user.user_id);
                Err(GameServerError::Internal(format!("{name} timed out")))
            }
        };

        let ack_id = envelope.id?;
        let frame = match result {
            Ok(payload) => AckFrame::ok(ack_id, payload),
            Err(err) => {
                // Business rejections are normal traffic; real failures are not.
                match &err {
                    GameServerError::Database(_)
                    | GameServerError::Cache(_)
                    | GameServerError::Internal(_) => {
                        log::error!("handler {name} failed for user {}: {err}", user.user_id)
                    }
                    _ => log::debug!("handler {name} rejected for user {}: {err}", user.user_id),
                }
                AckFrame::error(ack_id, err.ack_code(), err.to_string())
            }
        };

        Some(ServerFrame::Ack(frame))
    }

    async fn handle(
        &self,
        user: &AuthedUser,
        command: ClientCommand,
    ) -> Result<Option<serde_json::Value>> {
        match command {
            ClientCommand::MoveRequest { x, y } => {
                movement::handle_move(&self.ctx, user, x, y).await
            }
            ClientCommand::InventoryEquip { inventory_id, slot } => {
                inventory::handle_equip(&self.ctx, user, inventory_id, slot).await
            }
            ClientCommand::InventoryUnequip { slot } => {
                inventory::handle_unequip(&self.ctx, user, slot).await
            }
            ClientCommand::InventoryUse { inventory_id } => {
                inventory::handle_use(&self.ctx, user, inventory_id).await
            }
            ClientCommand::CollectableCollect { spawn_id } => {
                collectables::handle_collect(&self.ctx, user, spawn_id).await
            }
            ClientCommand::EditorRegionSave { region } => {
                editor::handle_region_save(&self.ctx, user, region).await
            }
            ClientCommand::EditorRegionDelete { region_id } => {
                editor::handle_region_delete(&self.ctx, user, region_id).await
            }
            ClientCommand::EditorPathSave { path } => {
                editor::handle_path_save(&self.ctx, user, path).await
            }
            ClientCommand::EditorPathDelete { path_id } => {
                editor::handle_path_delete(&self.ctx, user, path_id).await
            }
            ClientCommand::ShoutboxSend { message } => {
                shoutbox::handle_send(&self.ctx, user, &message).await
            }
        }
    }
}
