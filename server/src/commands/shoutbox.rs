//! Shoutbox traffic and the slash commands GMs hide in it.

use protocol::{LogKind, ServerEvent, ShoutboxView};

use crate::auth_token::now_epoch;
use crate::commands::inventory::send_inventory_refresh;
use crate::commands::AuthedUser;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

const MAX_MESSAGE_LEN: usize = 500;

/// Server-side parsed GM commands (`/item <templateKey> <target> [qty]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmCommand {
    GiveItem {
        template_key: String,
        target: String,
        quantity: i64,
    },
}

/// Parses a leading-slash message into a GM command, if it is one.
pub fn parse_gm_command(message: &str) -> Option<std::result::Result<GmCommand, String>> {
    let message = message.trim();
    let rest = message.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();

    match parts.next()? {
        "item" => {
            let Some(template_key) = parts.next() else {
                return Some(Err("usage: /item <templateKey> <target> [qty]".to_string()));
            };
            let Some(target) = parts.next() else {
                return Some(Err("usage: /item <templateKey> <target> [qty]".to_string()));
            };
            let quantity = match parts.next() {
                None => 1,
                Some(raw) => match raw.parse::<i64>() {
                    Ok(quantity) if quantity >= 1 => quantity,
                    _ => return Some(Err(format!("bad quantity: {raw}"))),
                },
            };

            Some(Ok(GmCommand::GiveItem {
                template_key: template_key.to_string(),
                target: target.to_string(),
                quantity,
            }))
        }
        other => Some(Err(format!("unknown command: /{other}"))),
    }
}

pub async fn handle_send(
    ctx: &ServerContext,
    user: &AuthedUser,
    message: &str,
) -> Result<Option<serde_json::Value>> {
    let message = message.trim();
    if message.is_empty() || message.len() > MAX_MESSAGE_LEN {
        return Err(GameServerError::InvalidCommand(
            "message is empty or too long".to_string(),
        ));
    }

    if let Some(parsed) = parse_gm_command(message) {
        let command = parsed.map_err(GameServerError::InvalidCommand)?;
        return run_gm_command(ctx, user, command).await;
    }

    let row = ctx
        .db
        .shoutbox()
        .insert(&user.username, message, now_epoch())
        .await?;

    let view = ShoutboxView {
        entry_id: row.entry_id,
        username: row.username.clone(),
        message: row.message.clone(),
        timestamp: row.timestamp,
    };

    ctx.cache.push_shoutbox(&view).await;
    ctx.cache.set_last_shoutbox_id(view.entry_id).await;

    ctx.bus.broadcast_all(ServerEvent::ShoutboxMessage {
        entry_id: view.entry_id,
        username: view.username,
        message: view.message,
        timestamp: view.timestamp,
    });

    Ok(None)
}

async fn run_gm_command(
    ctx: &ServerContext,
    user: &AuthedUser,
    command: GmCommand,
) -> Result<Option<serde_json::Value>> {
    if !ctx.cache.is_gm(&ctx.db, user.user_id).await? {
        return Err(GameServerError::Forbidden);
    }

    match command {
        GmCommand::GiveItem {
            template_key,
            target,
            quantity,
        } => {
            let item = ctx
                .cache
                .get_item_by_template(&ctx.db, &template_key)
                .await?
                .ok_or_else(|| GameServerError::NotFound(format!("item {template_key}")))?;

            let target_row = ctx
                .db
                .players()
                .find_by_username(&target)
                .await?
                .ok_or_else(|| GameServerError::NotFound(format!("player {target}")))?;

            ctx.db
                .inventory()
                .add_item(target_row.user_id, item.item_id, quantity)
                .await?;

            log::info!(
                "GM {} granted {}x {} to {}",
                user.username,
                quantity,
                item.template_key,
                target
            );
            ctx.log_player(
                target_row.user_id,
                LogKind::Success,
                &format!("Received {}x {}", quantity, item.name),
            )
            .await?;
            send_inventory_refresh(ctx, target_row.user_id).await?;

            Ok(Some(serde_json::json!({
                "granted": quantity,
                "itemId": item.item_id,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_chat_is_not_a_command() {
        assert!(parse_gm_command("hello there").is_none());
        assert!(parse_gm_command("half / slash").is_none());
    }

    #[test]
    fn item_command_parses_with_default_quantity() {
        assert_eq!(
            parse_gm_command("/item health_potion grom"),
            Some(Ok(GmCommand::GiveItem {
                template_key: "health_potion".to_string(),
                target: "grom".to_string(),
                quantity: 1,
            }))
        );
    }

    #[test]
    fn item_command_parses_explicit_quantity() {
        assert_eq!(
            parse_gm_command("/item mana_potion elara 5"),
            Some(Ok(GmCommand::GiveItem {
                template_key: "mana_potion".to_string(),
                target: "elara".to_string(),
                quantity: 5,
            }))
        );
    }

    #[test]
    fn malformed_commands_error_instead_of_chatting() {
        assert!(matches!(parse_gm_command("/item"), Some(Err(_))));
        assert!(matches!(parse_gm_command("/item potion"), Some(Err(_))));
        assert!(matches!(
            parse_gm_command("/item potion grom zero"),
            Some(Err(_))
        ));
        assert!(matches!(parse_gm_command("/teleport 5 5"), Some(Err(_))));
    }
}
