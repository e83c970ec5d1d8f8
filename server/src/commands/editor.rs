//! GM editor commands over the region/path datasets. Any mutation rebuilds
//! the pathfinding grid (dropping its LRU) and rebroadcasts the lists.

use protocol::{PathData, RegionData, ServerEvent};

use crate::commands::AuthedUser;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

async fn require_gm(ctx: &ServerContext, user: &AuthedUser) -> Result<()> {
    if ctx.cache.is_gm(&ctx.db, user.user_id).await? {
        Ok(())
    } else {
        Err(GameServerError::Forbidden)
    }
}

pub async fn handle_region_save(
    ctx: &ServerContext,
    user: &AuthedUser,
    region: RegionData,
) -> Result<Option<serde_json::Value>> {
    require_gm(ctx, user).await?;

    if region.points.len() < 3 {
        return Err(GameServerError::InvalidCommand(
            "a region needs at least three points".to_string(),
        ));
    }

    let saved = ctx.db.map_data().upsert_region(&region).await?;
    log::info!(
        "GM {} saved region {} ({})",
        user.username,
        saved.region_id,
        saved.name
    );

    rebuild_and_broadcast_regions(ctx).await?;
    Ok(Some(serde_json::json!({ "regionId": saved.region_id })))
}

pub async fn handle_region_delete(
    ctx: &ServerContext,
    user: &AuthedUser,
    region_id: i64,
) -> Result<Option<serde_json::Value>> {
    require_gm(ctx, user).await?;

    if !ctx.db.map_data().delete_region(region_id).await? {
        return Err(GameServerError::NotFound(format!("region {region_id}")));
    }
    log::info!("GM {} deleted region {region_id}", user.username);

    rebuild_and_broadcast_regions(ctx).await?;
    Ok(None)
}

pub async fn handle_path_save(
    ctx: &ServerContext,
    user: &AuthedUser,
    path: PathData,
) -> Result<Option<serde_json::Value>> {
    require_gm(ctx, user).await?;

    if path.points.len() < 2 {
        return Err(GameServerError::InvalidCommand(
            "a path needs at least two points".to_string(),
        ));
    }

    let saved = ctx.db.map_data().upsert_path(&path).await?;
    broadcast_paths(ctx).await?;
    Ok(Some(serde_json::json!({ "pathId": saved.path_id })))
}

pub async fn handle_path_delete(
    ctx: &ServerContext,
    user: &AuthedUser,
    path_id: i64,
) -> Result<Option<serde_json::Value>> {
    require_gm(ctx, user).await?;

    if !ctx.db.map_data().delete_path(path_id).await? {
        return Err(GameServerError::NotFound(format!("path {path_id}")));
    }

    broadcast_paths(ctx).await?;
    Ok(None)
}

/// Region changes affect walkability: swap the pathfinder's grid (which
/// clears the path LRU) and push the fresh list to everyone.
async fn rebuild_and_broadcast_regions(ctx: &ServerContext) -> Result<()> {
    let regions: Vec<RegionData> = ctx
        .db
        .map_data()
        .all_regions()
        .await?
        .iter()
        .map(|row| row.to_data())
        .collect::<Result<_>>()?;

    ctx.pathfinder.replace_regions(&regions);
    ctx.bus.broadcast_all(ServerEvent::RegionsList { regions });
    Ok(())
}

async fn broadcast_paths(ctx: &ServerContext) -> Result<()> {
    let paths: Vec<PathData> = ctx
        .db
        .map_data()
        .all_paths()
        .await?
        .iter()
        .map(|row| row.to_data())
        .collect();

    ctx.bus.broadcast_all(ServerEvent::PathsList { paths });
    Ok(())
}
