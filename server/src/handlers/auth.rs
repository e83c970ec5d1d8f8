use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use protocol::{Point, Realm};

use crate::auth_token::{now_epoch, now_ms};
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};
use crate::middleware::AuthedIdentity;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub username: String,
    pub realm: Option<Realm>,
    #[serde(rename = "needsRealmSelection")]
    pub needs_realm_selection: bool,
}

#[post("/login")]
pub async fn login(
    req: web::Json<LoginRequest>,
    ctx: web::Data<ServerContext>,
) -> Result<HttpResponse> {
    log::info!("Login attempt for user: {}", req.username);

    // Credentials live in the forum; we only learn the identity.
    let identity = ctx.forum.verify(&req.username, &req.password).await?;

    let player = ctx
        .db
        .players()
        .upsert_identity(identity.user_id, &identity.username, now_epoch())
        .await?;

    let token = ctx
        .auth_tokens
        .issue(player.user_id, &player.username, now_ms())
        .map_err(|err| GameServerError::Internal(format!("failed to issue token: {err}")))?;

    let realm = player.realm();
    log::info!(
        "Successful login for user: {} (realm: {:?})",
        player.username,
        realm
    );

    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        user_id: player.user_id,
        username: player.username,
        realm,
        needs_realm_selection: realm.is_none(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RealmRequest {
    pub realm: Realm,
}

#[derive(Debug, Serialize)]
pub struct RealmResponse {
    pub realm: Realm,
    pub position: Point,
}

/// Starting position for each realm's home corner.
fn realm_spawn(realm: Realm) -> Point {
    match realm {
        Realm::A => Point::new(512, 512),
        Realm::B => Point::new(5632, 512),
        Realm::C => Point::new(3072, 5632),
    }
}

#[post("/realm")]
pub async fn select_realm(
    req: web::Json<RealmRequest>,
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    let spawn = realm_spawn(req.realm);
    let player = ctx
        .db
        .players()
        .select_realm(identity.user_id, req.realm, spawn)
        .await?;

    ctx.cache.invalidate_player(player.user_id).await;

    log::info!("Player {} joined realm {}", player.username, req.realm);

    Ok(HttpResponse::Ok().json(RealmResponse {
        realm: req.realm,
        position: Point::new(player.x, player.y),
    }))
}
