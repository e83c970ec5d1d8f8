use actix_web::{get, put, web, HttpResponse};

use crate::context::ServerContext;
use crate::error::Result;
use crate::middleware::AuthedIdentity;

#[get("/settings")]
pub async fn get_settings(
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    let settings = ctx.cache.user_settings(&ctx.db, identity.user_id).await?;
    Ok(HttpResponse::Ok().json(settings))
}

#[put("/settings")]
pub async fn put_settings(
    body: web::Json<serde_json::Value>,
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    ctx.db.settings().put(identity.user_id, &body).await?;
    ctx.cache.invalidate_user_settings(identity.user_id).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
