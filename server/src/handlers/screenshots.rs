use actix_web::{delete, get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth_token::now_epoch;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};
use crate::middleware::AuthedIdentity;

#[derive(Debug, Serialize)]
pub struct ScreenshotSummary {
    #[serde(rename = "screenshotId")]
    pub screenshot_id: i64,
    pub title: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

#[get("/screenshots")]
pub async fn list_screenshots(
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    let rows = ctx.db.screenshots().list_for_user(identity.user_id).await?;
    let summaries: Vec<ScreenshotSummary> = rows
        .into_iter()
        .map(|row| ScreenshotSummary {
            screenshot_id: row.screenshot_id,
            title: row.title,
            created_at: row.created_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub title: String,
    pub data: String,
}

#[post("/screenshots")]
pub async fn upload_screenshot(
    body: web::Json<UploadRequest>,
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    let row = ctx
        .db
        .screenshots()
        .insert(identity.user_id, &body.title, &body.data, now_epoch())
        .await?;

    Ok(HttpResponse::Ok().json(ScreenshotSummary {
        screenshot_id: row.screenshot_id,
        title: row.title,
        created_at: row.created_at,
    }))
}

#[delete("/screenshots/{id}")]
pub async fn delete_screenshot(
    path: web::Path<i64>,
    ctx: web::Data<ServerContext>,
    identity: web::ReqData<AuthedIdentity>,
) -> Result<HttpResponse> {
    let screenshot_id = path.into_inner();
    if !ctx
        .db
        .screenshots()
        .delete(screenshot_id, identity.user_id)
        .await?
    {
        return Err(GameServerError::NotFound(format!(
            "screenshot {screenshot_id}"
        )));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
