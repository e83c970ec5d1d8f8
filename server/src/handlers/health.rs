use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::context::ServerContext;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct HealthConnections {
    pub db: bool,
    pub cache: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub uptime: u64,
    pub connections: HealthConnections,
}

#[get("/health")]
pub async fn health_check(ctx: web::Data<ServerContext>) -> Result<HttpResponse> {
    let db = ctx.db.ping().await;
    let cache = ctx.cache.ping().await;

    let status = if db && cache { "ok" } else { "degraded" };
    let response = HealthCheckResponse {
        status: status.to_string(),
        uptime: ctx.uptime_secs(),
        connections: HealthConnections { db, cache },
    };

    // Without the relational store we cannot serve correctly; a cache
    // outage only degrades latency.
    let mut builder = if db {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };

    Ok(builder.json(response))
}
