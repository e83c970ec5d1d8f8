use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    middleware::Next,
    HttpMessage,
};

use crate::auth_token::now_ms;
use crate::context::ServerContext;

/// Verified token identity, available to protected handlers via `ReqData`.
#[derive(Debug, Clone)]
pub struct AuthedIdentity {
    pub user_id: i64,
    pub username: String,
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| ErrorUnauthorized("Authentication required"))?;

    let ctx = req
        .app_data::<actix_web::web::Data<ServerContext>>()
        .ok_or_else(|| ErrorUnauthorized("Server context not available"))?;

    let claims = ctx
        .auth_tokens
        .verify(&token, now_ms())
        .map_err(|_| ErrorUnauthorized("Invalid or expired token"))?;

    req.extensions_mut().insert(AuthedIdentity {
        user_id: claims.user_id,
        username: claims.username,
    });

    next.call(req).await
}
