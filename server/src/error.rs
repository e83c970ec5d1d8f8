use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    #[error("Invalid credentials or token")]
    AuthInvalid,

    #[error("Realm already selected")]
    AlreadyInRealm,

    #[error("Destination is unreachable")]
    Unreachable,

    #[error("Still on cooldown")]
    OnCooldown,

    #[error("Someone else is already collecting this")]
    AlreadyBeingCollected,

    #[error("Not allowed")]
    Forbidden,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("War status feed failed: {0}")]
    ExternalFeed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    Internal(String),
}

impl GameServerError {
    /// Error code rendered into socket acks.
    pub fn ack_code(&self) -> &'static str {
        match self {
            GameServerError::AuthInvalid => "authInvalid",
            GameServerError::AlreadyInRealm => "alreadyInRealm",
            GameServerError::Unreachable => "unreachable",
            GameServerError::OnCooldown => "onCooldown",
            GameServerError::AlreadyBeingCollected => "alreadyBeingCollected",
            GameServerError::Forbidden => "forbidden",
            GameServerError::InvalidCommand(_) => "invalidCommand",
            GameServerError::NotFound(_) => "notFound",
            GameServerError::Database(_)
            | GameServerError::Cache(_)
            | GameServerError::Serialization(_)
            | GameServerError::ExternalFeed(_)
            | GameServerError::Config(_)
            | GameServerError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl ResponseError for GameServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            GameServerError::AuthInvalid => StatusCode::UNAUTHORIZED,
            GameServerError::AlreadyInRealm => StatusCode::CONFLICT,
            GameServerError::Forbidden => StatusCode::FORBIDDEN,
            GameServerError::NotFound(_) => StatusCode::NOT_FOUND,
            GameServerError::Unreachable
            | GameServerError::OnCooldown
            | GameServerError::AlreadyBeingCollected
            | GameServerError::InvalidCommand(_)
            | GameServerError::Serialization(_) => StatusCode::BAD_REQUEST,
            GameServerError::Database(_)
            | GameServerError::Cache(_)
            | GameServerError::ExternalFeed(_)
            | GameServerError::Config(_)
            | GameServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ErrorResponse {
            success: false,
            error: self.to_string(),
        };

        HttpResponse::build(status).json(error_response)
    }
}

pub type Result<T> = std::result::Result<T, GameServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_codes_match_spec_kinds() {
        assert_eq!(GameServerError::Unreachable.ack_code(), "unreachable");
        assert_eq!(GameServerError::OnCooldown.ack_code(), "onCooldown");
        assert_eq!(
            GameServerError::AlreadyBeingCollected.ack_code(),
            "alreadyBeingCollected"
        );
        assert_eq!(
            GameServerError::Internal("boom".to_string()).ack_code(),
            "internal"
        );
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(
            GameServerError::AuthInvalid.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GameServerError::AlreadyInRealm.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GameServerError::Unreachable.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
