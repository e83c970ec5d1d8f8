//! Credential checks are delegated to the community forum; this client is
//! the only thing in the server that knows how.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GameServerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumIdentity {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "userId")]
    user_id: i64,
    username: String,
}

#[derive(Clone)]
pub struct ForumAuthClient {
    http: reqwest::Client,
    verify_url: String,
}

impl ForumAuthClient {
    pub fn new(verify_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GameServerError::Config(format!("forum http client: {}", e)))?;

        Ok(Self { http, verify_url })
    }

    /// Checks the credentials against the forum. Wrong credentials are
    /// `AuthInvalid`; anything else (timeout, 5xx) is `Internal` so the
    /// caller can distinguish "bad password" from "forum is down".
    pub async fn verify(&self, username: &str, password: &str) -> Result<ForumIdentity> {
        let response = self
            .http
            .post(&self.verify_url)
            .json(&VerifyRequest { username, password })
            .send()
            .await
            .map_err(|e| GameServerError::Internal(format!("forum verify request: {}", e)))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GameServerError::AuthInvalid);
        }

        if !response.status().is_success() {
            return Err(GameServerError::Internal(format!(
                "forum verify returned {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| GameServerError::Internal(format!("forum verify body: {}", e)))?;

        Ok(ForumIdentity {
            user_id: body.user_id,
            username: body.username,
        })
    }
}
