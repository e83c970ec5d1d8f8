use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AuthTokenError {
    #[error("auth token secret is too short (min {MIN_SECRET_LEN} bytes)")]
    SecretTooShort,

    #[error("invalid auth token format")]
    InvalidFormat,

    #[error("auth token signature is invalid")]
    InvalidSignature,

    #[error("auth token is expired")]
    Expired,

    #[error("failed to decode auth token payload")]
    PayloadDecode,

    #[error("failed to parse auth token payload")]
    PayloadParse,
}

/// Stateless session claims carried inside every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: i64,
    pub username: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
}

impl SessionClaims {
    pub fn is_expired(&self, reference_ms: u64) -> bool {
        reference_ms >= self.expires_at_ms
    }
}

#[derive(Clone)]
pub struct AuthTokenService {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl AuthTokenService {
    pub fn new(secret: Vec<u8>, ttl: Duration) -> Result<Self, AuthTokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthTokenError::SecretTooShort);
        }

        Ok(Self {
            secret: Arc::<[u8]>::from(secret),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        user_id: i64,
        username: &str,
        issued_at_ms: u64,
    ) -> Result<String, AuthTokenError> {
        let claims = SessionClaims {
            user_id,
            username: username.to_string(),
            issued_at_ms,
            expires_at_ms: issued_at_ms.saturating_add(self.ttl.as_millis() as u64),
        };

        let bytes = serde_json::to_vec(&claims).map_err(|_| AuthTokenError::PayloadParse)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(bytes);
        let signature = self.sign(payload_b64.as_bytes())?;
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
        Ok(format!("{payload_b64}.{signature_b64}"))
    }

    pub fn verify(&self, token: &str, reference_ms: u64) -> Result<SessionClaims, AuthTokenError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(AuthTokenError::InvalidFormat)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthTokenError::InvalidFormat)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthTokenError::InvalidSignature)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthTokenError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthTokenError::PayloadDecode)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| AuthTokenError::PayloadParse)?;

        if claims.is_expired(reference_ms) {
            return Err(AuthTokenError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, AuthTokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthTokenError::InvalidSignature)?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthTokenService {
        AuthTokenService::new(
            b"01234567890123456789012345678901".to_vec(),
            Duration::from_secs(30),
        )
        .expect("valid service")
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let service = test_service();
        let token = service.issue(77, "gandalf", 1_000).expect("issue token");

        let claims = service.verify(&token, 1_500).expect("verify token");
        assert_eq!(claims.user_id, 77);
        assert_eq!(claims.username, "gandalf");
        assert_eq!(claims.expires_at_ms, 31_000);
    }

    #[test]
    fn rejects_tampered_token() {
        let service = test_service();
        let token = service.issue(1, "s", 10).expect("issue token");
        let (payload, signature) = token.split_once('.').expect("token split");
        let mut chars: Vec<char> = payload.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered_payload: String = chars.into_iter().collect();
        let tampered = format!("{tampered_payload}.{signature}");

        assert!(matches!(
            service.verify(&tampered, 20),
            Err(AuthTokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let service = test_service();
        let token = service.issue(1, "s", 1_000).expect("issue token");

        assert!(matches!(
            service.verify(&token, 35_000),
            Err(AuthTokenError::Expired)
        ));
    }

    #[test]
    fn rejects_short_secret() {
        assert!(matches!(
            AuthTokenService::new(b"short".to_vec(), Duration::from_secs(1)),
            Err(AuthTokenError::SecretTooShort)
        ));
    }
}
