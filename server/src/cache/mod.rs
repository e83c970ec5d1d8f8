//! Typed Redis access: static preloads, TTL caches, presence accounting and
//! write buffers.
//!
//! Every operation here is a best-effort accelerator in front of Postgres.
//! A failed cache call logs and the caller gets the persisted value; cache
//! trouble degrades latency, never correctness.

pub mod catalog;
pub mod collectables;
pub mod presence;
pub mod walkers;
pub mod world;

use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Seconds before each TTL class expires.
pub const TTL_TERRITORIES: u64 = 30;
pub const TTL_SUPERBOSSES: u64 = 10;
pub const TTL_SERVER_TIME: u64 = 15;
pub const TTL_USER_SETTINGS: u64 = 300;
pub const TTL_GM_STATUS: u64 = 600;
pub const TTL_WALK_SPEED: u64 = 60;
pub const TTL_PLAYER: u64 = 60;

#[derive(Clone)]
pub struct GameCache {
    conn: ConnectionManager,
}

impl GameCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    /// Best-effort JSON read. A miss and a cache failure look the same to
    /// the caller; failures are logged here.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn();
        let raw: Option<String> = match redis::cmd("GET").arg(key).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cache read failed for {key}: {err}");
                return None;
            }
        };

        raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("cache entry {key} failed to parse: {err}");
                None
            }
        })
    }

    /// Best-effort JSON write; `ttl` of `None` means the permanent tier.
    pub(crate) async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cache entry {key} failed to serialize: {err}");
                return;
            }
        };

        let mut conn = self.conn();
        let result: redis::RedisResult<()> = match ttl {
            Some(secs) => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(raw)
                    .arg("EX")
                    .arg(secs)
                    .query_async(&mut conn)
                    .await
            }
            None => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(raw)
                    .query_async(&mut conn)
                    .await
            }
        };

        if let Err(err) = result {
            log::warn!("cache write failed for {key}: {err}");
        }
    }

    pub(crate) async fn del(&self, key: &str) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> =
            redis::cmd("DEL").arg(key).query_async(&mut conn).await;
        if let Err(err) = result {
            log::warn!("cache delete failed for {key}: {err}");
        }
    }
}
