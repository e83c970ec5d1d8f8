//! Online-set presence and the last-active write buffer.
//!
//! Two sorted sets with distinct lifecycles: `online_players` is cache-only
//! presence, `last_active_buffer` accumulates durable recency and is drained
//! into one batched UPDATE by the flusher.

use protocol::PlayerView;

use super::{GameCache, TTL_PLAYER};
use crate::db::PgContext;
use crate::error::Result;

const ONLINE_KEY: &str = "online_players";
const LAST_ACTIVE_KEY: &str = "last_active_buffer";

fn player_key(user_id: i64) -> String {
    format!("player:{user_id}")
}

impl GameCache {
    /// Records a heartbeat for the user in the presence set.
    pub async fn mark_online(&self, user_id: i64, now: i64) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::cmd("ZADD")
            .arg(ONLINE_KEY)
            .arg(now)
            .arg(user_id)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            log::warn!("presence zadd failed for {user_id}: {err}");
        }
    }

    pub async fn mark_offline(&self, user_id: i64) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::cmd("ZREM")
            .arg(ONLINE_KEY)
            .arg(user_id)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            log::warn!("presence zrem failed for {user_id}: {err}");
        }
    }

    /// User ids whose last heartbeat is within `threshold_secs` of `now`.
    pub async fn online_user_ids(&self, threshold_secs: i64, now: i64) -> Vec<i64> {
        let mut conn = self.conn();
        let result: redis::RedisResult<Vec<i64>> = redis::cmd("ZRANGEBYSCORE")
            .arg(ONLINE_KEY)
            .arg(now - threshold_secs)
            .arg("+inf")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(ids) => ids,
            Err(err) => {
                log::warn!("presence range read failed: {err}");
                Vec::new()
            }
        }
    }

    /// Fresh online players as broadcast views. Cache misses for individual
    /// players fall back to Postgres and back-fill.
    pub async fn get_online_players(
        &self,
        db: &PgContext,
        threshold_secs: i64,
        now: i64,
    ) -> Result<Vec<PlayerView>> {
        let ids = self.online_user_ids(threshold_secs, now).await;
        let mut views = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();

        for user_id in &ids {
            match self.get_json::<PlayerView>(&player_key(*user_id)).await {
                Some(view) => views.push(view),
                None => misses.push(*user_id),
            }
        }

        if !misses.is_empty() {
            for row in db.players().find_by_ids(&misses).await? {
                if let Some(view) = row.to_view() {
                    self.cache_player(&view).await;
                    views.push(view);
                }
            }
        }

        views.sort_by_key(|view| view.user_id);
        Ok(views)
    }

    pub async fn cache_player(&self, view: &PlayerView) {
        self.set_json(&player_key(view.user_id), view, Some(TTL_PLAYER))
            .await;
    }

    pub async fn invalidate_player(&self, user_id: i64) {
        self.del(&player_key(user_id)).await;
    }

    /// Evicts presence entries older than the horizon. Returns the count
    /// removed.
    pub async fn cleanup_online_players(&self, horizon_secs: i64, now: i64) -> usize {
        let mut conn = self.conn();
        let result: redis::RedisResult<usize> = redis::cmd("ZREMRANGEBYSCORE")
            .arg(ONLINE_KEY)
            .arg("-inf")
            .arg(now - horizon_secs)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(removed) => removed,
            Err(err) => {
                log::warn!("presence cleanup failed: {err}");
                0
            }
        }
    }

    /// Buffers a last-active timestamp for the batched flush.
    pub async fn buffer_last_active(&self, user_id: i64, now: i64) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::cmd("ZADD")
            .arg(LAST_ACTIVE_KEY)
            .arg(now)
            .arg(user_id)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            log::warn!("last-active buffer zadd failed for {user_id}: {err}");
        }
    }

    /// Atomically drains the buffer and issues one batched UPDATE. On a
    /// database failure the drained entries are restored so the next flush
    /// retries them. Returns the number of players updated.
    pub async fn flush_last_active(&self, db: &PgContext) -> usize {
        let mut conn = self.conn();

        // ZRANGE + DEL under MULTI so concurrent ZADDs are never dropped.
        let drained: redis::RedisResult<(Vec<(i64, i64)>, i64)> = redis::pipe()
            .atomic()
            .cmd("ZRANGE")
            .arg(LAST_ACTIVE_KEY)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .cmd("DEL")
            .arg(LAST_ACTIVE_KEY)
            .query_async(&mut conn)
            .await;

        let entries: Vec<(i64, i64)> = match drained {
            Ok((entries, _)) => entries,
            Err(err) => {
                log::warn!("last-active drain failed: {err}");
                return 0;
            }
        };

        if entries.is_empty() {
            return 0;
        }

        match db.players().batch_update_last_active(&entries).await {
            Ok(updated) => updated as usize,
            Err(err) => {
                log::warn!(
                    "last-active flush of {} entries failed, restoring buffer: {err}",
                    entries.len()
                );

                let mut restore = redis::cmd("ZADD");
                restore.arg(LAST_ACTIVE_KEY).arg("GT");
                for (user_id, seen_at) in &entries {
                    restore.arg(*seen_at).arg(*user_id);
                }
                let result: redis::RedisResult<()> = restore.query_async(&mut conn).await;
                if let Err(err) = result {
                    log::error!("last-active buffer restore failed: {err}");
                }

                0
            }
        }
    }
}
