//! Short-TTL world caches, the walk-speed aggregate, and the shoutbox
//! accelerators.

use protocol::{ShoutboxView, SuperbossView, TerritoryView};

use super::{
    GameCache, TTL_GM_STATUS, TTL_SERVER_TIME, TTL_SUPERBOSSES, TTL_TERRITORIES, TTL_USER_SETTINGS,
    TTL_WALK_SPEED,
};
use crate::db::PgContext;
use crate::error::Result;

const TERRITORIES_KEY: &str = "territories";
const SUPERBOSSES_KEY: &str = "superbosses";
const SERVER_TIME_KEY: &str = "server_time";
const SHOUTBOX_LIST_KEY: &str = "shoutbox_recent";
const SHOUTBOX_LAST_ID_KEY: &str = "shoutbox_last_id";
const SHOUTBOX_CACHE_CAP: isize = 50;

fn settings_key(user_id: i64) -> String {
    format!("user_settings:{user_id}")
}

fn gm_key(user_id: i64) -> String {
    format!("gm:{user_id}")
}

fn walk_speed_key(user_id: i64) -> String {
    format!("walk_speed:{user_id}")
}

/// Deterministic walk-speed aggregate: base speed plus equipped item stats
/// plus active buffs.
pub fn sum_walk_speed(item_speeds: &[f64], spell_speeds: &[f64]) -> f64 {
    1.0 + item_speeds.iter().sum::<f64>() + spell_speeds.iter().sum::<f64>()
}

impl GameCache {
    /// Territory list, cache-first with a 30s TTL.
    pub async fn territories(&self, db: &PgContext) -> Result<Vec<TerritoryView>> {
        if let Some(views) = self.get_json::<Vec<TerritoryView>>(TERRITORIES_KEY).await {
            return Ok(views);
        }

        let rows = db.territories().all().await?;
        let views: Vec<TerritoryView> = rows
            .iter()
            .map(|row| row.to_view())
            .collect::<Result<_>>()?;

        self.set_json(TERRITORIES_KEY, &views, Some(TTL_TERRITORIES))
            .await;
        Ok(views)
    }

    pub async fn invalidate_territories(&self) {
        self.del(TERRITORIES_KEY).await;
    }

    /// Superboss list, cache-first with a 10s TTL.
    pub async fn superbosses(&self, db: &PgContext) -> Result<Vec<SuperbossView>> {
        if let Some(views) = self.get_json::<Vec<SuperbossView>>(SUPERBOSSES_KEY).await {
            return Ok(views);
        }

        let views: Vec<SuperbossView> = db
            .superbosses()
            .all()
            .await?
            .iter()
            .map(|row| row.to_view())
            .collect();

        self.set_json(SUPERBOSSES_KEY, &views, Some(TTL_SUPERBOSSES))
            .await;
        Ok(views)
    }

    pub async fn invalidate_superbosses(&self) {
        self.del(SUPERBOSSES_KEY).await;
    }

    pub async fn cached_ingame_time(&self) -> Option<(u8, u8)> {
        self.get_json::<(u8, u8)>(SERVER_TIME_KEY).await
    }

    pub async fn cache_ingame_time(&self, hour: u8, minute: u8) {
        self.set_json(SERVER_TIME_KEY, &(hour, minute), Some(TTL_SERVER_TIME))
            .await;
    }

    /// User settings blob, cache-first with a 300s TTL.
    pub async fn user_settings(&self, db: &PgContext, user_id: i64) -> Result<serde_json::Value> {
        if let Some(value) = self.get_json::<serde_json::Value>(&settings_key(user_id)).await {
            return Ok(value);
        }

        let value = db
            .settings()
            .get(user_id)
            .await?
            .map(|row| row.settings.0)
            .unwrap_or_else(|| serde_json::json!({}));

        self.set_json(&settings_key(user_id), &value, Some(TTL_USER_SETTINGS))
            .await;
        Ok(value)
    }

    pub async fn invalidate_user_settings(&self, user_id: i64) {
        self.del(&settings_key(user_id)).await;
    }

    /// GM flag, cache-first with a 600s TTL.
    pub async fn is_gm(&self, db: &PgContext, user_id: i64) -> Result<bool> {
        if let Some(flag) = self.get_json::<bool>(&gm_key(user_id)).await {
            return Ok(flag);
        }

        let flag = db.players().is_gm(user_id).await?;
        self.set_json(&gm_key(user_id), &flag, Some(TTL_GM_STATUS))
            .await;
        Ok(flag)
    }

    /// Walk-speed aggregate for the user: equipped item walk-speed stats
    /// plus active spell bonuses, cached for 60s. Equip/unequip and spell
    /// start/expiry invalidate.
    pub async fn walk_speed(&self, db: &PgContext, user_id: i64) -> Result<f64> {
        if let Some(speed) = self.get_json::<f64>(&walk_speed_key(user_id)).await {
            return Ok(speed);
        }

        let equipment = db.equipment().get_or_create(user_id).await?;
        let mut item_speeds = Vec::new();
        for (_, inventory_id) in equipment.to_view().occupied() {
            let Some(entry) = db.inventory().find_entry(inventory_id).await? else {
                continue;
            };
            if let Some(item) = self.get_item_by_id(db, entry.item_id).await? {
                if item.stats.walk_speed != 0.0 {
                    item_speeds.push(item.stats.walk_speed);
                }
            }
        }

        let spell_speeds: Vec<f64> = db
            .spells()
            .active_for_user(user_id)
            .await?
            .iter()
            .filter(|spell| spell.remaining > 0)
            .map(|spell| spell.walk_speed)
            .filter(|speed| *speed != 0.0)
            .collect();

        let speed = sum_walk_speed(&item_speeds, &spell_speeds);
        self.set_json(&walk_speed_key(user_id), &speed, Some(TTL_WALK_SPEED))
            .await;
        Ok(speed)
    }

    pub async fn invalidate_walk_speed(&self, user_id: i64) {
        self.del(&walk_speed_key(user_id)).await;
    }

    /// Pushes onto the capped recent-messages list.
    pub async fn push_shoutbox(&self, view: &ShoutboxView) {
        let raw = match serde_json::to_string(view) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("shoutbox entry failed to serialize: {err}");
                return;
            }
        };

        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::pipe()
            .cmd("LPUSH")
            .arg(SHOUTBOX_LIST_KEY)
            .arg(raw)
            .ignore()
            .cmd("LTRIM")
            .arg(SHOUTBOX_LIST_KEY)
            .arg(0)
            .arg(SHOUTBOX_CACHE_CAP - 1)
            .query_async(&mut conn)
            .await;

        if let Err(err) = result {
            log::warn!("shoutbox cache push failed: {err}");
        }
    }

    /// Most recent messages, newest first, falling back to Postgres.
    pub async fn recent_shoutbox(&self, db: &PgContext) -> Result<Vec<ShoutboxView>> {
        let mut conn = self.conn();
        let raw: redis::RedisResult<Vec<String>> = redis::cmd("LRANGE")
            .arg(SHOUTBOX_LIST_KEY)
            .arg(0)
            .arg(SHOUTBOX_CACHE_CAP - 1)
            .query_async(&mut conn)
            .await;

        if let Ok(entries) = raw {
            if !entries.is_empty() {
                return Ok(entries
                    .iter()
                    .filter_map(|json| serde_json::from_str(json).ok())
                    .collect());
            }
        }

        let views: Vec<ShoutboxView> = db
            .shoutbox()
            .recent(SHOUTBOX_CACHE_CAP as i64)
            .await?
            .iter()
            .map(|row| ShoutboxView {
                entry_id: row.entry_id,
                username: row.username.clone(),
                message: row.message.clone(),
                timestamp: row.timestamp,
            })
            .collect();

        Ok(views)
    }

    /// Monotonic compare-and-set for the poller watermark: a concurrent
    /// writer can never roll it backwards.
    pub async fn set_last_shoutbox_id(&self, entry_id: i64) -> bool {
        const SCRIPT: &str = r#"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
if tonumber(ARGV[1]) > cur then
    redis.call('SET', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

        let mut conn = self.conn();
        let result: redis::RedisResult<i64> = redis::Script::new(SCRIPT)
            .key(SHOUTBOX_LAST_ID_KEY)
            .arg(entry_id)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(advanced) => advanced == 1,
            Err(err) => {
                log::warn!("shoutbox watermark CAS failed: {err}");
                false
            }
        }
    }

    pub async fn last_shoutbox_id(&self) -> i64 {
        let mut conn = self.conn();
        match redis::cmd("GET")
            .arg(SHOUTBOX_LAST_ID_KEY)
            .query_async::<_, Option<i64>>(&mut conn)
            .await
        {
            Ok(id) => id.unwrap_or(0),
            Err(err) => {
                log::warn!("shoutbox watermark read failed: {err}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_speed_sums_deterministically() {
        assert_eq!(sum_walk_speed(&[], &[]), 1.0);
        assert_eq!(sum_walk_speed(&[0.25, 0.15], &[0.1]), 1.5);
        // Negative stats (encumbering armor) are allowed.
        assert_eq!(sum_walk_speed(&[-0.2], &[]), 0.8);
    }
}
