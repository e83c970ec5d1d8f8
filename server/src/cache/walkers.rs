//! Hot walker state: the whole set lives in one hash, read every walker
//! tick and advanced in cache only. Postgres sees a walker exactly twice,
//! on creation and on deletion.

use serde::{Deserialize, Serialize};

use protocol::Point;

use super::GameCache;

const WALKERS_KEY: &str = "active_walkers";

fn user_index_key(user_id: i64) -> String {
    format!("walker_by_user:{user_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalkerState {
    pub walker_id: i64,
    pub user_id: i64,
    pub positions: Vec<Point>,
    pub current_index: usize,
    pub updated_at: i64,
}

impl WalkerState {
    /// Position the walker currently stands on.
    pub fn current_position(&self) -> Point {
        self.positions
            .get(self.current_index)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.current_index + 1 >= self.positions.len()
    }
}

impl GameCache {
    pub async fn put_walker(&self, state: &WalkerState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("walker {} failed to serialize: {err}", state.walker_id);
                return;
            }
        };

        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::pipe()
            .cmd("HSET")
            .arg(WALKERS_KEY)
            .arg(state.walker_id)
            .arg(raw)
            .ignore()
            .cmd("SET")
            .arg(user_index_key(state.user_id))
            .arg(state.walker_id)
            .query_async(&mut conn)
            .await;

        if let Err(err) = result {
            log::warn!("walker cache write failed for {}: {err}", state.walker_id);
        }
    }

    /// The whole hot set, as the walker tick consumes it.
    pub async fn all_walkers(&self) -> Vec<WalkerState> {
        let mut conn = self.conn();
        let raw: redis::RedisResult<Vec<(String, String)>> = redis::cmd("HGETALL")
            .arg(WALKERS_KEY)
            .query_async(&mut conn)
            .await;

        match raw {
            Ok(pairs) => pairs
                .into_iter()
                .filter_map(|(field, json)| match serde_json::from_str(&json) {
                    Ok(state) => Some(state),
                    Err(err) => {
                        log::warn!("walker hash field {field} failed to parse: {err}");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                log::warn!("walker hash read failed: {err}");
                Vec::new()
            }
        }
    }

    /// Cache-only index advance; no relational write.
    pub async fn update_walker(&self, state: &WalkerState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("walker {} failed to serialize: {err}", state.walker_id);
                return;
            }
        };

        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::cmd("HSET")
            .arg(WALKERS_KEY)
            .arg(state.walker_id)
            .arg(raw)
            .query_async(&mut conn)
            .await;

        if let Err(err) = result {
            log::warn!("walker cache update failed for {}: {err}", state.walker_id);
        }
    }

    pub async fn remove_walker(&self, walker_id: i64, user_id: i64) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::pipe()
            .cmd("HDEL")
            .arg(WALKERS_KEY)
            .arg(walker_id)
            .ignore()
            .cmd("DEL")
            .arg(user_index_key(user_id))
            .query_async(&mut conn)
            .await;

        if let Err(err) = result {
            log::warn!("walker cache removal failed for {walker_id}: {err}");
        }
    }

    /// O(1) interruption lookup.
    pub async fn walker_id_for_user(&self, user_id: i64) -> Option<i64> {
        let mut conn = self.conn();
        match redis::cmd("GET")
            .arg(user_index_key(user_id))
            .query_async::<_, Option<i64>>(&mut conn)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                log::warn!("walker user index read failed for {user_id}: {err}");
                None
            }
        }
    }

    pub async fn walker_by_id(&self, walker_id: i64) -> Option<WalkerState> {
        let mut conn = self.conn();
        let raw: Option<String> = match redis::cmd("HGET")
            .arg(WALKERS_KEY)
            .arg(walker_id)
            .query_async(&mut conn)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("walker hash read failed for {walker_id}: {err}");
                return None;
            }
        };

        raw.and_then(|json| serde_json::from_str(&json).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(positions: Vec<Point>, current_index: usize) -> WalkerState {
        WalkerState {
            walker_id: 1,
            user_id: 7,
            positions,
            current_index,
            updated_at: 0,
        }
    }

    #[test]
    fn one_element_path_is_immediately_finished() {
        let walker = state(vec![Point::new(5, 5)], 0);
        assert!(walker.is_finished());
        assert_eq!(walker.current_position(), Point::new(5, 5));
    }

    #[test]
    fn finished_only_at_last_index() {
        let path = vec![Point::new(0, 0), Point::new(32, 0), Point::new(64, 0)];
        assert!(!state(path.clone(), 0).is_finished());
        assert!(!state(path.clone(), 1).is_finished());
        assert!(state(path, 2).is_finished());
    }
}
