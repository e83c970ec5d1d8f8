//! Per-spawn collectable state machine, held as a single Redis key so the
//! `available → collecting` transition is one atomic CAS.

use super::GameCache;

fn spawn_key(spawn_id: i64) -> String {
    format!("collectable:{spawn_id}")
}

/// Live state of a spawn. An absent key means `Available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectableState {
    Available,
    Collecting { user_id: i64, since: i64 },
    Collected { since: i64 },
}

impl CollectableState {
    pub fn encode(&self) -> String {
        match self {
            CollectableState::Available => "available".to_string(),
            CollectableState::Collecting { user_id, since } => {
                format!("collecting:{user_id}:{since}")
            }
            CollectableState::Collected { since } => format!("collected:{since}"),
        }
    }

    pub fn decode(raw: &str) -> Option<Self> {
        if raw == "available" {
            return Some(CollectableState::Available);
        }

        let mut parts = raw.split(':');
        match parts.next()? {
            "collecting" => Some(CollectableState::Collecting {
                user_id: parts.next()?.parse().ok()?,
                since: parts.next()?.parse().ok()?,
            }),
            "collected" => Some(CollectableState::Collected {
                since: parts.next()?.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// CAS from `available` (or absent) to `collecting`. KEYS[1] spawn key,
/// ARGV[1] encoded collecting state.
const BEGIN_COLLECT_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur or cur == 'available' then
    redis.call('SET', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

/// CAS from `collecting:<user>:*` to `collected`. KEYS[1] spawn key,
/// ARGV[1] user id, ARGV[2] encoded collected state.
const FINISH_COLLECT_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur and string.sub(cur, 1, string.len('collecting:' .. ARGV[1] .. ':')) == 'collecting:' .. ARGV[1] .. ':' then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

impl GameCache {
    /// Attempts the `available → collecting` transition. `false` means
    /// someone else holds the spawn.
    pub async fn try_begin_collect(&self, spawn_id: i64, user_id: i64, now: i64) -> bool {
        let state = CollectableState::Collecting {
            user_id,
            since: now,
        };

        let mut conn = self.conn();
        let result: redis::RedisResult<i64> = redis::Script::new(BEGIN_COLLECT_SCRIPT)
            .key(spawn_key(spawn_id))
            .arg(state.encode())
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(won) => won == 1,
            Err(err) => {
                log::warn!("collect CAS failed for spawn {spawn_id}: {err}");
                false
            }
        }
    }

    /// Attempts the `collecting(user) → collected` transition; only the
    /// lock holder succeeds.
    pub async fn try_finish_collect(&self, spawn_id: i64, user_id: i64, now: i64) -> bool {
        let state = CollectableState::Collected { since: now };

        let mut conn = self.conn();
        let result: redis::RedisResult<i64> = redis::Script::new(FINISH_COLLECT_SCRIPT)
            .key(spawn_key(spawn_id))
            .arg(user_id)
            .arg(state.encode())
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(won) => won == 1,
            Err(err) => {
                log::warn!("collect finish CAS failed for spawn {spawn_id}: {err}");
                false
            }
        }
    }

    pub async fn collectable_state(&self, spawn_id: i64) -> CollectableState {
        let mut conn = self.conn();
        let raw: Option<String> = match redis::cmd("GET")
            .arg(spawn_key(spawn_id))
            .query_async(&mut conn)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("collectable state read failed for {spawn_id}: {err}");
                None
            }
        };

        raw.as_deref()
            .and_then(CollectableState::decode)
            .unwrap_or(CollectableState::Available)
    }

    /// Reverts the spawn to `available` (timeout, walk-away, respawn).
    pub async fn reset_collectable(&self, spawn_id: i64) {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(spawn_key(spawn_id))
            .arg(CollectableState::Available.encode())
            .query_async(&mut conn)
            .await;

        if let Err(err) = result {
            log::warn!("collectable reset failed for {spawn_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding_roundtrip() {
        for state in [
            CollectableState::Available,
            CollectableState::Collecting {
                user_id: 42,
                since: 1_700_000_000,
            },
            CollectableState::Collected {
                since: 1_700_000_123,
            },
        ] {
            assert_eq!(CollectableState::decode(&state.encode()), Some(state));
        }
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert_eq!(CollectableState::decode("held:9"), None);
        assert_eq!(CollectableState::decode("collecting:notanumber:5"), None);
    }
}
