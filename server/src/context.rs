//! The typed context threaded through handlers and workers. There is no
//! mutable global state; everything a handler may touch hangs off this.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};

use protocol::{LogKind, ServerEvent};

use crate::auth_token::{now_epoch, AuthTokenService};
use crate::cache::GameCache;
use crate::config::GameConfig;
use crate::db::{CollectableSpawnRow, PgContext};
use crate::error::Result;
use crate::events::EventBus;
use crate::forum::ForumAuthClient;
use crate::pathfinding::PathfindingService;

const LOCK_SHARDS: usize = 64;

/// Sharded per-user mutexes serializing state transitions (move, equip,
/// inventory) for one user while other users proceed in parallel.
pub struct UserLocks {
    shards: Vec<Mutex<()>>,
}

impl UserLocks {
    fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, user_id: i64) -> MutexGuard<'_, ()> {
        let shard = (user_id as u64 % LOCK_SHARDS as u64) as usize;
        self.shards[shard].lock().await
    }
}

#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<GameConfig>,
    pub db: PgContext,
    pub cache: GameCache,
    pub bus: EventBus,
    pub pathfinder: PathfindingService,
    pub auth_tokens: AuthTokenService,
    pub forum: ForumAuthClient,
    pub spawns: Arc<Vec<CollectableSpawnRow>>,
    pub user_locks: Arc<UserLocks>,
    started_at: Instant,
}

impl ServerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<GameConfig>,
        db: PgContext,
        cache: GameCache,
        bus: EventBus,
        pathfinder: PathfindingService,
        auth_tokens: AuthTokenService,
        forum: ForumAuthClient,
        spawns: Vec<CollectableSpawnRow>,
    ) -> Self {
        Self {
            config,
            db,
            cache,
            bus,
            pathfinder,
            auth_tokens,
            forum,
            spawns: Arc::new(spawns),
            user_locks: Arc::new(UserLocks::new()),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Records a player log row and pushes it to the owner's sockets.
    /// Semantically significant actions call this everywhere.
    pub async fn log_player(&self, user_id: i64, kind: LogKind, message: &str) -> Result<()> {
        let row = self
            .db
            .logs()
            .insert(user_id, message, &kind, now_epoch())
            .await?;

        self.bus.send_to_user(
            user_id,
            ServerEvent::LogMessage {
                log_type: kind,
                message: row.message,
                created_at: row.created_at,
            },
        );

        Ok(())
    }
}
