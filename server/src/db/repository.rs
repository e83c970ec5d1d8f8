use std::future::Future;
use std::time::Duration;

use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use protocol::{EquipSlot, Point, Realm, RegionData};

use super::models::{
    kw_string, pairs_from_points, ActiveSpellRow, CollectableSpawnRow, EquipmentRow, InventoryRow,
    ItemRow, PathRow, PlayerLogRow, PlayerRow, RegionRow, ScreenshotRow, ServerTimeRow,
    ShoutboxRow, SuperbossRow, TerritoryCaptureRow, TerritoryRow, UserSettingsRow, WalkerRow,
};
use crate::error::{GameServerError, Result};

/// One statement per entry; executed in order and all idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        user_id BIGINT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        realm TEXT,
        x INTEGER NOT NULL DEFAULT 0,
        y INTEGER NOT NULL DEFAULT 0,
        health BIGINT NOT NULL DEFAULT 1000,
        max_health BIGINT NOT NULL DEFAULT 1000,
        mana BIGINT NOT NULL DEFAULT 500,
        max_mana BIGINT NOT NULL DEFAULT 500,
        level INTEGER NOT NULL DEFAULT 1,
        xp BIGINT NOT NULL DEFAULT 0,
        is_gm BOOLEAN NOT NULL DEFAULT FALSE,
        last_active BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS items (
        item_id BIGINT PRIMARY KEY,
        template_key TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        item_type TEXT NOT NULL,
        slot TEXT,
        stats JSONB NOT NULL DEFAULT '{}',
        rarity TEXT NOT NULL DEFAULT 'common'
    )",
    "CREATE TABLE IF NOT EXISTS inventory (
        inventory_id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES players(user_id),
        item_id BIGINT NOT NULL REFERENCES items(item_id),
        quantity BIGINT NOT NULL DEFAULT 1,
        UNIQUE (user_id, item_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_inventory_user ON inventory(user_id)",
    "CREATE TABLE IF NOT EXISTS equipment (
        user_id BIGINT PRIMARY KEY REFERENCES players(user_id),
        head BIGINT,
        body BIGINT,
        hands BIGINT,
        shoulders BIGINT,
        legs BIGINT,
        weapon_r BIGINT,
        weapon_l BIGINT,
        ring_r BIGINT,
        ring_l BIGINT,
        amulet BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS territories (
        territory_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        owner_realm TEXT NOT NULL,
        health BIGINT NOT NULL,
        max_health BIGINT NOT NULL,
        x INTEGER NOT NULL,
        y INTEGER NOT NULL,
        contested BOOLEAN NOT NULL DEFAULT FALSE,
        contested_since BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS territory_captures (
        capture_id BIGSERIAL PRIMARY KEY,
        territory_id BIGINT NOT NULL REFERENCES territories(territory_id),
        previous_realm TEXT NOT NULL,
        new_realm TEXT NOT NULL,
        captured_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_captures_territory ON territory_captures(territory_id)",
    "CREATE TABLE IF NOT EXISTS superbosses (
        boss_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        health BIGINT NOT NULL,
        max_health BIGINT NOT NULL,
        x INTEGER NOT NULL,
        y INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS walkers (
        walker_id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL UNIQUE REFERENCES players(user_id),
        positions JSONB NOT NULL,
        current_index INTEGER NOT NULL DEFAULT 0,
        updated_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS active_spells (
        spell_id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES players(user_id),
        spell_key TEXT NOT NULL,
        duration BIGINT NOT NULL,
        remaining BIGINT NOT NULL,
        heal_per_tick BIGINT NOT NULL DEFAULT 0,
        mana_per_tick BIGINT NOT NULL DEFAULT 0,
        damage_per_tick BIGINT NOT NULL DEFAULT 0,
        walk_speed DOUBLE PRECISION NOT NULL DEFAULT 0,
        cooldown BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_spells_user ON active_spells(user_id)",
    "CREATE TABLE IF NOT EXISTS server_time (
        singleton INTEGER PRIMARY KEY DEFAULT 1 CHECK (singleton = 1),
        started_at BIGINT NOT NULL,
        tick_seconds BIGINT NOT NULL DEFAULT 150,
        ingame_hour INTEGER NOT NULL DEFAULT 0,
        ingame_minute INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS player_logs (
        log_id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES players(user_id),
        message TEXT NOT NULL,
        log_type TEXT NOT NULL,
        created_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_logs_user_created ON player_logs(user_id, created_at)",
    "CREATE TABLE IF NOT EXISTS user_settings (
        user_id BIGINT PRIMARY KEY REFERENCES players(user_id),
        settings JSONB NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS shoutbox_messages (
        entry_id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_shoutbox_timestamp ON shoutbox_messages(timestamp)",
    "CREATE TABLE IF NOT EXISTS map_regions (
        region_id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        realm TEXT,
        points JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS map_paths (
        path_id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        points JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS collectable_spawns (
        spawn_id BIGINT PRIMARY KEY,
        template_key TEXT NOT NULL,
        x INTEGER NOT NULL,
        y INTEGER NOT NULL,
        respawn_seconds BIGINT NOT NULL DEFAULT 300
    )",
    "CREATE TABLE IF NOT EXISTS screenshots (
        screenshot_id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES players(user_id),
        title TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at BIGINT NOT NULL
    )",
];

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

/// Runs the operation, retrying exactly once with jitter on a transient
/// failure. The second failure surfaces as `Internal`.
pub(crate) async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(err) if is_transient(&err) => {
            let jitter_ms = rand::thread_rng().gen_range(50..250);
            log::warn!("transient database error in {op_name}, retrying in {jitter_ms}ms: {err}");
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

            op().await.map_err(|err| {
                log::error!("{op_name} failed after retry: {err}");
                GameServerError::Internal(format!("{op_name}: {err}"))
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Maps a unique-constraint violation to the given business error; every
/// other database error passes through unchanged.
fn map_unique(err: sqlx::Error, business: GameServerError) -> GameServerError {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        business
    } else {
        err.into()
    }
}

#[derive(Clone)]
pub struct PgContext {
    pool: PgPool,
}

impl PgContext {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        log::info!("Database schema initialized ({} statements)", SCHEMA.len());
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub fn players(&self) -> PlayerRepository {
        PlayerRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn items(&self) -> ItemRepository {
        ItemRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn equipment(&self) -> EquipmentRepository {
        EquipmentRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn territories(&self) -> TerritoryRepository {
        TerritoryRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn superbosses(&self) -> SuperbossRepository {
        SuperbossRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn walkers(&self) -> WalkerRepository {
        WalkerRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn spells(&self) -> SpellRepository {
        SpellRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn logs(&self) -> LogRepository {
        LogRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn shoutbox(&self) -> ShoutboxRepository {
        ShoutboxRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn server_time(&self) -> ServerTimeRepository {
        ServerTimeRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn map_data(&self) -> MapDataRepository {
        MapDataRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn spawns(&self) -> SpawnRepository {
        SpawnRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn screenshots(&self) -> ScreenshotRepository {
        ScreenshotRepository {
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PlayerRepository {
    pool: PgPool,
}

impl PlayerRepository {
    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<PlayerRow>> {
        with_retry("players.find_by_id", || {
            let pool = self.pool.clone();
            async move {
                sqlx::query_as::<_, PlayerRow>("SELECT * FROM players WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&pool)
                    .await
            }
        })
        .await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<PlayerRow>> {
        Ok(
            sqlx::query_as::<_, PlayerRow>("SELECT * FROM players WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn find_by_ids(&self, user_ids: &[i64]) -> Result<Vec<PlayerRow>> {
        Ok(
            sqlx::query_as::<_, PlayerRow>("SELECT * FROM players WHERE user_id = ANY($1)")
                .bind(user_ids)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Ensures a row exists for this forum identity. Username follows the
    /// forum on change; game state is untouched.
    pub async fn upsert_identity(&self, user_id: i64, username: &str, now: i64) -> Result<PlayerRow> {
        Ok(sqlx::query_as::<_, PlayerRow>(
            "INSERT INTO players (user_id, username, last_active) VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username
             RETURNING *",
        )
        .bind(user_id)
        .bind(username)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Sets the realm and the spawn position. Idempotent when the realm is
    /// unchanged; `AlreadyInRealm` when a different realm was picked before.
    pub async fn select_realm(
        &self,
        user_id: i64,
        realm: Realm,
        spawn: Point,
    ) -> Result<PlayerRow> {
        let updated = sqlx::query_as::<_, PlayerRow>(
            "UPDATE players SET realm = $2,
                    x = CASE WHEN realm IS NULL THEN $3 ELSE x END,
                    y = CASE WHEN realm IS NULL THEN $4 ELSE y END
             WHERE user_id = $1 AND (realm IS NULL OR realm = $2)
             RETURNING *",
        )
        .bind(user_id)
        .bind(realm.as_str())
        .bind(spawn.x)
        .bind(spawn.y)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(row),
            None => {
                // Either the player does not exist or the realm differs.
                let existing = self.find_by_id(user_id).await?;
                match existing {
                    Some(_) => Err(GameServerError::AlreadyInRealm),
                    None => Err(GameServerError::NotFound(format!("player {user_id}"))),
                }
            }
        }
    }

    pub async fn set_position(&self, user_id: i64, x: i32, y: i32) -> Result<()> {
        sqlx::query("UPDATE players SET x = $2, y = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(x)
            .bind(y)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_health_mana(&self, user_id: i64, health: i64, mana: i64) -> Result<()> {
        sqlx::query("UPDATE players SET health = $2, mana = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(health)
            .bind(mana)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_xp(&self, user_id: i64, amount: i64) -> Result<i64> {
        let (xp,): (i64,) =
            sqlx::query_as("UPDATE players SET xp = xp + $2 WHERE user_id = $1 RETURNING xp")
                .bind(user_id)
                .bind(amount)
                .fetch_one(&self.pool)
                .await?;
        Ok(xp)
    }

    pub async fn set_level(&self, user_id: i64, level: i32) -> Result<()> {
        sqlx::query("UPDATE players SET level = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(level)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_gm(&self, user_id: i64) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_gm FROM players WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(gm,)| gm).unwrap_or(false))
    }

    /// One batched UPDATE over the drained last-active buffer. Returns the
    /// number of rows touched.
    pub async fn batch_update_last_active(&self, entries: &[(i64, i64)]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut sql = String::from("UPDATE players SET last_active = CASE user_id ");
        for (user_id, seen_at) in entries {
            sql.push_str(&format!("WHEN {user_id} THEN {seen_at} "));
        }
        sql.push_str("ELSE last_active END WHERE user_id IN (");
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.to_string()).collect();
        sql.push_str(&ids.join(","));
        sql.push(')');

        let result = with_retry("players.batch_update_last_active", || {
            let pool = self.pool.clone();
            let sql = sql.clone();
            async move { sqlx::query(&sql).execute(&pool).await }
        })
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct ItemRepository {
    pool: PgPool,
}

impl ItemRepository {
    pub async fn all(&self) -> Result<Vec<ItemRow>> {
        Ok(
            sqlx::query_as::<_, ItemRow>("SELECT * FROM items ORDER BY item_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn find_by_id(&self, item_id: i64) -> Result<Option<ItemRow>> {
        Ok(
            sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE item_id = $1")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn find_by_template(&self, template_key: &str) -> Result<Option<ItemRow>> {
        Ok(
            sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE template_key = $1")
                .bind(template_key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<InventoryRow>> {
        Ok(sqlx::query_as::<_, InventoryRow>(
            "SELECT * FROM inventory WHERE user_id = $1 ORDER BY inventory_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn find_entry(&self, inventory_id: i64) -> Result<Option<InventoryRow>> {
        Ok(
            sqlx::query_as::<_, InventoryRow>("SELECT * FROM inventory WHERE inventory_id = $1")
                .bind(inventory_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Grants items, stacking onto an existing entry for the same item.
    pub async fn add_item(&self, user_id: i64, item_id: i64, quantity: i64) -> Result<InventoryRow> {
        Ok(sqlx::query_as::<_, InventoryRow>(
            "INSERT INTO inventory (user_id, item_id, quantity) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, item_id)
             DO UPDATE SET quantity = inventory.quantity + EXCLUDED.quantity
             RETURNING *",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Decrements the stack and deletes the entry at zero. Returns the
    /// remaining quantity.
    pub async fn consume_one(&self, inventory_id: i64) -> Result<i64> {
        let remaining: Option<(i64,)> = sqlx::query_as(
            "UPDATE inventory SET quantity = quantity - 1
             WHERE inventory_id = $1 AND quantity > 0
             RETURNING quantity",
        )
        .bind(inventory_id)
        .fetch_optional(&self.pool)
        .await?;

        let remaining = remaining
            .map(|(q,)| q)
            .ok_or_else(|| GameServerError::NotFound(format!("inventory entry {inventory_id}")))?;

        if remaining == 0 {
            sqlx::query("DELETE FROM inventory WHERE inventory_id = $1")
                .bind(inventory_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(remaining)
    }
}

#[derive(Clone)]
pub struct EquipmentRepository {
    pool: PgPool,
}

impl EquipmentRepository {
    pub async fn get_or_create(&self, user_id: i64) -> Result<EquipmentRow> {
        Ok(sqlx::query_as::<_, EquipmentRow>(
            "INSERT INTO equipment (user_id) VALUES ($1)
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Writes one slot. Callers serialize per user, so read-modify-write
    /// across slots is race-free.
    pub async fn set_slot(
        &self,
        user_id: i64,
        slot: EquipSlot,
        inventory_id: Option<i64>,
    ) -> Result<()> {
        // Column names come from EquipSlot::column(), a closed static set.
        let sql = format!(
            "UPDATE equipment SET {} = $2 WHERE user_id = $1",
            slot.column()
        );

        sqlx::query(&sql)
            .bind(user_id)
            .bind(inventory_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct TerritoryRepository {
    pool: PgPool,
}

impl TerritoryRepository {
    pub async fn all(&self) -> Result<Vec<TerritoryRow>> {
        Ok(
            sqlx::query_as::<_, TerritoryRow>("SELECT * FROM territories ORDER BY territory_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn find_by_id(&self, territory_id: i64) -> Result<Option<TerritoryRow>> {
        Ok(
            sqlx::query_as::<_, TerritoryRow>("SELECT * FROM territories WHERE territory_id = $1")
                .bind(territory_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn update_health(
        &self,
        territory_id: i64,
        health: i64,
        contested: bool,
        contested_since: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE territories SET health = $2, contested = $3, contested_since = $4
             WHERE territory_id = $1",
        )
        .bind(territory_id)
        .bind(health)
        .bind(contested)
        .bind(contested_since)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ownership change from the war feed: the new owner starts at zero
    /// health and regenerates from there.
    pub async fn set_owner(&self, territory_id: i64, realm: Realm, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE territories
             SET owner_realm = $2, health = 0, contested = TRUE, contested_since = $3
             WHERE territory_id = $1",
        )
        .bind(territory_id)
        .bind(realm.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_capture(
        &self,
        territory_id: i64,
        previous: Realm,
        new: Realm,
        captured_at: i64,
    ) -> Result<TerritoryCaptureRow> {
        Ok(sqlx::query_as::<_, TerritoryCaptureRow>(
            "INSERT INTO territory_captures (territory_id, previous_realm, new_realm, captured_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(territory_id)
        .bind(previous.as_str())
        .bind(new.as_str())
        .bind(captured_at)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[derive(Clone)]
pub struct SuperbossRepository {
    pool: PgPool,
}

impl SuperbossRepository {
    pub async fn all(&self) -> Result<Vec<SuperbossRow>> {
        Ok(
            sqlx::query_as::<_, SuperbossRow>("SELECT * FROM superbosses ORDER BY boss_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn update_health(&self, boss_id: i64, health: i64) -> Result<()> {
        sqlx::query("UPDATE superbosses SET health = $2 WHERE boss_id = $1")
            .bind(boss_id)
            .bind(health)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct WalkerRepository {
    pool: PgPool,
}

impl WalkerRepository {
    /// Inserts the walker row. The one-active-walker-per-user constraint is
    /// enforced by the unique index; racing inserts surface as a business
    /// error rather than a 500.
    pub async fn insert(
        &self,
        user_id: i64,
        positions: &[Point],
        updated_at: i64,
    ) -> Result<WalkerRow> {
        sqlx::query_as::<_, WalkerRow>(
            "INSERT INTO walkers (user_id, positions, current_index, updated_at)
             VALUES ($1, $2, 0, $3)
             RETURNING *",
        )
        .bind(user_id)
        .bind(Json(pairs_from_points(positions)))
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            map_unique(
                err,
                GameServerError::InvalidCommand("walker already active".to_string()),
            )
        })
    }

    pub async fn delete(&self, walker_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM walkers WHERE walker_id = $1")
            .bind(walker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_for_user(&self, user_id: i64) -> Result<Option<i64>> {
        let deleted: Option<(i64,)> =
            sqlx::query_as("DELETE FROM walkers WHERE user_id = $1 RETURNING walker_id")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(deleted.map(|(id,)| id))
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Option<WalkerRow>> {
        Ok(
            sqlx::query_as::<_, WalkerRow>("SELECT * FROM walkers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

#[derive(Clone)]
pub struct SpellRepository {
    pool: PgPool,
}

impl SpellRepository {
    pub async fn all_active(&self) -> Result<Vec<ActiveSpellRow>> {
        Ok(
            sqlx::query_as::<_, ActiveSpellRow>("SELECT * FROM active_spells ORDER BY spell_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn active_for_user(&self, user_id: i64) -> Result<Vec<ActiveSpellRow>> {
        Ok(
            sqlx::query_as::<_, ActiveSpellRow>("SELECT * FROM active_spells WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Starts a spell, replacing any active one with the same key: same-key
    /// buffs never stack.
    pub async fn replace(&self, spell: &NewSpell) -> Result<ActiveSpellRow> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM active_spells WHERE user_id = $1 AND spell_key = $2")
            .bind(spell.user_id)
            .bind(&spell.spell_key)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, ActiveSpellRow>(
            "INSERT INTO active_spells
             (user_id, spell_key, duration, remaining, heal_per_tick, mana_per_tick,
              damage_per_tick, walk_speed, cooldown)
             VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(spell.user_id)
        .bind(&spell.spell_key)
        .bind(spell.duration)
        .bind(spell.heal_per_tick)
        .bind(spell.mana_per_tick)
        .bind(spell.damage_per_tick)
        .bind(spell.walk_speed)
        .bind(spell.cooldown)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// One tick for every active spell: decrement remaining and cooldown.
    /// Returns the rows expiring on this tick. A row whose effect has run
    /// out but whose cooldown is still draining lingers (it is the cooldown
    /// source of truth) and is reaped once both reach zero.
    pub async fn tick_all(&self) -> Result<Vec<ActiveSpellRow>> {
        let mut tx = self.pool.begin().await?;

        let expiring = sqlx::query_as::<_, ActiveSpellRow>(
            "SELECT * FROM active_spells WHERE remaining = 1",
        )
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE active_spells
             SET remaining = GREATEST(remaining - 1, 0),
                 cooldown = GREATEST(cooldown - 1, 0)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM active_spells WHERE remaining <= 0 AND cooldown <= 0")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(expiring)
    }

    /// Remaining cooldown for the key, if any row still carries one.
    pub async fn cooldown_remaining(&self, user_id: i64, spell_key: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT cooldown FROM active_spells
             WHERE user_id = $1 AND spell_key = $2 AND cooldown > 0",
        )
        .bind(user_id)
        .bind(spell_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(c,)| c))
    }
}

#[derive(Debug, Clone)]
pub struct NewSpell {
    pub user_id: i64,
    pub spell_key: String,
    pub duration: i64,
    pub heal_per_tick: i64,
    pub mana_per_tick: i64,
    pub damage_per_tick: i64,
    pub walk_speed: f64,
    pub cooldown: i64,
}

#[derive(Clone)]
pub struct LogRepository {
    pool: PgPool,
}

impl LogRepository {
    pub async fn insert(
        &self,
        user_id: i64,
        message: &str,
        log_type: &protocol::LogKind,
        created_at: i64,
    ) -> Result<PlayerLogRow> {
        Ok(sqlx::query_as::<_, PlayerLogRow>(
            "INSERT INTO player_logs (user_id, message, log_type, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(user_id)
        .bind(message)
        .bind(kw_string(log_type))
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn recent_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<PlayerLogRow>> {
        Ok(sqlx::query_as::<_, PlayerLogRow>(
            "SELECT * FROM player_logs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub async fn get(&self, user_id: i64) -> Result<Option<UserSettingsRow>> {
        Ok(
            sqlx::query_as::<_, UserSettingsRow>("SELECT * FROM user_settings WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn put(&self, user_id: i64, settings: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, settings) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET settings = EXCLUDED.settings",
        )
        .bind(user_id)
        .bind(Json(settings.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ShoutboxRepository {
    pool: PgPool,
}

impl ShoutboxRepository {
    pub async fn insert(&self, username: &str, message: &str, timestamp: i64) -> Result<ShoutboxRow> {
        Ok(sqlx::query_as::<_, ShoutboxRow>(
            "INSERT INTO shoutbox_messages (username, message, timestamp)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(username)
        .bind(message)
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ShoutboxRow>> {
        Ok(sqlx::query_as::<_, ShoutboxRow>(
            "SELECT * FROM shoutbox_messages ORDER BY entry_id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[derive(Clone)]
pub struct ServerTimeRepository {
    pool: PgPool,
}

impl ServerTimeRepository {
    /// Fetches the singleton clock row, creating it on first boot.
    pub async fn get_or_init(&self, now: i64) -> Result<ServerTimeRow> {
        Ok(sqlx::query_as::<_, ServerTimeRow>(
            "INSERT INTO server_time (singleton, started_at) VALUES (1, $1)
             ON CONFLICT (singleton) DO UPDATE SET singleton = 1
             RETURNING started_at, tick_seconds, ingame_hour, ingame_minute",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_clock(&self, ingame_hour: i32, ingame_minute: i32) -> Result<()> {
        sqlx::query("UPDATE server_time SET ingame_hour = $1, ingame_minute = $2 WHERE singleton = 1")
            .bind(ingame_hour)
            .bind(ingame_minute)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MapDataRepository {
    pool: PgPool,
}

impl MapDataRepository {
    pub async fn all_regions(&self) -> Result<Vec<RegionRow>> {
        Ok(
            sqlx::query_as::<_, RegionRow>("SELECT * FROM map_regions ORDER BY region_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn upsert_region(&self, region: &RegionData) -> Result<RegionRow> {
        if region.region_id == 0 {
            Ok(sqlx::query_as::<_, RegionRow>(
                "INSERT INTO map_regions (name, kind, realm, points)
                 VALUES ($1, $2, $3, $4)
                 RETURNING *",
            )
            .bind(&region.name)
            .bind(kw_string(&region.kind))
            .bind(region.realm.map(|r| r.as_str()))
            .bind(Json(pairs_from_points(&region.points)))
            .fetch_one(&self.pool)
            .await?)
        } else {
            Ok(sqlx::query_as::<_, RegionRow>(
                "INSERT INTO map_regions (region_id, name, kind, realm, points)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (region_id) DO UPDATE
                 SET name = EXCLUDED.name, kind = EXCLUDED.kind,
                     realm = EXCLUDED.realm, points = EXCLUDED.points
                 RETURNING *",
            )
            .bind(region.region_id)
            .bind(&region.name)
            .bind(kw_string(&region.kind))
            .bind(region.realm.map(|r| r.as_str()))
            .bind(Json(pairs_from_points(&region.points)))
            .fetch_one(&self.pool)
            .await?)
        }
    }

    pub async fn delete_region(&self, region_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM map_regions WHERE region_id = $1")
            .bind(region_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn all_paths(&self) -> Result<Vec<PathRow>> {
        Ok(
            sqlx::query_as::<_, PathRow>("SELECT * FROM map_paths ORDER BY path_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn upsert_path(&self, path: &protocol::PathData) -> Result<PathRow> {
        if path.path_id == 0 {
            Ok(sqlx::query_as::<_, PathRow>(
                "INSERT INTO map_paths (name, points) VALUES ($1, $2) RETURNING *",
            )
            .bind(&path.name)
            .bind(Json(pairs_from_points(&path.points)))
            .fetch_one(&self.pool)
            .await?)
        } else {
            Ok(sqlx::query_as::<_, PathRow>(
                "INSERT INTO map_paths (path_id, name, points)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (path_id) DO UPDATE
                 SET name = EXCLUDED.name, points = EXCLUDED.points
                 RETURNING *",
            )
            .bind(path.path_id)
            .bind(&path.name)
            .bind(Json(pairs_from_points(&path.points)))
            .fetch_one(&self.pool)
            .await?)
        }
    }

    pub async fn delete_path(&self, path_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM map_paths WHERE path_id = $1")
            .bind(path_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct SpawnRepository {
    pool: PgPool,
}

impl SpawnRepository {
    pub async fn all(&self) -> Result<Vec<CollectableSpawnRow>> {
        Ok(
            sqlx::query_as::<_, CollectableSpawnRow>(
                "SELECT * FROM collectable_spawns ORDER BY spawn_id",
            )
            .fetch_all(&self.pool)
            .await?,
        )
    }

    pub async fn find_by_id(&self, spawn_id: i64) -> Result<Option<CollectableSpawnRow>> {
        Ok(sqlx::query_as::<_, CollectableSpawnRow>(
            "SELECT * FROM collectable_spawns WHERE spawn_id = $1",
        )
        .bind(spawn_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[derive(Clone)]
pub struct ScreenshotRepository {
    pool: PgPool,
}

impl ScreenshotRepository {
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<ScreenshotRow>> {
        Ok(sqlx::query_as::<_, ScreenshotRow>(
            "SELECT * FROM screenshots WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert(
        &self,
        user_id: i64,
        title: &str,
        data: &str,
        created_at: i64,
    ) -> Result<ScreenshotRow> {
        Ok(sqlx::query_as::<_, ScreenshotRow>(
            "INSERT INTO screenshots (user_id, title, data, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(user_id)
        .bind(title)
        .bind(data)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn delete(&self, screenshot_id: i64, user_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM screenshots WHERE screenshot_id = $1 AND user_id = $2")
                .bind(screenshot_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
