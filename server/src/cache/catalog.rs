//! Permanent-tier preloads: the item catalog and the level-XP table.

use protocol::ItemView;

use super::GameCache;
use crate::db::PgContext;
use crate::error::Result;

const LEVELS_KEY: &str = "levels";
pub const MAX_LEVEL: i32 = 60;

fn item_id_key(item_id: i64) -> String {
    format!("items:id:{item_id}")
}

fn item_template_key(template_key: &str) -> String {
    format!("items:key:{template_key}")
}

/// Total XP required to *reach* each level; index 0 is level 1 (zero XP).
pub fn level_xp_table() -> Vec<i64> {
    (0..MAX_LEVEL as i64)
        .map(|n| n * n * 250 + n * 750)
        .collect()
}

/// Level for an XP total, against the given thresholds.
pub fn level_for_xp(table: &[i64], xp: i64) -> i32 {
    let mut level = 1;
    for (index, threshold) in table.iter().enumerate() {
        if xp >= *threshold {
            level = index as i32 + 1;
        } else {
            break;
        }
    }
    level
}

impl GameCache {
    /// Loads every item template and the level table into the permanent
    /// tier. Runs once at startup; items are immutable afterwards.
    pub async fn preload_catalog(&self, db: &PgContext) -> Result<usize> {
        let rows = db.items().all().await?;
        let mut loaded = 0;

        for row in &rows {
            let view = row.to_view()?;
            self.set_json(&item_id_key(view.item_id), &view, None).await;
            self.set_json(&item_template_key(&view.template_key), &view, None)
                .await;
            loaded += 1;
        }

        self.set_json(LEVELS_KEY, &level_xp_table(), None).await;

        log::info!("Preloaded {loaded} item templates into cache");
        Ok(loaded)
    }

    /// Cache-first item lookup by id, back-filling both catalog keys on a
    /// miss.
    pub async fn get_item_by_id(&self, db: &PgContext, item_id: i64) -> Result<Option<ItemView>> {
        if let Some(view) = self.get_json::<ItemView>(&item_id_key(item_id)).await {
            return Ok(Some(view));
        }

        let Some(row) = db.items().find_by_id(item_id).await? else {
            return Ok(None);
        };

        let view = row.to_view()?;
        self.backfill_item(&view).await;
        Ok(Some(view))
    }

    /// Cache-first item lookup by template key, back-filling both catalog
    /// keys on a miss.
    pub async fn get_item_by_template(
        &self,
        db: &PgContext,
        template_key: &str,
    ) -> Result<Option<ItemView>> {
        if let Some(view) = self
            .get_json::<ItemView>(&item_template_key(template_key))
            .await
        {
            return Ok(Some(view));
        }

        let Some(row) = db.items().find_by_template(template_key).await? else {
            return Ok(None);
        };

        let view = row.to_view()?;
        self.backfill_item(&view).await;
        Ok(Some(view))
    }

    async fn backfill_item(&self, view: &ItemView) {
        self.set_json(&item_id_key(view.item_id), view, None).await;
        self.set_json(&item_template_key(&view.template_key), view, None)
            .await;
    }

    /// The level thresholds, from cache or recomputed.
    pub async fn level_table(&self) -> Vec<i64> {
        match self.get_json::<Vec<i64>>(LEVELS_KEY).await {
            Some(table) if !table.is_empty() => table,
            _ => level_xp_table(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_table_is_monotonic_and_starts_at_zero() {
        let table = level_xp_table();
        assert_eq!(table.len(), MAX_LEVEL as usize);
        assert_eq!(table[0], 0);
        for window in table.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn level_for_xp_matches_thresholds() {
        let table = level_xp_table();
        assert_eq!(level_for_xp(&table, 0), 1);
        assert_eq!(level_for_xp(&table, table[1] - 1), 1);
        assert_eq!(level_for_xp(&table, table[1]), 2);
        assert_eq!(level_for_xp(&table, i64::MAX), MAX_LEVEL);
    }
}
