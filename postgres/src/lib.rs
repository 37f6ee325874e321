//! # pagepool-postgres
//!
//! A [`pagepool::PoolStore`] implementation backed by [`sqlx::PgPool`],
//! following the table layout from the data-pool subsystem's external
//! interfaces: a singleton `pool_config` row, `titles`/`contents` as
//! consume-once tables, `keywords`/`images` as randomly-reused tables, and
//! `keyword_groups`/`image_groups` as group-enumeration tables.
//!
//! Table names reaching [`PgStore::mark_used`] are checked against a fixed
//! allowlist before ever being interpolated into a query string — the store
//! is the last line of defense, the [`pagepool::UpdateBatcher`] checks too.

use async_trait::async_trait;
use pagepool::{GeneratorConfig, PoolConfig, PoolItem, PoolKind, PoolStore, StoreError};
use sqlx::{PgPool, Row};

/// The column used for a consume-once row's text payload. The external
/// interface names this generically (`text_column`); this store uses one
/// concrete column name across `titles` and `contents` rather than
/// hard-coding a per-table name, keeping the query builder uniform.
const TEXT_COLUMN: &str = "value";

const ALLOWED_TABLES: &[&str] = &["titles", "contents"];

fn consume_once_table(kind: PoolKind) -> Result<&'static str, StoreError> {
    kind.table_name().ok_or_else(|| StoreError::DisallowedTable(format!("{kind:?}")))
}

fn reusable_table(kind: PoolKind) -> Result<&'static str, StoreError> {
    match kind {
        PoolKind::Keywords => Ok("keywords"),
        PoolKind::Images => Ok("images"),
        _ => Err(StoreError::DisallowedTable(format!("{kind:?}"))),
    }
}

fn group_table(kind: PoolKind) -> &'static str {
    match kind {
        PoolKind::Keywords => "keyword_groups",
        PoolKind::Images => "image_groups",
        PoolKind::Titles => "titles",
        PoolKind::Contents => "contents",
        _ => "titles",
    }
}

/// A [`PoolStore`] backed by a PostgreSQL connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an already-configured [`PgPool`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PoolStore for PgStore {
    async fn load_config(&self) -> Result<PoolConfig, StoreError> {
        let row = sqlx::query("SELECT * FROM pool_config WHERE id = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;

        let title_gen = GeneratorConfig {
            size: row.try_get::<i64, _>("title_gen_size").unwrap_or(64) as usize,
            workers: row.try_get::<i64, _>("title_gen_workers").unwrap_or(2) as usize,
            threshold_frac: row.try_get::<f64, _>("title_gen_threshold_frac").unwrap_or(0.8),
            refill_ms: row.try_get::<i64, _>("title_gen_refill_ms").unwrap_or(50) as u64,
        };
        let keyword_emoji_gen = GeneratorConfig {
            size: row.try_get::<i64, _>("keyword_emoji_gen_size").unwrap_or(64) as usize,
            workers: row.try_get::<i64, _>("keyword_emoji_gen_workers").unwrap_or(2) as usize,
            threshold_frac: row.try_get::<f64, _>("keyword_emoji_gen_threshold_frac").unwrap_or(0.8),
            refill_ms: row.try_get::<i64, _>("keyword_emoji_gen_refill_ms").unwrap_or(50) as u64,
        };

        let mut config = PoolConfig {
            titles_size: row.try_get::<i64, _>("titles_size").unwrap_or(200) as usize,
            contents_size: row.try_get::<i64, _>("contents_size").unwrap_or(200) as usize,
            threshold: row.try_get::<i64, _>("threshold").unwrap_or(40) as usize,
            refill_interval_ms: row.try_get::<i64, _>("refill_interval_ms").unwrap_or(2_000) as u64,
            keywords_size: row.try_get::<i64, _>("keywords_size").unwrap_or(500) as usize,
            images_size: row.try_get::<i64, _>("images_size").unwrap_or(200) as usize,
            refresh_interval_ms: row.try_get::<i64, _>("refresh_interval_ms").unwrap_or(60_000) as u64,
            cls_pool_size: row.try_get::<i64, _>("cls_pool_size").unwrap_or(1_000) as usize,
            url_pool_size: row.try_get::<i64, _>("url_pool_size").unwrap_or(1_000) as usize,
            keyword_emoji_ring_size: row.try_get::<i64, _>("keyword_emoji_ring_size").unwrap_or(500) as usize,
            ring_fill_fraction: row.try_get::<f64, _>("ring_fill_fraction").unwrap_or(0.2),
            title_gen,
            keyword_emoji_gen,
        };
        config.clamp();
        Ok(config)
    }

    async fn fetch_batch(&self, kind: PoolKind, group: i64, limit: usize) -> Result<Vec<PoolItem>, StoreError> {
        let table = consume_once_table(kind)?;
        let sql = format!(
            "SELECT id, {TEXT_COLUMN} FROM {table} WHERE group_id = $1 AND status = 'active' \
             ORDER BY batch_id DESC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(group)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(rows
            .into_iter()
            .map(|row| PoolItem {
                id: row.get::<i64, _>("id"),
                text: row.get::<String, _>(TEXT_COLUMN),
            })
            .collect())
    }

    async fn fetch_reusable(&self, kind: PoolKind, group: i64, limit: usize) -> Result<Vec<String>, StoreError> {
        let table = reusable_table(kind)?;
        let sql = format!("SELECT value FROM {table} WHERE group_id = $1 AND status = 'active' ORDER BY RANDOM() LIMIT $2");
        let rows = sqlx::query(&sql)
            .bind(group)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(rows.into_iter().map(|row| row.get::<String, _>("value")).collect())
    }

    async fn discover_groups(&self, kind: PoolKind) -> Result<Vec<i64>, StoreError> {
        let table = group_table(kind);
        let sql = match kind {
            PoolKind::Keywords | PoolKind::Images => format!("SELECT id AS group_id FROM {table}"),
            _ => format!("SELECT DISTINCT group_id FROM {table} WHERE status = 'active'"),
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(rows.into_iter().map(|row| row.get::<i64, _>("group_id")).collect())
    }

    async fn mark_used(&self, table: &str, ids: &[i64]) -> Result<(), StoreError> {
        if !ALLOWED_TABLES.contains(&table) {
            return Err(StoreError::DisallowedTable(table.to_string()));
        }
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!("UPDATE {table} SET status = 'used' WHERE id = ANY($1)");
        sqlx::query(&sql)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_tables_are_rejected_before_building_sql() {
        assert!(reusable_table(PoolKind::Titles).is_err());
        assert!(consume_once_table(PoolKind::Keywords).is_err());
    }

    #[test]
    fn mark_used_rejects_tables_outside_the_allowlist() {
        assert!(!ALLOWED_TABLES.contains(&"pool_config"));
        assert!(ALLOWED_TABLES.contains(&"titles"));
    }
}
