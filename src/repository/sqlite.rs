use super::ItemRepository;
use crate::model::Item;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id           INTEGER NOT NULL,
    processed_at TEXT    NOT NULL,
    api_version  TEXT    NOT NULL,
    channel      TEXT    NOT NULL,
    item         TEXT    NOT NULL
)
"#;

const INSERT_ITEM: &str = r#"
INSERT INTO items (id, processed_at, api_version, channel, item)
VALUES (?, ?, ?, ?, ?)
"#;

/// Appends one row per save to the `items` table.
#[derive(Debug, Clone)]
pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    /// Opens (creating if needed) the database at `url` and ensures the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true);
        // every connection to an in-memory database sees its own empty copy
        let max_connections = if url.contains(":memory:") || url.contains("mode=memory") {
            1
        } else {
            4
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open sqlite database {url}"))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_ITEMS_TABLE)
            .execute(&pool)
            .await
            .context("failed to create items table")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of rows stored for `stage`.
    pub async fn count_for_stage(&self, stage: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS saved FROM items WHERE channel = ?")
            .bind(stage)
            .fetch_one(&self.pool)
            .await
            .context("failed to count items")?;
        Ok(row.try_get("saved")?)
    }
}

impl ItemRepository for SqliteItemRepository {
    fn save<'a>(&'a self, item: &'a Item, stage: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(INSERT_ITEM)
                .bind(item.id().get())
                .bind(item.processed_at().to_rfc3339_opts(SecondsFormat::Secs, true))
                .bind(item.api_version())
                .bind(stage)
                .bind(item.raw())
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to save item {} for {stage}", item.id()))?;
            Ok(())
        })
    }
}
