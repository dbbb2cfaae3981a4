use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use batchlink_core::{ChannelBinding, ChannelStore};

use crate::now;

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct BindingRow {
    channel_id: i64,
    owner_id: i64,
}

impl From<BindingRow> for ChannelBinding {
    fn from(r: BindingRow) -> Self {
        Self {
            channel_id: r.channel_id,
            owner_id: r.owner_id,
        }
    }
}

/// SQLite-backed channel ownership registry.
pub struct SqliteChannelStore {
    pool: SqlitePool,
}

impl SqliteChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the channels table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS channels (
                channel_id INTEGER PRIMARY KEY,
                owner_id   INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn bind(&self, binding: &ChannelBinding) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO channels (channel_id, owner_id, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(channel_id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 updated_at = excluded.updated_at"#,
        )
        .bind(binding.channel_id)
        .bind(binding.owner_id)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, channel_id: i64) -> Result<Option<ChannelBinding>> {
        let row = sqlx::query_as::<_, BindingRow>(
            "SELECT channel_id, owner_id FROM channels WHERE channel_id = ?",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
