use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use batchlink_core::{Bundle, BundleStore, CreateOutcome};

use crate::now;

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct BundleRow {
    token: String,
    message: String,
    videos: String,
}

impl TryFrom<BundleRow> for Bundle {
    type Error = anyhow::Error;

    fn try_from(r: BundleRow) -> Result<Self> {
        Ok(Self {
            token: r.token,
            message: r.message,
            videos: serde_json::from_str(&r.videos)?,
        })
    }
}

/// SQLite-backed bundle store. Rows are insert-only; the token primary
/// key doubles as the collision check behind `CreateOutcome::TokenTaken`.
pub struct SqliteBundleStore {
    pool: SqlitePool,
}

impl SqliteBundleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the bundles table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS bundles (
                token      TEXT    PRIMARY KEY,
                message    TEXT    NOT NULL,
                videos     TEXT    NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BundleStore for SqliteBundleStore {
    async fn create(&self, bundle: &Bundle) -> Result<CreateOutcome> {
        let videos = serde_json::to_string(&bundle.videos)?;
        let result = sqlx::query(
            r#"INSERT INTO bundles (token, message, videos, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(token) DO NOTHING"#,
        )
        .bind(&bundle.token)
        .bind(&bundle.message)
        .bind(&videos)
        .bind(now())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            CreateOutcome::Created
        } else {
            CreateOutcome::TokenTaken
        })
    }

    async fn find(&self, token: &str) -> Result<Option<Bundle>> {
        let row = sqlx::query_as::<_, BundleRow>(
            "SELECT token, message, videos FROM bundles WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteBundleStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteBundleStore::init(&pool).await.unwrap();
        SqliteBundleStore::new(pool)
    }

    fn bundle(token: &str) -> Bundle {
        Bundle {
            token: token.into(),
            message: "Hello".into(),
            videos: vec!["v1".into(), "v2".into(), "v3".into()],
        }
    }

    #[tokio::test]
    async fn create_and_find_roundtrip() {
        let store = test_store().await;
        assert_eq!(
            store.create(&bundle("abc123")).await.unwrap(),
            CreateOutcome::Created
        );

        let found = store.find("abc123").await.unwrap().unwrap();
        assert_eq!(found.message, "Hello");
        assert_eq!(found.videos, vec!["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn duplicate_token_reports_conflict_and_keeps_original() {
        let store = test_store().await;
        store.create(&bundle("abc123")).await.unwrap();

        let mut second = bundle("abc123");
        second.message = "other".into();
        assert_eq!(
            store.create(&second).await.unwrap(),
            CreateOutcome::TokenTaken
        );

        // The earlier bundle stays reachable and unchanged.
        let found = store.find("abc123").await.unwrap().unwrap();
        assert_eq!(found.message, "Hello");
    }

    #[tokio::test]
    async fn find_unknown_token_returns_none() {
        let store = test_store().await;
        assert!(store.find("nope").await.unwrap().is_none());
    }
}
