use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use batchlink_core::{AuthoringSession, SessionStore, Step};

use crate::now;

/// Internal row type for sqlx mapping. `videos` is a JSON array in
/// submission order.
#[derive(sqlx::FromRow)]
struct SessionRow {
    owner_id: i64,
    step: String,
    target_count: i64,
    message: String,
    videos: String,
}

impl TryFrom<SessionRow> for AuthoringSession {
    type Error = anyhow::Error;

    fn try_from(r: SessionRow) -> Result<Self> {
        let step = match r.step.as_str() {
            "awaiting_message" => Step::AwaitingMessage,
            "collecting_videos" => Step::CollectingVideos,
            other => anyhow::bail!("unknown session step: {other}"),
        };
        Ok(Self {
            owner_id: r.owner_id,
            step,
            target_count: r.target_count as u32,
            message: r.message,
            videos: serde_json::from_str(&r.videos)?,
        })
    }
}

fn step_str(step: Step) -> &'static str {
    match step {
        Step::AwaitingMessage => "awaiting_message",
        Step::CollectingVideos => "collecting_videos",
    }
}

/// SQLite-backed authoring session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the sessions table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sessions (
                owner_id     INTEGER PRIMARY KEY,
                step         TEXT    NOT NULL,
                target_count INTEGER NOT NULL,
                message      TEXT    NOT NULL DEFAULT '',
                videos       TEXT    NOT NULL DEFAULT '[]',
                updated_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find(&self, owner_id: i64) -> Result<Option<AuthoringSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT owner_id, step, target_count, message, videos \
             FROM sessions WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(&self, session: &AuthoringSession) -> Result<()> {
        let videos = serde_json::to_string(&session.videos)?;
        sqlx::query(
            r#"INSERT INTO sessions (owner_id, step, target_count, message, videos, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(owner_id) DO UPDATE SET
                 step = excluded.step,
                 target_count = excluded.target_count,
                 message = excluded.message,
                 videos = excluded.videos,
                 updated_at = excluded.updated_at"#,
        )
        .bind(session.owner_id)
        .bind(step_str(session.step))
        .bind(i64::from(session.target_count))
        .bind(&session.message)
        .bind(&videos)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_video(&self, owner_id: i64, video: &str) -> Result<Option<AuthoringSession>> {
        // Push-and-return in a single statement. The length guard keeps
        // the stored sequence at or below its target even if an upload
        // races the finalizing interaction.
        let row = sqlx::query_as::<_, SessionRow>(
            r#"UPDATE sessions
               SET videos = json_insert(videos, '$[#]', ?), updated_at = ?
               WHERE owner_id = ?
                 AND step = 'collecting_videos'
                 AND json_array_length(videos) < target_count
               RETURNING owner_id, step, target_count, message, videos"#,
        )
        .bind(video)
        .bind(now())
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn delete(&self, owner_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteSessionStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteSessionStore::init(&pool).await.unwrap();
        SqliteSessionStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_and_find_roundtrip() {
        let store = test_store().await;
        let session = AuthoringSession::begin(7, 3);
        store.upsert(&session).await.unwrap();

        let found = store.find(7).await.unwrap().unwrap();
        assert_eq!(found, session);
    }

    #[tokio::test]
    async fn find_missing_owner_returns_none() {
        let store = test_store().await;
        assert!(store.find(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_session() {
        let store = test_store().await;
        let mut first = AuthoringSession::begin(7, 2);
        first.apply(&batchlink_core::Content {
            text: Some("old".into()),
            ..Default::default()
        });
        store.upsert(&first).await.unwrap();
        store.append_video(7, "a").await.unwrap();

        // Declaring a new count replaces the record wholesale.
        store.upsert(&AuthoringSession::begin(7, 5)).await.unwrap();

        let found = store.find(7).await.unwrap().unwrap();
        assert_eq!(found.step, Step::AwaitingMessage);
        assert_eq!(found.target_count, 5);
        assert!(found.videos.is_empty());
        assert!(found.message.is_empty());
    }

    #[tokio::test]
    async fn append_video_preserves_order_and_counts() {
        let store = test_store().await;
        let mut session = AuthoringSession::begin(7, 3);
        session.apply(&batchlink_core::Content {
            text: Some("msg".into()),
            ..Default::default()
        });
        store.upsert(&session).await.unwrap();

        let one = store.append_video(7, "v1").await.unwrap().unwrap();
        assert_eq!(one.videos, vec!["v1"]);
        assert!(!one.finalize_ready());

        let two = store.append_video(7, "v2").await.unwrap().unwrap();
        let three = store.append_video(7, "v3").await.unwrap().unwrap();
        assert_eq!(three.videos, vec!["v1", "v2", "v3"]);
        assert_eq!(two.received(), 2);
        assert!(three.finalize_ready());
    }

    #[tokio::test]
    async fn append_video_requires_collecting_step() {
        let store = test_store().await;
        store.upsert(&AuthoringSession::begin(7, 2)).await.unwrap();

        // Still awaiting the message; appends must not land.
        assert!(store.append_video(7, "v1").await.unwrap().is_none());
        assert!(store.find(7).await.unwrap().unwrap().videos.is_empty());
    }

    #[tokio::test]
    async fn append_video_refuses_past_target() {
        let store = test_store().await;
        let mut session = AuthoringSession::begin(7, 1);
        session.apply(&batchlink_core::Content::default());
        store.upsert(&session).await.unwrap();

        assert!(store.append_video(7, "v1").await.unwrap().is_some());
        assert!(store.append_video(7, "v2").await.unwrap().is_none());

        let found = store.find(7).await.unwrap().unwrap();
        assert_eq!(found.videos, vec!["v1"]);
    }

    #[tokio::test]
    async fn append_video_unknown_owner_returns_none() {
        let store = test_store().await;
        assert!(store.append_video(404, "v").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = test_store().await;
        store.upsert(&AuthoringSession::begin(7, 2)).await.unwrap();
        store.delete(7).await.unwrap();
        assert!(store.find(7).await.unwrap().is_none());
    }
}
