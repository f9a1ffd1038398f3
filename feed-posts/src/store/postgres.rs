use crate::traits::FeedStore;
use crate::types::{FeedIdentifier, FeedState, RawItem, Result, StoreConfig};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

pub struct PgFeedStore {
    pool: PgPool,
}

impl PgFeedStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        info!("Connected to the database: {}", config.redacted_url());
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_generators (
                aturi TEXT PRIMARY KEY,
                metadata JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                uri TEXT PRIMARY KEY,
                post_data JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_feeds(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM feed_generators")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Stored payload for one post, if present.
    pub async fn get_post(&self, uri: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT post_data FROM posts WHERE uri = $1")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("post_data")?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn load_state(&self, identifier: &FeedIdentifier) -> Result<FeedState> {
        let row = sqlx::query("SELECT metadata FROM feed_generators WHERE aturi = $1")
            .bind(identifier.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let metadata: serde_json::Value = row.try_get("metadata")?;
                Ok(serde_json::from_value(metadata)?)
            }
            None => Ok(FeedState::new()),
        }
    }

    async fn commit_page(
        &self,
        identifier: &FeedIdentifier,
        state: &FeedState,
        new_items: &[RawItem],
    ) -> Result<()> {
        let metadata = serde_json::to_value(state)?;

        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feed_generators (aturi, metadata)
            VALUES ($1, $2)
            ON CONFLICT (aturi) DO UPDATE SET metadata = EXCLUDED.metadata
            "#,
        )
        .bind(identifier.as_str())
        .bind(&metadata)
        .execute(&mut *tx)
        .await?;

        // Rows are locked in URI order so commits sharing posts cannot deadlock.
        let mut ordered: Vec<&RawItem> = new_items.iter().collect();
        ordered.sort_by(|a, b| a.content_id.cmp(&b.content_id));

        for item in ordered {
            sqlx::query("INSERT INTO posts (uri, post_data) VALUES ($1, $2) ON CONFLICT (uri) DO NOTHING")
                .bind(&item.content_id)
                .bind(&item.payload)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!("Committed {} new posts for {}", new_items.len(), identifier);
        Ok(())
    }
}
