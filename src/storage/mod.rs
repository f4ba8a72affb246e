//! Storage layer for normalized articles
//!
//! One SQLite table keyed by URL. A batch is written inside a single
//! transaction: every row commits or none does.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::schemas::{canonical, NormalizedArticle};

/// Idempotent keyed sink for normalized articles
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Upserts every article atomically; returns the number written
    async fn upsert_batch(&self, articles: &[NormalizedArticle]) -> Result<u64, StoreError>;
}

/// Aggregate view of the table, for operator checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub rows: i64,
    pub min_published: Option<String>,
    pub max_published: Option<String>,
    pub min_scraped: Option<String>,
    pub max_scraped: Option<String>,
    /// URLs stored more than once; always empty while the primary key holds
    pub duplicate_urls: Vec<(String, i64)>,
}

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS news_article (
        source       TEXT NOT NULL,
        title        TEXT NOT NULL,
        url          TEXT PRIMARY KEY,
        published_at TEXT,
        scraped_at   TEXT
    )
"#;

const UPSERT: &str = r#"
    INSERT INTO news_article (source, title, url, published_at, scraped_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(url) DO UPDATE SET
        source = excluded.source,
        title = excluded.title,
        published_at = excluded.published_at,
        scraped_at = excluded.scraped_at
"#;

/// SQLite-backed article store with a single writer connection
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(path = %path.display(), "Opening article store");
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    /// Private in-memory database; gone when the store is dropped
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Creates the table if absent; safe on every start
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM news_article")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Reads back the stored article for `url`
    pub async fn get(&self, url: &str) -> Result<Option<NormalizedArticle>, StoreError> {
        let row = sqlx::query(
            "SELECT source, title, url, published_at, scraped_at FROM news_article WHERE url = ?1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let url: String = row.try_get("url")?;
        let published_at: Option<String> = row.try_get("published_at")?;
        let scraped_at: Option<String> = row.try_get("scraped_at")?;

        Ok(Some(NormalizedArticle {
            source: row.try_get("source")?,
            title: row.try_get("title")?,
            published_at: parse_instant(&url, "published_at", published_at)?,
            scraped_at: parse_instant(&url, "scraped_at", scraped_at)?,
            url,
        }))
    }

    /// Row count, timestamp ranges and duplicate check
    pub async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let ranges = sqlx::query(
            r#"
            SELECT
                COUNT(*)          AS n,
                MIN(published_at) AS min_published,
                MAX(published_at) AS max_published,
                MIN(scraped_at)   AS min_scraped,
                MAX(scraped_at)   AS max_scraped
            FROM news_article
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let duplicate_urls = sqlx::query(
            r#"
            SELECT url, COUNT(*) AS c
            FROM news_article
            GROUP BY url
            HAVING c > 1
            ORDER BY c DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Ok((row.try_get("url")?, row.try_get("c")?)))
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(StoreSummary {
            rows: ranges.try_get("n")?,
            min_published: ranges.try_get("min_published")?,
            max_published: ranges.try_get("max_published")?,
            min_scraped: ranges.try_get("min_scraped")?,
            max_scraped: ranges.try_get("max_scraped")?,
            duplicate_urls,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    #[instrument(skip_all, fields(articles = articles.len()))]
    async fn upsert_batch(&self, articles: &[NormalizedArticle]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for article in articles {
            // Dropping `tx` on an early return rolls the whole batch back
            let result = sqlx::query(UPSERT)
                .bind(&article.source)
                .bind(&article.title)
                .bind(&article.url)
                .bind(canonical(&article.published_at))
                .bind(canonical(&article.scraped_at))
                .execute(&mut *tx)
                .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;

        debug!(written, "Committed article batch");
        info!(upserted = articles.len(), "Upserted articles into store");
        Ok(written)
    }
}

fn parse_instant(url: &str, column: &str, value: Option<String>) -> Result<DateTime<FixedOffset>, StoreError> {
    let value = value.ok_or_else(|| StoreError::CorruptRow {
        url: url.to_string(),
        reason: format!("{column} is NULL"),
    })?;
    DateTime::parse_from_rfc3339(&value).map_err(|e| StoreError::CorruptRow {
        url: url.to_string(),
        reason: format!("{column} {value:?}: {e}"),
    })
}
