//! Source store adapter for the MariaDB/MySQL store of record.
//!
//! A fresh connection is opened for every snapshot and closed right after,
//! so a source outage only ever affects the cycle that hit it. All three
//! queries run on that one connection; if any of them fails the snapshot is
//! discarded.
//!
//! Numeric columns are cast to `SIGNED` so that the decoder sees `BIGINT`
//! whatever the source column width is.

use async_trait::async_trait;
use article_sync_core::extract::{ArticleRow, RelatedEdge, SourceSnapshot};
use article_sync_core::models::{Counters, Flags};
use article_sync_core::permalink::Category;
use article_sync_core::store::SourceStore;
use article_sync_core::{StoreKind, SyncError};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Connection, Row};

use crate::db::classify;

const ARTICLES_SQL: &str = r#"
SELECT
    CAST(a.id AS SIGNED)             AS id,
    a.slug,
    CAST(a.category_id AS SIGNED)    AS category_id,
    a.title,
    a.header,
    a.body,
    a.author,
    CAST(a.is_comment AS SIGNED)     AS is_comment,
    CAST(a.is_active AS SIGNED)      AS is_active,
    CAST(a.is_hot AS SIGNED)         AS is_hot,
    CAST(a.is_important AS SIGNED)   AS is_important,
    CAST(a.is_top AS SIGNED)         AS is_top,
    CAST(a.has_video AS SIGNED)      AS has_video,
    CAST(a.comment_count AS SIGNED)  AS comment_count,
    CAST(a.like_count AS SIGNED)     AS like_count,
    CAST(a.dislike_count AS SIGNED)  AS dislike_count,
    CAST(a.hit_count AS SIGNED)      AS hit_count,
    a.created_at,
    a.updated_at,
    a.published_time
FROM vtp_article a
WHERE a.published_time IS NOT NULL AND a.is_delete = 0
"#;

const CATEGORIES_SQL: &str = r#"
SELECT
    CAST(c.id AS SIGNED)         AS id,
    CAST(c.parent_id AS SIGNED)  AS parent_id,
    c.slug,
    c.name
FROM vtp_category c
"#;

const RELATED_SQL: &str = r#"
SELECT DISTINCT
    CAST(r.article_id AS SIGNED)  AS article_id,
    CAST(a.id AS SIGNED)          AS related_id,
    a.title                       AS related_title,
    a.slug                        AS related_slug,
    CAST(a.category_id AS SIGNED) AS related_category_id
FROM vtp_article_related r
JOIN vtp_article a ON a.id = r.related_article_id
ORDER BY article_id, related_id
"#;

pub struct MySqlSource {
    url: String,
}

impl MySqlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceStore for MySqlSource {
    async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SyncError> {
        let mut conn = MySqlConnection::connect(&self.url)
            .await
            .map_err(|e| SyncError::connectivity(StoreKind::Source, e.to_string()))?;

        let result = read_snapshot(&mut conn).await;
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "source connection did not close cleanly");
        }
        let snapshot = result.map_err(|e| classify(StoreKind::Source, e))?;

        tracing::debug!(
            articles = snapshot.articles.len(),
            categories = snapshot.categories.len(),
            related = snapshot.related.len(),
            "source snapshot read"
        );
        Ok(snapshot)
    }
}

async fn read_snapshot(conn: &mut MySqlConnection) -> Result<SourceSnapshot, sqlx::Error> {
    let articles = sqlx::query(ARTICLES_SQL)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(article_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    if articles.is_empty() {
        return Ok(SourceSnapshot::default());
    }

    let categories = sqlx::query(CATEGORIES_SQL)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(category_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let related = sqlx::query(RELATED_SQL)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(edge_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SourceSnapshot {
        articles,
        categories,
        related,
    })
}

fn flag(row: &MySqlRow, col: &str) -> Result<bool, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(col)?.unwrap_or(0) != 0)
}

fn counter(row: &MySqlRow, col: &str) -> Result<i64, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(col)?.unwrap_or(0))
}

fn article_from_row(row: &MySqlRow) -> Result<ArticleRow, sqlx::Error> {
    Ok(ArticleRow {
        id: row.try_get("id")?,
        slug: row.try_get::<Option<String>, _>("slug")?.unwrap_or_default(),
        category_id: row.try_get("category_id")?,
        title: row.try_get("title")?,
        header: row.try_get("header")?,
        body: row.try_get("body")?,
        author: row.try_get("author")?,
        flags: Flags {
            is_comment: flag(row, "is_comment")?,
            is_active: flag(row, "is_active")?,
            is_hot: flag(row, "is_hot")?,
            is_important: flag(row, "is_important")?,
            is_top: flag(row, "is_top")?,
            has_video: flag(row, "has_video")?,
        },
        counters: Counters {
            comment_count: counter(row, "comment_count")?,
            like_count: counter(row, "like_count")?,
            dislike_count: counter(row, "dislike_count")?,
            hit_count: counter(row, "hit_count")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        published_time: row.try_get("published_time")?,
    })
}

fn category_from_row(row: &MySqlRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        slug: row.try_get::<Option<String>, _>("slug")?.unwrap_or_default(),
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
    })
}

fn edge_from_row(row: &MySqlRow) -> Result<RelatedEdge, sqlx::Error> {
    Ok(RelatedEdge {
        article_id: row.try_get("article_id")?,
        related_id: row.try_get("related_id")?,
        related_title: row
            .try_get::<Option<String>, _>("related_title")?
            .unwrap_or_default(),
        related_slug: row
            .try_get::<Option<String>, _>("related_slug")?
            .unwrap_or_default(),
        related_category_id: row.try_get("related_category_id")?,
    })
}
