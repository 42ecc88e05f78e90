//! Mirror store adapter for PostgreSQL.
//!
//! One table keyed by source id. `upsert_batch` writes every chunk of the
//! batch inside a single transaction with `INSERT ... ON CONFLICT (id) DO
//! UPDATE`, so a failed batch leaves the mirror untouched.

use std::collections::BTreeSet;

use async_trait::async_trait;
use article_sync_core::models::{Counters, Flags, MirrorRecord, RelatedItem};
use article_sync_core::store::{MirrorScan, MirrorStore};
use article_sync_core::{StoreKind, SyncError};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

use crate::db::classify;

const COLUMNS: &str = "id, link, category_name, title, header, body, author, \
    is_comment, is_active, is_hot, is_important, is_top, has_video, \
    comment_count, like_count, dislike_count, hit_count, \
    created_at, updated_at, published_time, article_json";

/// Bind parameters per upserted row, one per entry of `COLUMNS`.
const BINDS_PER_ROW: usize = 21;

/// Largest `mirror.batch_size` that keeps one INSERT under the PostgreSQL
/// limit of 65535 bind parameters.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / BINDS_PER_ROW;

/// Casts keep decoding stable whether the table was created with INTEGER or
/// BIGINT columns.
const SELECT_COLUMNS: &str = "id::BIGINT AS id, link, category_name, title, header, body, author, \
    is_comment::INTEGER AS is_comment, is_active::INTEGER AS is_active, is_hot::INTEGER AS is_hot, \
    is_important::INTEGER AS is_important, is_top::INTEGER AS is_top, has_video::INTEGER AS has_video, \
    comment_count::BIGINT AS comment_count, like_count::BIGINT AS like_count, \
    dislike_count::BIGINT AS dislike_count, hit_count::BIGINT AS hit_count, \
    created_at, updated_at, published_time, article_json";

const UPDATE_SET: &str = " ON CONFLICT (id) DO UPDATE SET \
    link = EXCLUDED.link, \
    category_name = EXCLUDED.category_name, \
    title = EXCLUDED.title, \
    header = EXCLUDED.header, \
    body = EXCLUDED.body, \
    author = EXCLUDED.author, \
    is_comment = EXCLUDED.is_comment, \
    is_active = EXCLUDED.is_active, \
    is_hot = EXCLUDED.is_hot, \
    is_important = EXCLUDED.is_important, \
    is_top = EXCLUDED.is_top, \
    has_video = EXCLUDED.has_video, \
    comment_count = EXCLUDED.comment_count, \
    like_count = EXCLUDED.like_count, \
    dislike_count = EXCLUDED.dislike_count, \
    hit_count = EXCLUDED.hit_count, \
    created_at = EXCLUDED.created_at, \
    updated_at = EXCLUDED.updated_at, \
    published_time = EXCLUDED.published_time, \
    article_json = EXCLUDED.article_json";

pub struct PgMirror {
    pool: PgPool,
    table: String,
    batch_size: usize,
}

impl PgMirror {
    /// `table` must already be a quoted, validated `"schema"."table"` name.
    pub fn new(pool: PgPool, table: String, batch_size: usize) -> Self {
        Self {
            pool,
            table,
            batch_size: batch_size.max(1),
        }
    }
}

fn err(e: sqlx::Error) -> SyncError {
    classify(StoreKind::Mirror, e)
}

#[async_trait]
impl MirrorStore for PgMirror {
    async fn existing_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>, SyncError> {
        let sql = format!("SELECT id::BIGINT FROM {} WHERE id = ANY($1)", self.table);
        let rows: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(err)?;
        Ok(rows.into_iter().collect())
    }

    async fn upsert_batch(&self, records: &[MirrorRecord]) -> Result<u64, SyncError> {
        let mut tx = self.pool.begin().await.map_err(err)?;
        let mut written = 0;

        for chunk in records.chunks(self.batch_size) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table, COLUMNS));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.id)
                    .push_bind(r.link.clone())
                    .push_bind(r.category_name.clone())
                    .push_bind(r.title.clone())
                    .push_bind(r.header.clone())
                    .push_bind(r.body.clone())
                    .push_bind(r.author.clone())
                    .push_bind(i32::from(r.flags.is_comment))
                    .push_bind(i32::from(r.flags.is_active))
                    .push_bind(i32::from(r.flags.is_hot))
                    .push_bind(i32::from(r.flags.is_important))
                    .push_bind(i32::from(r.flags.is_top))
                    .push_bind(i32::from(r.flags.has_video))
                    .push_bind(r.counters.comment_count)
                    .push_bind(r.counters.like_count)
                    .push_bind(r.counters.dislike_count)
                    .push_bind(r.counters.hit_count)
                    .push_bind(r.created_at)
                    .push_bind(r.updated_at)
                    .push_bind(r.published_time)
                    .push_bind(Json(r.related.clone()));
            });
            qb.push(UPDATE_SET);

            let result = qb.build().execute(&mut *tx).await.map_err(err)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(err)?;
        Ok(written)
    }

    async fn fetch_all(&self) -> Result<MirrorScan, SyncError> {
        let sql = format!("SELECT {} FROM {} ORDER BY id", SELECT_COLUMNS, self.table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(err)?;

        let mut scan = MirrorScan::default();
        for row in &rows {
            match decode_row(row) {
                Ok(rec) => scan.records.push(rec),
                Err(e) => {
                    let id = row.try_get::<i64, _>("id").unwrap_or_default();
                    tracing::warn!(id, error = %e, "undecodable mirror row");
                    scan.unreadable.push(id);
                }
            }
        }
        Ok(scan)
    }

    async fn fetch_one(&self, id: i64) -> Result<Option<MirrorRecord>, SyncError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", SELECT_COLUMNS, self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn count(&self) -> Result<i64, SyncError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(err)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &PgRow) -> Result<MirrorRecord, SyncError> {
    decode_row(row).map_err(|e| {
        let id = row.try_get::<i64, _>("id").unwrap_or_default();
        SyncError::per_record(id, format!("undecodable mirror row: {}", e))
    })
}

fn decode_row(row: &PgRow) -> Result<MirrorRecord, sqlx::Error> {
    let flag = |col: &str| -> Result<bool, sqlx::Error> {
        Ok(row.try_get::<Option<i32>, _>(col)?.unwrap_or(0) != 0)
    };
    let counter = |col: &str| -> Result<i64, sqlx::Error> {
        Ok(row.try_get::<Option<i64>, _>(col)?.unwrap_or(0))
    };
    let related: Option<Json<Vec<RelatedItem>>> = row.try_get("article_json")?;

    Ok(MirrorRecord {
        id: row.try_get("id")?,
        link: row.try_get("link")?,
        category_name: row.try_get("category_name")?,
        title: row.try_get("title")?,
        header: row.try_get("header")?,
        body: row.try_get("body")?,
        author: row.try_get("author")?,
        flags: Flags {
            is_comment: flag("is_comment")?,
            is_active: flag("is_active")?,
            is_hot: flag("is_hot")?,
            is_important: flag("is_important")?,
            is_top: flag("is_top")?,
            has_video: flag("has_video")?,
        },
        counters: Counters {
            comment_count: counter("comment_count")?,
            like_count: counter("like_count")?,
            dislike_count: counter("dislike_count")?,
            hit_count: counter("hit_count")?,
        },
        created_at: row.try_get::<Option<DateTime<Utc>>, _>("created_at")?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        published_time: row.try_get::<Option<DateTime<Utc>>, _>("published_time")?,
        related: related.map(|j| j.0).unwrap_or_default(),
    })
}
