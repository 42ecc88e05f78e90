//! `artsync init`: create the mirror table and the index collection.
//!
//! Both steps are idempotent. The mirror DDL uses `IF NOT EXISTS`; the index
//! collection is only created when `collections/has` reports it missing.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::milvus::MilvusIndex;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect_mirror(config).await?;
    let result = create_mirror_table(&pool, config).await;
    pool.close().await;
    result?;

    let embedder = Embedder::from_config(&config.embedding)?;
    let index = MilvusIndex::new(&config.index, embedder)?;
    let created = index
        .ensure_collection()
        .await
        .with_context(|| format!("Failed to prepare index collection '{}'", config.index.collection))?;

    println!("Mirror table {} ready.", config.mirror_table());
    if created {
        println!("Index collection '{}' created.", config.index.collection);
    } else {
        println!("Index collection '{}' already exists.", config.index.collection);
    }
    Ok(())
}

/// Creates the mirror schema and table when absent.
///
/// Also run by [`SyncContext::open`](crate::context::SyncContext::open), so a
/// scheduler started against an empty database can sync right away.
pub async fn create_mirror_table(pool: &PgPool, config: &Config) -> Result<()> {
    for statement in mirror_ddl(config) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create mirror table {}", config.mirror_table()))?;
    }
    Ok(())
}

fn mirror_ddl(config: &Config) -> [String; 2] {
    [
        format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", config.mirror.schema),
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {} (
            id              BIGINT       PRIMARY KEY,
            link            TEXT,
            category_name   TEXT,
            title           TEXT,
            header          TEXT,
            body            TEXT,
            author          TEXT,
            is_comment      INTEGER,
            is_active       INTEGER,
            is_hot          INTEGER,
            is_important    INTEGER,
            is_top          INTEGER,
            has_video       INTEGER,
            comment_count   BIGINT,
            like_count      BIGINT,
            dislike_count   BIGINT,
            hit_count       BIGINT,
            created_at      TIMESTAMPTZ,
            updated_at      TIMESTAMPTZ,
            published_time  TIMESTAMPTZ,
            article_json    JSONB
        )
        "#,
            config.mirror_table()
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_mirror_ddl_is_idempotent_and_qualified() {
        let cfg = parse_config(
            include_str!("../config/article-sync.example.toml"),
            |_| None,
        )
        .unwrap();
        let [schema, table] = mirror_ddl(&cfg);
        assert_eq!(schema, "CREATE SCHEMA IF NOT EXISTS \"via_ndh\"");
        assert!(table.contains("CREATE TABLE IF NOT EXISTS \"via_ndh\".\"data_ndh\""));
        assert!(table.contains("id              BIGINT       PRIMARY KEY"));
        assert!(table.contains("article_json    JSONB"));
    }
}
