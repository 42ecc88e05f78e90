//! Store handles shared by every job.
//!
//! A [`SyncContext`] is built once per process from the config and passed to
//! each job. The mirror pool and the index client live as long as the
//! context; the source adapter only holds its URL and connects per cycle.
//! [`SyncContext::close`] is the single release path.

use anyhow::{Context, Result};
use article_sync_core::permalink::PermalinkBuilder;
use article_sync_core::pipeline::{sync_cycle, SyncOutcome};
use article_sync_core::reconcile::{reconcile_pass, ReconcileReport};
use article_sync_core::render::Renderer;
use article_sync_core::store::{MirrorStore, SearchIndex, SourceStore};
use article_sync_core::SyncError;
use sqlx::PgPool;

use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::migrate;
use crate::milvus::MilvusIndex;
use crate::mirror_pg::PgMirror;
use crate::source_mysql::MySqlSource;

pub struct SyncContext {
    pub source: Box<dyn SourceStore>,
    pub mirror: Box<dyn MirrorStore>,
    pub index: Box<dyn SearchIndex>,
    pub renderer: Renderer,
    pub permalinks: PermalinkBuilder,
}

impl SyncContext {
    pub fn new(
        source: Box<dyn SourceStore>,
        mirror: Box<dyn MirrorStore>,
        index: Box<dyn SearchIndex>,
        renderer: Renderer,
        permalinks: PermalinkBuilder,
    ) -> Self {
        Self {
            source,
            mirror,
            index,
            renderer,
            permalinks,
        }
    }

    /// Opens the production stores described by `config`, creating the
    /// mirror table and the index collection when they are missing.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config.embedding)?;
        let index = MilvusIndex::new(&config.index, embedder)?;
        let pool = db::connect_mirror(config).await?;
        if let Err(e) = prepare_stores(&pool, &index, config).await {
            pool.close().await;
            return Err(e);
        }
        let mirror = PgMirror::new(pool, config.mirror_table(), config.mirror.batch_size);
        let source = MySqlSource::new(config.source.url.clone());

        Ok(Self::new(
            Box::new(source),
            Box::new(mirror),
            Box::new(index),
            Renderer::new(config.render_config()),
            config.permalinks(),
        ))
    }

    pub async fn sync_once(&self) -> Result<SyncOutcome, SyncError> {
        sync_cycle(
            self.source.as_ref(),
            self.mirror.as_ref(),
            self.index.as_ref(),
            &self.renderer,
            &self.permalinks,
        )
        .await
    }

    pub async fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport, SyncError> {
        reconcile_pass(
            self.mirror.as_ref(),
            self.index.as_ref(),
            &self.renderer,
            dry_run,
        )
        .await
    }

    /// Releases every store handle.
    pub async fn close(self) {
        self.mirror.close().await;
        self.index.close().await;
        tracing::debug!("sync context closed");
    }
}

async fn prepare_stores(pool: &PgPool, index: &MilvusIndex, config: &Config) -> Result<()> {
    migrate::create_mirror_table(pool, config).await?;
    let created = index
        .ensure_collection()
        .await
        .with_context(|| format!("Failed to prepare index collection '{}'", config.index.collection))?;
    if created {
        tracing::info!(collection = %config.index.collection, "index collection created");
    }
    Ok(())
}
