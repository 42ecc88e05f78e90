//! The short-period sync cycle: extract, mirror, index.
//!
//! ```text
//! SourceStore ──fetch_snapshot──▶ assemble ──▶ upsert_mirror ──new set──▶ index_new
//!                                    │               │
//!                           skipped ids logged   failure ⇒ cycle aborts,
//!                                                 nothing is indexed
//! ```
//!
//! An empty snapshot ends the cycle as [`SyncOutcome::Empty`] without
//! touching the mirror or the index.

use crate::error::SyncError;
use crate::extract::assemble;
use crate::indexer::{index_new, IndexReport};
use crate::mirror::upsert_mirror;
use crate::models::MirrorRecord;
use crate::permalink::PermalinkBuilder;
use crate::render::Renderer;
use crate::store::{MirrorStore, SearchIndex, SourceStore};

/// Counts from a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub extracted: usize,
    pub skipped: Vec<i64>,
    pub mirrored: u64,
    pub new_ids: Vec<i64>,
    pub index: IndexReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The source returned no published articles.
    Empty,
    Completed(SyncReport),
}

/// Runs one extract, mirror, index cycle.
pub async fn sync_cycle(
    source: &dyn SourceStore,
    mirror: &dyn MirrorStore,
    index: &dyn SearchIndex,
    renderer: &Renderer,
    links: &PermalinkBuilder,
) -> Result<SyncOutcome, SyncError> {
    let snapshot = source.fetch_snapshot().await?;
    if snapshot.is_empty() {
        tracing::info!("source returned no articles; nothing to sync");
        return Ok(SyncOutcome::Empty);
    }

    let extraction = assemble(snapshot, links);
    tracing::info!(
        extracted = extraction.records.len(),
        skipped = extraction.skipped.len(),
        "extraction complete"
    );
    let records: Vec<MirrorRecord> = extraction
        .records
        .into_iter()
        .map(MirrorRecord::from)
        .collect();
    if records.is_empty() {
        tracing::info!("no article had a resolvable permalink; nothing to sync");
        return Ok(SyncOutcome::Empty);
    }

    let mirrored = upsert_mirror(mirror, &records).await?;
    let index_report = index_new(index, renderer, &records, &mirrored.new_ids).await?;

    Ok(SyncOutcome::Completed(SyncReport {
        extracted: records.len(),
        skipped: extraction.skipped,
        mirrored: mirrored.written,
        new_ids: mirrored.new_ids.into_iter().collect(),
        index: index_report,
    }))
}
